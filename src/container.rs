//! The in-segment multi-index container.
//!
//! One container lives inside each segment under a well-known name equal to
//! the cache name, found-or-constructed on every attach. It is an explicit
//! table of index definitions over a common entity store:
//!
//! - `entries`: every live record handle in insertion order (full scans,
//!   clear),
//! - one sorted handle array per declared [`IndexSpec`], ordered by that
//!   index's comparator.
//!
//! A *handle* is the segment offset of a record's bytes. Handles are stable
//! across growth (offsets, not addresses) but are still re-resolved from the
//! container on every public cache operation, never cached across calls.
//!
//! Equal-range queries binary-search a sorted handle array with the caller's
//! [`LookupKey`]; since composite keys compare lexicographically, a key
//! prefix selects a contiguous range. Mutations keep every declared index
//! consistent, and reserve array capacity up front so that a failed
//! allocation never leaves the container half-updated.

use core::cmp::Ordering;

use crate::arena::{AllocError, RawVec};
use crate::entity::{IndexTag, LookupKey, Record};
use crate::segment::{Segment, MAX_ROOT_NAME};

/// Maximum number of indices a record may declare.
pub const MAX_INDEXES: usize = 4;

const CONTAINER_MAGIC: u64 = 0x4d49_4458_4332_3031; // "MIDXC201"

/// Container bookkeeping stored inside the segment.
#[derive(Clone, Copy)]
#[repr(C)]
struct RawContainer {
    magic: u64,
    index_count: u32,
    _pad: u32,
    entries: RawVec,
    indexes: [RawVec; MAX_INDEXES],
}

fn load(seg: &Segment, root: u64) -> RawContainer {
    let c: RawContainer = seg.read(root);
    assert_eq!(c.magic, CONTAINER_MAGIC, "container root corrupted");
    c
}

fn store(seg: &mut Segment, root: u64, c: &RawContainer) {
    seg.write(root, c);
}

fn read_record<R: Record>(seg: &Segment, handle: u64) -> R {
    seg.read(handle)
}

/// Returns the container root offset, constructing the container on first
/// attach. The segment header records the owning cache name; attaching a
/// differently named cache to the same segment is a configuration error and
/// panics.
pub(crate) fn find_or_construct<R: Record>(
    seg: &mut Segment,
    name: &str,
) -> Result<u64, AllocError> {
    assert!(
        !R::INDEXES.is_empty() && R::INDEXES.len() <= MAX_INDEXES,
        "record must declare between 1 and {MAX_INDEXES} indexes"
    );
    assert!(name.len() <= MAX_ROOT_NAME, "cache name too long");

    let mut header = seg.header();
    if header.root_off != 0 {
        let stored = &header.root_name[..header.root_name_len as usize];
        assert_eq!(
            stored,
            name.as_bytes(),
            "segment already owned by a different cache name"
        );
        let c = load(seg, header.root_off);
        assert_eq!(
            c.index_count as usize,
            R::INDEXES.len(),
            "segment container does not match this record's index table"
        );
        return Ok(header.root_off);
    }

    let root = seg.alloc(core::mem::size_of::<RawContainer>())?;
    store(
        seg,
        root,
        &RawContainer {
            magic: CONTAINER_MAGIC,
            index_count: R::INDEXES.len() as u32,
            _pad: 0,
            entries: RawVec::EMPTY,
            indexes: [RawVec::EMPTY; MAX_INDEXES],
        },
    );
    header = seg.header();
    header.root_off = root;
    header.root_name_len = name.len() as u32;
    header.root_name = [0; MAX_ROOT_NAME];
    header.root_name[..name.len()].copy_from_slice(name.as_bytes());
    seg.set_header(&header);
    Ok(root)
}

/// Re-resolves the container root at the start of a public operation.
pub(crate) fn resolve(seg: &Segment, name: &str) -> u64 {
    let header = seg.header();
    assert_ne!(header.root_off, 0, "cache {name}: container not constructed");
    header.root_off
}

/// Number of live entities.
pub(crate) fn len(seg: &Segment, root: u64) -> usize {
    load(seg, root).entries.len()
}

/// First position in `idx` for which `pred(record)` is false, with `pred`
/// monotone over the index order.
fn partition<R: Record>(
    seg: &Segment,
    idx: &RawVec,
    mut pred: impl FnMut(&R) -> bool,
) -> usize {
    let (mut lo, mut hi) = (0usize, idx.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let rec = read_record::<R>(seg, idx.get(seg, mid));
        if pred(&rec) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Equal range of positions in tag `T`'s index matching lookup `q`.
pub(crate) fn equal_range<T, Q>(seg: &Segment, root: u64, q: &Q) -> (usize, usize)
where
    T: IndexTag,
    Q: LookupKey<T> + ?Sized,
{
    let c = load(seg, root);
    debug_assert!(T::ORDINAL < c.index_count as usize);
    let idx = &c.indexes[T::ORDINAL];
    let lo = partition::<T::Record>(seg, idx, |rec| q.cmp_record(rec, seg) == Ordering::Greater);
    let hi = partition::<T::Record>(seg, idx, |rec| q.cmp_record(rec, seg) != Ordering::Less);
    (lo, hi)
}

/// Record handles for the positions `range` of tag `T`'s index.
pub(crate) fn handles_in_range<T: IndexTag>(
    seg: &Segment,
    root: u64,
    range: (usize, usize),
) -> Vec<u64> {
    let c = load(seg, root);
    let idx = &c.indexes[T::ORDINAL];
    (range.0..range.1).map(|pos| idx.get(seg, pos)).collect()
}

/// All live handles in insertion order.
pub(crate) fn all_handles(seg: &Segment, root: u64) -> Vec<u64> {
    let c = load(seg, root);
    (0..c.entries.len()).map(|i| c.entries.get(seg, i)).collect()
}

/// Whether some unique index already holds a key equal to `rec`'s.
fn unique_conflict<R: Record>(seg: &Segment, c: &RawContainer, rec: &R) -> bool {
    for (i, spec) in R::INDEXES.iter().enumerate() {
        if !spec.unique {
            continue;
        }
        let idx = &c.indexes[i];
        let lo = partition::<R>(seg, idx, |other| (spec.cmp)(other, rec, seg) == Ordering::Less);
        if lo < idx.len() {
            let other = read_record::<R>(seg, idx.get(seg, lo));
            if (spec.cmp)(&other, rec, seg) == Ordering::Equal {
                return true;
            }
        }
    }
    false
}

/// Position of `handle` within index `i`, located by binary search on the
/// record's key followed by a scan over the equal range.
fn position_in_index<R: Record>(
    seg: &Segment,
    idx: &RawVec,
    spec: &crate::entity::IndexSpec<R>,
    rec: &R,
    handle: u64,
) -> usize {
    let mut pos = partition::<R>(seg, idx, |other| (spec.cmp)(other, rec, seg) == Ordering::Less);
    while pos < idx.len() {
        if idx.get(seg, pos) == handle {
            return pos;
        }
        pos += 1;
    }
    panic!("handle missing from index {}: container corrupted", spec.name);
}

/// Inserts a fully stored record, keeping all indices consistent.
///
/// Returns `Ok(false)` without storing anything when a unique index already
/// holds an equal key; the caller releases the candidate record. Capacity for
/// every handle array is reserved before the record slot is allocated, so an
/// allocation failure leaves the container exactly as it was.
pub(crate) fn insert<R: Record>(seg: &mut Segment, root: u64, rec: &R) -> Result<bool, AllocError> {
    let mut c = load(seg, root);
    if unique_conflict(seg, &c, rec) {
        return Ok(false);
    }

    c.entries.reserve_one(seg)?;
    store(seg, root, &c);
    for i in 0..R::INDEXES.len() {
        c.indexes[i].reserve_one(seg)?;
        store(seg, root, &c);
    }

    let slot = seg.alloc(core::mem::size_of::<R>())?;
    seg.write(slot, rec);

    // Capacity is reserved; none of the following can fail.
    c.entries
        .push(seg, slot)
        .unwrap_or_else(|_| unreachable!("capacity reserved"));
    for (i, spec) in R::INDEXES.iter().enumerate() {
        let pos = partition::<R>(seg, &c.indexes[i], |other| {
            (spec.cmp)(other, rec, seg) != Ordering::Greater
        });
        c.indexes[i]
            .insert_at(seg, pos, slot)
            .unwrap_or_else(|_| unreachable!("capacity reserved"));
    }
    store(seg, root, &c);
    Ok(true)
}

/// Unlinks `handle` from every index array (not from `entries`); the record
/// bytes stay in place. Pairs with [`relink`].
pub(crate) fn unlink_from_indexes<R: Record>(seg: &mut Segment, root: u64, handle: u64) {
    let rec = read_record::<R>(seg, handle);
    let mut c = load(seg, root);
    for (i, spec) in R::INDEXES.iter().enumerate() {
        let pos = position_in_index(seg, &c.indexes[i], spec, &rec, handle);
        c.indexes[i].remove_at(seg, pos);
    }
    store(seg, root, &c);
}

/// Re-links `handle` into every index array under the record's current key.
/// The arrays kept their capacity from the preceding [`unlink_from_indexes`],
/// so this never allocates.
pub(crate) fn relink<R: Record>(seg: &mut Segment, root: u64, handle: u64) {
    let rec = read_record::<R>(seg, handle);
    let mut c = load(seg, root);
    for (i, spec) in R::INDEXES.iter().enumerate() {
        let pos = partition::<R>(seg, &c.indexes[i], |other| {
            (spec.cmp)(other, &rec, seg) != Ordering::Greater
        });
        c.indexes[i]
            .insert_at(seg, pos, handle)
            .unwrap_or_else(|_| unreachable!("capacity retained from unlink"));
    }
    store(seg, root, &c);
}

/// Whether relinking `rec` would collide with a different entity on some
/// unique index. Call between [`unlink_from_indexes`] and [`relink`].
pub(crate) fn would_conflict<R: Record>(seg: &Segment, root: u64, rec: &R) -> bool {
    let c = load(seg, root);
    unique_conflict(seg, &c, rec)
}

/// Erases an entity that is already unlinked from the index arrays: removes
/// it from `entries`, releases its embedded allocations and its slot.
pub(crate) fn erase_unlinked<R: Record>(seg: &mut Segment, root: u64, handle: u64) {
    let mut c = load(seg, root);
    let pos = c
        .entries
        .position(seg, handle)
        .unwrap_or_else(|| panic!("handle missing from entry list: container corrupted"));
    c.entries.remove_at(seg, pos);
    store(seg, root, &c);
    let rec = read_record::<R>(seg, handle);
    rec.destroy(seg);
    seg.dealloc(handle, core::mem::size_of::<R>());
}

/// Erases one entity entirely.
pub(crate) fn erase<R: Record>(seg: &mut Segment, root: u64, handle: u64) {
    unlink_from_indexes::<R>(seg, root, handle);
    erase_unlinked::<R>(seg, root, handle);
}

/// Destroys every entity and empties the container. Never allocates.
pub(crate) fn clear<R: Record>(seg: &mut Segment, root: u64) {
    let mut c = load(seg, root);
    for i in 0..c.entries.len() {
        let handle = c.entries.get(seg, i);
        let rec = read_record::<R>(seg, handle);
        rec.destroy(seg);
        seg.dealloc(handle, core::mem::size_of::<R>());
    }
    c.entries.clear_release(seg);
    for idx in c.indexes.iter_mut() {
        idx.clear_release(seg);
    }
    store(seg, root, &c);
}
