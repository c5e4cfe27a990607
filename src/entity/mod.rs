//! Entity adapter contract and the concrete RTB records.
//!
//! A domain type plugs into the generic cache engine by providing three
//! things:
//!
//! 1. a [`Record`]: the fixed-shape, segment-resident form of one entity,
//!    constructed only through the segment allocator,
//! 2. one or more [`IndexTag`] marker types, each naming one declared index
//!    of the container (simple scalar key or lexicographic composite key),
//! 3. [`LookupKey`] impls describing what callers may pass to `retrieve`,
//!    `update` and `remove` for each tag — the full key, or any prefix of a
//!    composite key for range lookups.
//!
//! The caller-side vocabulary is the `(Key, Payload)` pair: loaders insert
//! with it, servers get owned `Payload` copies back. Payloads are ordinary
//! process-local structs; nothing a caller touches ever points into the
//! segment.
//!
//! # Record layout rules
//!
//! Records are `#[repr(C)]`, `Copy`, and embed **only** plain scalars and
//! [`IpcString`](crate::IpcString) fields. An `IpcString` is an offset into
//! the same segment, so a record's bytes mean the same thing in every
//! attached process and survive remapping. Implementing [`Record`] is
//! `unsafe` because the engine copies records into and out of segment memory
//! byte-for-byte and trusts these rules.

pub mod ad;
pub mod campaign;
pub mod city;
pub mod domain;
pub mod geo;
pub mod ico;
pub mod referer;

use core::cmp::Ordering;
use core::fmt;

use crate::arena::AllocError;
use crate::segment::Segment;

/// One declared index of a container: a tag name, a uniqueness flag, and the
/// full-key comparator that orders records within the index.
pub struct IndexSpec<R> {
    /// Tag name, for diagnostics.
    pub name: &'static str,
    /// Whether the index rejects duplicate keys on insert.
    pub unique: bool,
    /// Total order of records by this index's (possibly composite) key.
    /// String columns are resolved through the segment.
    pub cmp: fn(&R, &R, &Segment) -> Ordering,
}

impl<R> fmt::Debug for IndexSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSpec")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .finish()
    }
}

/// The segment-resident form of one domain entity.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with fields that are plain scalars or
/// [`IpcString`](crate::IpcString)s — no references, no pointers, no types
/// with drop glue. The engine stores records by copying their bytes into the
/// segment and reads them back with unaligned loads; any field that does not
/// tolerate that is undefined behavior.
pub unsafe trait Record: Copy + Sized + 'static {
    /// Indexed fields, as supplied by loaders on insert.
    type Key;
    /// The owned, process-local form callers receive.
    type Payload;

    /// Declared indices; every insert/update/erase keeps all of them
    /// consistent. Containers support at most four indices per record.
    const INDEXES: &'static [IndexSpec<Self>];

    /// The only legal constructor: copies the indexed fields from `key` and
    /// the remaining fields from `payload`, allocating any embedded strings
    /// from the segment. Value copies only — never a reference into
    /// process-local memory.
    fn store(
        key: &Self::Key,
        payload: &Self::Payload,
        segment: &mut Segment,
    ) -> Result<Self, AllocError>;

    /// Copies this record's fields into an owned payload.
    fn retrieve(&self, segment: &Segment) -> Self::Payload;

    /// Releases the record's embedded segment allocations. Records have no
    /// drop glue; all cleanup flows through here because the allocator lives
    /// in the segment, not the process.
    fn destroy(&self, segment: &mut Segment);
}

/// Marker type naming one declared index of a record's container.
pub trait IndexTag {
    /// The record type the tag belongs to.
    type Record: Record;
    /// Position of the index in [`Record::INDEXES`].
    const ORDINAL: usize;
}

/// A value callers may look up by under index tag `T`.
///
/// For a composite-key index the full tuple and every proper prefix get an
/// impl; because composite ordering is lexicographic, a prefix lookup yields
/// the contiguous equal range of all entities sharing that prefix.
pub trait LookupKey<T: IndexTag> {
    /// Compares `self` against the record's key (or key prefix), resolving
    /// string columns through the segment.
    fn cmp_record(&self, record: &T::Record, segment: &Segment) -> Ordering;
}
