//! The generic cache engine.
//!
//! [`EntityCache`] binds a memory backend, a segment, a container and a named
//! lock to one cache name. Loader processes construct a cache and call
//! [`clear`](EntityCache::clear) then [`insert`](EntityCache::insert) per
//! parsed record; serving processes construct their own instance bound to
//! the same name (attaching to the same backing store) and call
//! [`retrieve`](EntityCache::retrieve) per request. Only the
//! [`Record`] adapter differs per domain type.
//!
//! # Locking
//!
//! Every public operation acquires the named lock `<name>_mutex` for its
//! full duration: shared mode for reads, exclusive mode for writes. There is
//! no cross-call atomicity — "read, then conditionally write" across two
//! calls can interleave with another process.
//!
//! # Growth
//!
//! When an allocation fails while storing or indexing an entity, the engine
//! logs the segment's free bytes, grows the backing store by one configured
//! increment, reattaches, and retries the identical operation exactly once
//! more; a second failure surfaces as
//! [`CacheError::SegmentFull`]. Handles resolved before a grow
//! are invalid afterwards, so every operation re-resolves the container root
//! on entry and nothing is ever cached across calls. A grow performed here
//! is not synchronously visible to other attached processes; they observe
//! the larger store when they next reattach.

use core::fmt;
use core::marker::PhantomData;

use tracing::debug;

use crate::arena::{AllocError, IpcString};
use crate::backend::MemoryBackend;
use crate::config::CacheConfig;
use crate::container;
use crate::entity::{IndexTag, LookupKey, Record};
use crate::error::{CacheError, Result};
use crate::lock::NamedRwLock;
use crate::metrics::CacheMetrics;
use crate::segment::{Segment, MAX_ROOT_NAME};

/// A process-shared, keyed, multi-index entity store with automatic growth.
///
/// Generic over the [`MemoryBackend`] the segment lives in and the
/// [`Record`] adapter of the stored domain type.
///
/// # Example
///
/// ```
/// use datacache::backend::Heap;
/// use datacache::entity::campaign::{BudgetEntity, ByCampaignId, CampaignBudget, CampaignKey};
/// use datacache::EntityCache;
///
/// let mut cache: EntityCache<Heap, BudgetEntity> =
///     EntityCache::new("campaign_budget_example").unwrap();
/// let budget = CampaignBudget::new(17, 1_000_000);
/// assert!(cache.insert(&CampaignKey { campaign_id: 17 }, &budget).unwrap());
///
/// let mut out = Vec::new();
/// assert!(cache.retrieve::<ByCampaignId, _>(&mut out, &17u32));
/// assert_eq!(out[0].day_budget_limit, 1_000_000);
/// ```
pub struct EntityCache<M: MemoryBackend, R: Record> {
    name: String,
    store_path: String,
    config: CacheConfig,
    segment: Segment,
    root: u64,
    lock: NamedRwLock,
    metrics: CacheMetrics,
    _backend: PhantomData<fn() -> (M, R)>,
}

impl<M: MemoryBackend, R: Record> EntityCache<M, R> {
    /// Opens or creates the cache `name` with default configuration
    /// (64 MiB segments, `/tmp/CACHE` base directory).
    pub fn new(name: &str) -> Result<Self> {
        Self::with_config(name, CacheConfig::default())
    }

    /// Opens or creates the cache `name`.
    ///
    /// Derives the store path from the backend's directory convention,
    /// opens-or-creates the segment and the named lock `<name>_mutex`, and
    /// finds-or-constructs the container; initialization is serialized under
    /// the lock's exclusive mode so racing processes agree on the winner.
    pub fn with_config(name: &str, config: CacheConfig) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_ROOT_NAME {
            return Err(CacheError::StoreOpen {
                path: name.to_owned(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "cache name must be between 1 and 64 bytes",
                ),
            });
        }
        let lock_name = format!("{name}_mutex");
        let lock = M::open_or_create_lock(&lock_name, &config.base_dir).map_err(|source| {
            CacheError::LockOpen {
                name: lock_name,
                source,
            }
        })?;
        let store_path = format!("{}{name}", M::convert_base_dir(&config.base_dir));

        let guard = lock.exclusive();
        let mut segment =
            M::open_or_create(&store_path, config.segment_size).map_err(|source| {
                CacheError::StoreOpen {
                    path: store_path.clone(),
                    source,
                }
            })?;
        segment.ensure_initialized();
        let root = container::find_or_construct::<R>(&mut segment, name)
            .map_err(|e| CacheError::SegmentFull { needed: e.needed })?;
        drop(guard);

        Ok(EntityCache {
            name: name.to_owned(),
            store_path,
            config,
            segment,
            root,
            lock,
            metrics: CacheMetrics::new(),
            _backend: PhantomData,
        })
    }

    /// The cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The derived backing-store path.
    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// This handle's operation counters.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        let _guard = self.lock.shared();
        let root = container::resolve(&self.segment, &self.name);
        container::len(&self.segment, root)
    }

    /// Whether the cache holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every entity. Exclusive lock.
    pub fn clear(&mut self) {
        let _guard = self.lock.exclusive();
        self.root = container::resolve(&self.segment, &self.name);
        container::clear::<R>(&mut self.segment, self.root);
    }

    /// Stores a new entity adapted from `(key, payload)`.
    ///
    /// Returns `Ok(false)` — leaving the first stored payload unchanged —
    /// when an entity with an equal unique key already exists. Applies the
    /// grow-and-retry-once policy on allocation exhaustion; exclusive lock.
    pub fn insert(&mut self, key: &R::Key, payload: &R::Payload) -> Result<bool> {
        let _guard = self.lock.exclusive();
        self.root = container::resolve(&self.segment, &self.name);
        let inserted = match Self::insert_data(&mut self.segment, self.root, key, payload) {
            Ok(inserted) => inserted,
            Err(err) => {
                self.grow_for(err)?;
                Self::insert_data(&mut self.segment, self.root, key, payload)
                    .map_err(|e| CacheError::SegmentFull { needed: e.needed })?
            }
        };
        if inserted {
            self.metrics.record_insert();
        } else {
            self.metrics.record_duplicate();
        }
        Ok(inserted)
    }

    /// Replaces the content of every entity matching `q` under tag `T` with
    /// content adapted from `(key, payload)`.
    ///
    /// Returns whether at least one entity was modified; the grow-and-retry
    /// policy applies per modified entity. An entity whose new key would
    /// collide with a different entity on a unique index is erased instead
    /// of modified. Exclusive lock.
    pub fn update<T, Q>(&mut self, key: &R::Key, payload: &R::Payload, q: &Q) -> Result<bool>
    where
        T: IndexTag<Record = R>,
        Q: LookupKey<T> + ?Sized,
    {
        let _guard = self.lock.exclusive();
        self.root = container::resolve(&self.segment, &self.name);
        let range = container::equal_range::<T, Q>(&self.segment, self.root, q);
        let handles = container::handles_in_range::<T>(&self.segment, self.root, range);

        let mut modified = 0u64;
        for handle in handles {
            let done = match Self::modify_one(&mut self.segment, self.root, key, payload, handle) {
                Ok(done) => done,
                Err(err) => {
                    self.grow_for(err)?;
                    Self::modify_one(&mut self.segment, self.root, key, payload, handle)
                        .map_err(|e| CacheError::SegmentFull { needed: e.needed })?
                }
            };
            modified += u64::from(done);
        }
        self.metrics.record_updates(modified);
        Ok(modified > 0)
    }

    /// Copies every entity matching `q` under tag `T` into `out`.
    ///
    /// `q` may be the index's full key or any prefix of a composite key.
    /// Returns whether `out` is non-empty afterwards. Shared lock.
    pub fn retrieve<T, Q>(&self, out: &mut Vec<R::Payload>, q: &Q) -> bool
    where
        T: IndexTag<Record = R>,
        Q: LookupKey<T> + ?Sized,
    {
        let _guard = self.lock.shared();
        let root = container::resolve(&self.segment, &self.name);
        let range = container::equal_range::<T, Q>(&self.segment, root, q);
        for handle in container::handles_in_range::<T>(&self.segment, root, range) {
            let rec: R = self.segment.read(handle);
            out.push(rec.retrieve(&self.segment));
        }
        let found = !out.is_empty();
        self.metrics.record_lookup(found);
        found
    }

    /// Copies the first entity matching `q` under tag `T`, if any.
    /// Shared lock.
    pub fn retrieve_one<T, Q>(&self, q: &Q) -> Option<R::Payload>
    where
        T: IndexTag<Record = R>,
        Q: LookupKey<T> + ?Sized,
    {
        let _guard = self.lock.shared();
        let root = container::resolve(&self.segment, &self.name);
        let (lo, hi) = container::equal_range::<T, Q>(&self.segment, root, q);
        let found = lo < hi;
        self.metrics.record_lookup(found);
        if !found {
            return None;
        }
        let handle = container::handles_in_range::<T>(&self.segment, root, (lo, lo + 1))[0];
        let rec: R = self.segment.read(handle);
        Some(rec.retrieve(&self.segment))
    }

    /// Copies every stored entity into `out`, in insertion order — the full
    /// scan used for diagnostics and small caches. Returns whether `out` is
    /// non-empty afterwards. Shared lock.
    pub fn retrieve_all(&self, out: &mut Vec<R::Payload>) -> bool {
        let _guard = self.lock.shared();
        let root = container::resolve(&self.segment, &self.name);
        for handle in container::all_handles(&self.segment, root) {
            let rec: R = self.segment.read(handle);
            out.push(rec.retrieve(&self.segment));
        }
        !out.is_empty()
    }

    /// Erases every entity matching `q` under tag `T`, returning how many
    /// were erased. Exclusive lock.
    pub fn remove<T, Q>(&mut self, q: &Q) -> usize
    where
        T: IndexTag<Record = R>,
        Q: LookupKey<T> + ?Sized,
    {
        let _guard = self.lock.exclusive();
        self.root = container::resolve(&self.segment, &self.name);
        let range = container::equal_range::<T, Q>(&self.segment, self.root, q);
        let handles = container::handles_in_range::<T>(&self.segment, self.root, range);
        for handle in &handles {
            container::erase::<R>(&mut self.segment, self.root, *handle);
        }
        self.metrics.record_removes(handles.len() as u64);
        handles.len()
    }

    /// Copies a caller-owned string into a segment-allocated string, so it
    /// can live inside records or be compared against segment-resident
    /// composite keys without an allocator mismatch. Grow-and-retry-once;
    /// exclusive lock.
    pub fn create_ipc_key(&mut self, key: &str) -> Result<IpcString> {
        let _guard = self.lock.exclusive();
        match self.segment.alloc_str(key) {
            Ok(s) => Ok(s),
            Err(err) => {
                self.grow_for(err)?;
                self.segment
                    .alloc_str(key)
                    .map_err(|e| CacheError::SegmentFull { needed: e.needed })
            }
        }
    }

    /// Resolves a segment string created by
    /// [`create_ipc_key`](Self::create_ipc_key) back to an owned string.
    /// Shared lock.
    pub fn resolve_ipc_key(&self, key: &IpcString) -> String {
        let _guard = self.lock.shared();
        self.segment.str_of(key).to_owned()
    }

    fn insert_data(
        segment: &mut Segment,
        root: u64,
        key: &R::Key,
        payload: &R::Payload,
    ) -> std::result::Result<bool, AllocError> {
        let rec = R::store(key, payload, segment)?;
        match container::insert::<R>(segment, root, &rec) {
            Ok(true) => Ok(true),
            Ok(false) => {
                rec.destroy(segment);
                Ok(false)
            }
            Err(e) => {
                rec.destroy(segment);
                Err(e)
            }
        }
    }

    /// Replaces one entity's content in place, relocating it within every
    /// index. Mirrors the modify-apply contract: on a unique-key collision
    /// the entity is erased and `Ok(false)` returned.
    fn modify_one(
        segment: &mut Segment,
        root: u64,
        key: &R::Key,
        payload: &R::Payload,
        handle: u64,
    ) -> std::result::Result<bool, AllocError> {
        container::unlink_from_indexes::<R>(segment, root, handle);
        let new_rec = match R::store(key, payload, segment) {
            Ok(rec) => rec,
            Err(e) => {
                container::relink::<R>(segment, root, handle);
                return Err(e);
            }
        };
        if container::would_conflict::<R>(segment, root, &new_rec) {
            new_rec.destroy(segment);
            container::erase_unlinked::<R>(segment, root, handle);
            return Ok(false);
        }
        let old: R = segment.read(handle);
        old.destroy(segment);
        segment.write(handle, &new_rec);
        container::relink::<R>(segment, root, handle);
        Ok(true)
    }

    /// Grows the segment by one increment and reattaches, invalidating every
    /// previously resolved handle in this process.
    fn grow_for(&mut self, err: AllocError) -> Result<()> {
        debug!(
            cache = %self.name,
            free_bytes = self.segment.free_bytes(),
            needed = err.needed,
            "allocation failed, growing segment"
        );
        M::grow(
            &mut self.segment,
            &self.store_path,
            self.config.segment_size,
        )
        .map_err(|source| CacheError::StoreOpen {
            path: self.store_path.clone(),
            source,
        })?;
        self.segment.ensure_initialized();
        self.root = container::find_or_construct::<R>(&mut self.segment, &self.name)
            .map_err(|e| CacheError::SegmentFull { needed: e.needed })?;
        self.metrics.record_grow();
        debug!(
            cache = %self.name,
            free_bytes = self.segment.free_bytes(),
            "segment grown and reattached"
        );
        Ok(())
    }
}

impl<M: MemoryBackend, R: Record> fmt::Debug for EntityCache<M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("name", &self.name)
            .field("store_path", &self.store_path)
            .field("segment", &self.segment)
            .finish()
    }
}
