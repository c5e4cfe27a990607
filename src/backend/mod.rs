//! Memory backend policies.
//!
//! A cache is generic over where its segment lives. The three policies are
//! interchangeable and expose one capability set:
//!
//! | Backend | Storage | Addressing | Grow |
//! |---------|---------|------------|------|
//! | [`SharedMemory`] | POSIX shared memory (`shm_open`) | name only | detach, resize, reattach |
//! | [`MappedFile`] | memory-mapped regular file | `<base_dir>/<name>` | detach, resize, reattach |
//! | [`Heap`] | process-local zeroed block | none | in place |
//!
//! `SharedMemory` and `MappedFile` give many processes the same dataset;
//! `Heap` emulates the interface for single-process use (tests, tooling)
//! with nothing persisted or shared.
//!
//! `open_or_create` is idempotent: when another process already created the
//! segment, the call succeeds by opening it. A grow performed by one process
//! is not synchronously visible to processes attached to the old mapping —
//! they observe the larger backing store when they next reattach.

mod heap;
mod mapped;
pub(crate) mod shared;

pub use heap::Heap;
pub use mapped::MappedFile;
pub use shared::SharedMemory;

use std::io;

use crate::lock::NamedRwLock;
use crate::segment::Segment;

/// Capability set every memory backend provides.
///
/// All functions are associated (the policy types are stateless markers);
/// the cache engine is generic over the implementor.
pub trait MemoryBackend {
    /// Opens the segment at `path`, creating it with `size` bytes if it does
    /// not exist yet. Must succeed by opening when another process created
    /// the segment first.
    fn open_or_create(path: &str, size: usize) -> io::Result<Segment>;

    /// Opens an existing segment at its current size.
    fn open(path: &str) -> io::Result<Segment>;

    /// Creates the segment, failing if it already exists.
    fn create(path: &str, size: usize) -> io::Result<Segment>;

    /// Grows the backing store by `increment` bytes and reattaches
    /// `segment` to the enlarged store.
    fn grow(segment: &mut Segment, path: &str, increment: usize) -> io::Result<()>;

    /// Applies the backend's directory convention to a configured base
    /// directory, yielding the prefix a cache name is appended to.
    fn convert_base_dir(base_dir: &str) -> String;

    /// Opens or creates the named lock paired with a cache, following the
    /// backend's addressing convention.
    fn open_or_create_lock(name: &str, base_dir: &str) -> io::Result<NamedRwLock>;

    /// Removes the backing store, returning whether anything was removed.
    /// Attached processes keep their mappings until they detach.
    fn remove(path: &str) -> bool;

    /// Removes the named lock's backing object, if any.
    fn remove_lock(name: &str, base_dir: &str) -> bool;
}
