//! Error types for the entity cache.
//!
//! Only genuinely exceptional OS-level conditions are surfaced as errors:
//! failing to create or open the backing store or its named lock, and an
//! allocation failure that persists after the one automatic segment growth.
//! Ordinary outcomes — duplicate key on insert, no match on retrieve, update
//! or remove — are communicated through boolean or empty-collection returns
//! so that hot-path serving code never needs error-handling machinery for
//! expected misses.

use thiserror::Error;

/// Result type alias using [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by cache construction and mutating operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing segment could not be created or opened.
    #[error("failed to open store {path}: {source}")]
    StoreOpen {
        /// Path (or shared-memory name) of the backing segment.
        path: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The named interprocess lock could not be created or opened.
    #[error("failed to open lock {name}: {source}")]
    LockOpen {
        /// Name of the lock object.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// An allocation failed again after the segment was grown once.
    ///
    /// Terminal for the call that triggered it. The segment is left as
    /// grown; previously stored entities are unaffected.
    #[error("allocation of {needed} bytes failed after segment growth")]
    SegmentFull {
        /// Size of the allocation that could not be satisfied.
        needed: usize,
    },

    /// I/O error while reading a data file in the loader layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
