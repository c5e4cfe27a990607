//! Cache configuration.
//!
//! Configuration structs have all public fields for simple instantiation:
//! create the struct with the fields set, or start from [`CacheConfig::default`]
//! and override what differs.
//!
//! # Sizing
//!
//! `segment_size` is both the initial size of a newly created segment and the
//! fixed increment applied on every growth. Growth is never proportional to
//! the allocation that failed; an insert larger than one increment fails
//! after the single retry. Size the segment so that one increment comfortably
//! holds the largest record batch you expect between grows.
//!
//! # Examples
//!
//! ```
//! use datacache::CacheConfig;
//!
//! // Defaults: 64 MiB segments under /tmp/CACHE
//! let config = CacheConfig::default();
//! assert_eq!(config.segment_size, 64 * 1024 * 1024);
//!
//! // Small segments for a test cache
//! let config = CacheConfig {
//!     base_dir: std::env::temp_dir().join("cache-test").display().to_string(),
//!     segment_size: 1024 * 1024,
//! };
//! # let _ = config;
//! ```

/// Default and growth-increment segment size: 64 MiB.
pub const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Default base directory for directory-addressed backends.
pub const DEFAULT_BASE_DIR: &str = "/tmp/CACHE";

/// Configuration for one cache instantiation.
///
/// # Fields
///
/// - `base_dir`: directory the mapped-file backend stores segments under.
///   Ignored by the shared-memory and heap backends, whose path convention
///   is name-only.
/// - `segment_size`: initial segment size and fixed growth increment, in
///   bytes.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Base directory for file-backed segments.
    pub base_dir: String,
    /// Initial segment size and growth increment in bytes.
    pub segment_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            base_dir: DEFAULT_BASE_DIR.to_owned(),
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}
