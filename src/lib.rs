#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   clear()/insert()   ┌────────────────────────────────┐
//! │   loader    │─────────────────────▶│  Segment "<name>"              │
//! │  process    │                      │  ┌──────────────────────────┐  │
//! └─────────────┘                      │  │ Container (multi-index)  │  │
//! ┌─────────────┐  retrieve::<Tag>()   │  │  entries + sorted index  │  │
//! │   bidder    │─────────────────────▶│  │  handle arrays           │  │
//! │  process    │                      │  └──────────────────────────┘  │
//! └─────────────┘                      │  entities (offset-addressed)   │
//!       ▲                              └────────────────────────────────┘
//!       │ shared / exclusive                        ▲
//!       └──────────── NamedRwLock "<name>_mutex" ───┘
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`backend`] | memory backend policies: [`backend::SharedMemory`], [`backend::MappedFile`], [`backend::Heap`] |
//! | [`EntityCache`] | the generic engine: insert/update/retrieve/remove/clear, grow-and-retry |
//! | [`entity`] | the record adapter contract and the concrete RTB entities |
//! | [`loader`] | tab-separated file loading, single and multi cache |
//! | [`NamedRwLock`] | the process-wide readers/writer lock |
//! | [`CacheMetrics`] | per-handle operation counters |
//!
//! # Choosing a backend
//!
//! | Backend | Use when |
//! |---------|----------|
//! | [`backend::SharedMemory`] | production serving: many processes, name-only addressing |
//! | [`backend::MappedFile`] | shared data that should live under a directory you control |
//! | [`backend::Heap`] | unit tests and single-process tools |
//!
//! # Error model
//!
//! Expected misses are values, not errors: duplicate insert returns
//! `Ok(false)`, a lookup with no match returns `false`/`None`/an empty
//! collection. [`CacheError`] is reserved for open failures at construction
//! and for an allocation that still fails after the automatic growth.

mod arena;
pub mod backend;
mod cache;
mod config;
mod container;
pub mod entity;
mod error;
pub mod loader;
mod lock;
mod metrics;
mod segment;

pub use arena::{AllocError, IpcString};
pub use cache::EntityCache;
pub use config::{CacheConfig, DEFAULT_BASE_DIR, DEFAULT_SEGMENT_SIZE};
pub use error::{CacheError, Result};
pub use lock::{ExclusiveGuard, NamedRwLock, SharedGuard};
pub use metrics::CacheMetrics;
pub use segment::Segment;
