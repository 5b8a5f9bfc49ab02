//! pixcache - Two-tier content cache for pixel buffers and text blobs.
//!
//! A fast in-memory LRU tier sits in front of a slower, persistent disk
//! tier. [`CacheSystem`] composes them into a single read-through /
//! write-through facade that can also run an optional decompression +
//! post-processing pipeline on reads.
//!
//! # High-Level API
//!
//! ```no_run
//! use pixcache::{CacheSystem, CacheSettings, CacheItem, CacheKind};
//! use pixcache::log::NoOpLogger;
//! use std::sync::Arc;
//!
//! let settings = CacheSettings::default();
//! let cache = CacheSystem::new(settings, Arc::new(NoOpLogger));
//!
//! cache.put_pixels("region-7", "tile-1203", CacheItem::pixels(vec![0u8; 4096]));
//! if let Ok(Some(item)) = cache.get(CacheKind::Pixels, "region-7", "tile-1203", None) {
//!     // item.data holds the payload
//! }
//! ```

pub mod cache;
pub mod config;
pub mod disk;
pub mod keylock;
pub mod log;
pub mod memory;
pub mod scratch;
pub mod stats;
pub mod status;
pub mod types;

pub use cache::{CacheSystem, ReadContext};
pub use config::{format_size, CacheSettings};
pub use disk::DiskStore;
pub use memory::{ByteSized, MemoryLru};
pub use stats::CacheStatistics;
pub use types::{CacheError, CacheItem, CacheKind, PutResponse};

/// Version of the pixcache library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
