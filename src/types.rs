//! Core types for the cache system.

use std::path::PathBuf;
use thiserror::Error;

/// Payload kind of a cache entry.
///
/// Selects the on-disk suffix, the memory tier, and the read allocation
/// strategy (pixel reads go through the thread-local scratch buffer, text
/// reads allocate fresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Opaque image pixel buffer.
    Pixels,
    /// UTF-8 text blob, gzip-framed on disk.
    Text,
}

/// A cache entry: an owned byte payload plus its metadata.
///
/// `size` is the declared size in bytes and may differ from `data.len()`
/// after a read-side transform has run. An item inserted into the memory
/// tier owns its buffer exclusively; no references to the thread-local
/// scratch buffer survive insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Declared size in bytes.
    pub size: usize,
    /// Whether the payload is the codec-compressed variant.
    pub compressed: bool,
    /// Payload kind.
    pub kind: CacheKind,
}

impl CacheItem {
    /// Create an uncompressed pixel item. `size` is the buffer length.
    pub fn pixels(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data,
            size,
            compressed: false,
            kind: CacheKind::Pixels,
        }
    }

    /// Create a codec-compressed pixel item. `size` is the buffer length.
    pub fn compressed_pixels(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data,
            size,
            compressed: true,
            kind: CacheKind::Pixels,
        }
    }

    /// Create a text item from a UTF-8 string. Size is the byte length.
    pub fn text(contents: impl Into<String>) -> Self {
        let data = contents.into().into_bytes();
        let size = data.len();
        Self {
            data,
            size,
            compressed: false,
            kind: CacheKind::Text,
        }
    }
}

/// Outcome of a disk-tier write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResponse {
    /// Payload written and status recorded.
    Success,
    /// Disk tier is disabled for this store's lifetime.
    Disabled,
    /// Empty key or empty payload.
    InvalidData,
    /// IO failure (including a create-new collision with an existing file).
    Error,
}

/// Cache-related errors.
///
/// Normal get/put traffic never surfaces these: disk failures are logged
/// and turned into [`PutResponse::Error`] or an absent read. Construction
/// rejects bad configuration, and a read of a compressed item with no
/// decompressor configured is a programming error that the caller sees.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration.
    #[error("Invalid cache configuration: {0}")]
    ConfigInvalid(String),

    /// A compressed item was read with no decompressor in the context.
    #[error("Item is compressed but no decompressor was supplied")]
    DecompressorMissing,

    /// I/O error during cache operations.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Memoized disk-existence record for a single cache id.
///
/// `present` implies `path` referred to an existing file at the time the
/// entry was written; stale entries self-heal by being invalidated on read
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Whether a backing file exists for this key.
    pub present: bool,
    /// Whether that file is the compressed variant.
    pub compressed: bool,
    /// Resolved path of the backing file, when present.
    pub path: Option<PathBuf>,
}

impl StatusEntry {
    /// Entry for a key with a backing file.
    pub fn found(compressed: bool, path: PathBuf) -> Self {
        Self {
            present: true,
            compressed,
            path: Some(path),
        }
    }

    /// Entry recording a negative probe.
    pub fn missing() -> Self {
        Self {
            present: false,
            compressed: false,
            path: None,
        }
    }
}
