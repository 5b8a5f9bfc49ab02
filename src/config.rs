//! Cache configuration.
//!
//! Settings arrive either programmatically (builder methods) or as a
//! string key/value map from the embedding application's configuration
//! source ([`CacheSettings::from_keys`]).
//!
//! Recognized keys:
//!
//! | key | effect |
//! |---|---|
//! | `disk_cache_enabled` | master switch for the disk tier |
//! | `disk_cache_root_folder` | root directory for disk files |
//! | `pixel_memory_cache_capacity_mb` | byte budget for the pixel LRU (MiB) |
//! | `string_memory_cache_capacity_mb` | byte budget for the text LRU (MiB) |
//!
//! A capacity of `0` means unbounded.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::CacheError;

/// Bytes per configured megabyte.
const MIB: usize = 1024 * 1024;

/// Default pixel memory tier budget (512 MiB).
const DEFAULT_PIXEL_CAPACITY: usize = 512 * MIB;

/// Default text memory tier budget (32 MiB).
const DEFAULT_TEXT_CAPACITY: usize = 32 * MIB;

/// Complete cache configuration.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Master switch for the disk tier.
    pub disk_cache_enabled: bool,
    /// Root directory for disk cache files.
    pub disk_cache_root_folder: PathBuf,
    /// Byte budget for the pixel memory tier (0 = unbounded).
    pub pixel_memory_capacity_bytes: usize,
    /// Byte budget for the text memory tier (0 = unbounded).
    pub text_memory_capacity_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pixcache");

        Self {
            disk_cache_enabled: true,
            disk_cache_root_folder: root,
            pixel_memory_capacity_bytes: DEFAULT_PIXEL_CAPACITY,
            text_memory_capacity_bytes: DEFAULT_TEXT_CAPACITY,
        }
    }
}

impl CacheSettings {
    /// Build settings from a string key/value map.
    ///
    /// Unrecognized keys are ignored so the caller can hand over its whole
    /// configuration section. Capacities are megabytes; negative values are
    /// rejected with [`CacheError::ConfigInvalid`].
    pub fn from_keys(keys: &HashMap<String, String>) -> Result<Self, CacheError> {
        let mut settings = Self::default();

        if let Some(value) = keys.get("disk_cache_enabled") {
            settings.disk_cache_enabled = parse_bool("disk_cache_enabled", value)?;
        }
        if let Some(value) = keys.get("disk_cache_root_folder") {
            settings.disk_cache_root_folder = PathBuf::from(value);
        }
        if let Some(value) = keys.get("pixel_memory_cache_capacity_mb") {
            settings.pixel_memory_capacity_bytes =
                parse_capacity_mb("pixel_memory_cache_capacity_mb", value)?;
        }
        if let Some(value) = keys.get("string_memory_cache_capacity_mb") {
            settings.text_memory_capacity_bytes =
                parse_capacity_mb("string_memory_cache_capacity_mb", value)?;
        }

        Ok(settings)
    }

    /// Enable or disable the disk tier.
    pub fn with_disk_enabled(mut self, enabled: bool) -> Self {
        self.disk_cache_enabled = enabled;
        self
    }

    /// Set the disk root folder.
    pub fn with_root_folder(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_cache_root_folder = root.into();
        self
    }

    /// Set the pixel memory tier budget in bytes (0 = unbounded).
    pub fn with_pixel_capacity(mut self, bytes: usize) -> Self {
        self.pixel_memory_capacity_bytes = bytes;
        self
    }

    /// Set the text memory tier budget in bytes (0 = unbounded).
    pub fn with_text_capacity(mut self, bytes: usize) -> Self {
        self.text_memory_capacity_bytes = bytes;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CacheError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CacheError::ConfigInvalid(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_capacity_mb(key: &str, value: &str) -> Result<usize, CacheError> {
    let mb: i64 = value
        .trim()
        .parse()
        .map_err(|_| CacheError::ConfigInvalid(format!("{key}: expected an integer, got '{value}'")))?;
    if mb < 0 {
        return Err(CacheError::ConfigInvalid(format!(
            "{key}: capacity must not be negative, got {mb}"
        )));
    }
    (mb as usize).checked_mul(MIB).ok_or_else(|| {
        CacheError::ConfigInvalid(format!("{key}: capacity overflows, got {mb} MB"))
    })
}

/// Format a byte count as a human-readable string for log lines.
///
/// # Examples
///
/// ```
/// use pixcache::config::format_size;
///
/// assert_eq!(format_size(1024), "1KB");
/// assert_eq!(format_size(500 * 1024 * 1024), "500MB");
/// assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2GB");
/// ```
pub fn format_size(bytes: usize) -> String {
    const GB: usize = 1024 * 1024 * 1024;
    const MB: usize = 1024 * 1024;
    const KB: usize = 1024;

    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{}", bytes)
    }
}
