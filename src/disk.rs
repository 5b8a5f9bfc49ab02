//! Persistent disk tier.
//!
//! Payloads live under `${root}/${top_level_id}/${cache_id}{suffix}` where
//! the suffix encodes payload type and compression:
//!
//! ```text
//! .p    uncompressed pixel bytes
//! .cp   codec-compressed pixel bytes (opaque)
//! .s    gzip-compressed UTF-8 text
//! ```
//!
//! Files are written once with create-new semantics and never updated in
//! place. Existence checks are memoized in an in-memory status repository;
//! reads and writes serialize per key through a named reader-writer lock
//! registry. Disk failures never escape as errors: puts report
//! [`PutResponse::Error`], reads come back absent and invalidate the
//! status entry so the next check re-probes the filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CacheSettings;
use crate::keylock::KeyLocks;
use crate::log::Logger;
use crate::scratch::with_scratch;
use crate::stats::DiskTierStats;
use crate::status::StatusRepository;
use crate::types::{CacheError, CacheItem, CacheKind, PutResponse, StatusEntry};
use crate::{log_debug, log_error};

/// Write granularity for payloads.
const WRITE_CHUNK: usize = 4096;

/// Suffix for a payload of the given kind and compression flag.
fn suffix(kind: CacheKind, compressed: bool) -> &'static str {
    match (kind, compressed) {
        (CacheKind::Pixels, false) => ".p",
        (CacheKind::Pixels, true) => ".cp",
        (CacheKind::Text, _) => ".s",
    }
}

/// Disk store mapping `(top_level_id, cache_id, kind)` to a file.
///
/// A store that cannot come up (disk tier disabled in configuration, empty
/// or unusable root) is permanently disabled: every operation becomes a
/// no-op returning `Disabled` / absent / `false`. Disablement is logged at
/// error level once, at construction.
pub struct DiskStore {
    /// Resolved root directory; `None` when the store is disabled.
    root: Option<PathBuf>,
    key_locks: KeyLocks,
    status: StatusRepository,
    stats: Mutex<DiskTierStats>,
    logger: Arc<dyn Logger>,
}

impl DiskStore {
    /// Create a disk store from settings.
    ///
    /// Construction never fails; an unusable configuration yields a
    /// disabled store instead.
    pub fn new(settings: &CacheSettings, logger: Arc<dyn Logger>) -> Self {
        let root = Self::resolve_root(settings, &logger);
        Self {
            root,
            key_locks: KeyLocks::new(),
            status: StatusRepository::new(),
            stats: Mutex::new(DiskTierStats::default()),
            logger,
        }
    }

    fn resolve_root(settings: &CacheSettings, logger: &Arc<dyn Logger>) -> Option<PathBuf> {
        if !settings.disk_cache_enabled {
            log_error!(logger, "Disk cache disabled by configuration");
            return None;
        }
        let root = &settings.disk_cache_root_folder;
        if root.as_os_str().is_empty() {
            log_error!(logger, "Disk cache disabled: root folder is empty");
            return None;
        }
        #[cfg(windows)]
        {
            use std::path::Component;
            let has_prefix = matches!(root.components().next(), Some(Component::Prefix(_)));
            if !has_prefix {
                log_error!(
                    logger,
                    "Disk cache disabled: root '{}' lacks a volume prefix",
                    root.display()
                );
                return None;
            }
        }
        if let Err(e) = fs::create_dir_all(root) {
            log_error!(
                logger,
                "Disk cache disabled: cannot create root '{}': {}",
                root.display(),
                e
            );
            return None;
        }
        Some(root.clone())
    }

    /// Whether the store accepted its configuration.
    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    fn file_path(root: &Path, top_level_id: &str, cache_id: &str, suffix: &str) -> PathBuf {
        root.join(top_level_id).join(format!("{cache_id}{suffix}"))
    }

    /// Write a pixel payload under create-new semantics.
    ///
    /// The file is written in chunks of up to 4096 bytes. A put against an
    /// existing file fails with [`PutResponse::Error`]; callers that want
    /// to replace must clear first. The status entry is only touched on
    /// success.
    pub fn put_bytes(&self, top_level_id: &str, cache_id: &str, item: &CacheItem) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if cache_id.is_empty() || item.data.is_empty() {
            return PutResponse::InvalidData;
        }

        let lock = self.key_locks.for_key(cache_id);
        let _guard = lock.write().unwrap();

        let path = Self::file_path(root, top_level_id, cache_id, suffix(item.kind, item.compressed));
        match self.write_new_file(&path, &item.data) {
            Ok(()) => {
                self.status
                    .insert(cache_id, StatusEntry::found(item.compressed, path));
                self.stats.lock().unwrap().writes += 1;
                PutResponse::Success
            }
            Err(e) => {
                log_debug!(
                    self.logger,
                    "Disk write failed for '{}': {}",
                    path.display(),
                    e
                );
                self.stats.lock().unwrap().write_failures += 1;
                PutResponse::Error
            }
        }
    }

    /// Write a pixel payload from a streaming source.
    ///
    /// Same contract as [`put_bytes`](Self::put_bytes); a source that
    /// yields no bytes at all is rejected as `InvalidData` before the
    /// target file is created.
    pub fn put_stream(
        &self,
        top_level_id: &str,
        cache_id: &str,
        compressed: bool,
        source: &mut dyn Read,
    ) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if cache_id.is_empty() {
            return PutResponse::InvalidData;
        }

        // Pull the first chunk before touching the filesystem so an empty
        // source leaves no file behind.
        let mut first = [0u8; WRITE_CHUNK];
        let first_len = match read_chunk(source, &mut first) {
            Ok(0) => return PutResponse::InvalidData,
            Ok(n) => n,
            Err(e) => {
                log_debug!(self.logger, "Disk stream read failed for '{cache_id}': {e}");
                self.stats.lock().unwrap().write_failures += 1;
                return PutResponse::Error;
            }
        };

        let lock = self.key_locks.for_key(cache_id);
        let _guard = lock.write().unwrap();

        let path = Self::file_path(root, top_level_id, cache_id, suffix(CacheKind::Pixels, compressed));
        let result = (|| -> Result<(), CacheError> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
            file.write_all(&first[..first_len])?;
            let mut chunk = [0u8; WRITE_CHUNK];
            loop {
                let n = read_chunk(source, &mut chunk)?;
                if n == 0 {
                    break;
                }
                file.write_all(&chunk[..n])?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.status
                    .insert(cache_id, StatusEntry::found(compressed, path));
                self.stats.lock().unwrap().writes += 1;
                PutResponse::Success
            }
            Err(e) => {
                log_debug!(
                    self.logger,
                    "Disk stream write failed for '{}': {}",
                    path.display(),
                    e
                );
                self.stats.lock().unwrap().write_failures += 1;
                PutResponse::Error
            }
        }
    }

    /// Write a text payload, gzip-compressing on the fly.
    ///
    /// The target uses the `.s` suffix and the status entry records the
    /// payload as compressed.
    pub fn put_text(&self, top_level_id: &str, cache_id: &str, item: &CacheItem) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if cache_id.is_empty() || item.data.is_empty() {
            return PutResponse::InvalidData;
        }

        let lock = self.key_locks.for_key(cache_id);
        let _guard = lock.write().unwrap();

        let path = Self::file_path(root, top_level_id, cache_id, suffix(CacheKind::Text, true));
        let result = (|| -> Result<(), CacheError> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            for chunk in item.data.chunks(WRITE_CHUNK) {
                encoder.write_all(chunk)?;
            }
            encoder.finish()?.flush()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.status
                    .insert(cache_id, StatusEntry::found(true, path));
                self.stats.lock().unwrap().writes += 1;
                PutResponse::Success
            }
            Err(e) => {
                log_debug!(
                    self.logger,
                    "Disk text write failed for '{}': {}",
                    path.display(),
                    e
                );
                self.stats.lock().unwrap().write_failures += 1;
                PutResponse::Error
            }
        }
    }

    /// Read a payload and hand it to `f` as a borrowed view.
    ///
    /// Pixel payloads are read into the thread-local scratch buffer; the
    /// view handed to `f` is only valid for the duration of the call and
    /// must be copied into an owned buffer to be retained. Text payloads
    /// are read into a fresh allocation. `f` receives the bytes and the
    /// compression flag from the status entry; the payload length is the
    /// file length.
    ///
    /// Returns `None` when the store is disabled, the key is empty or not
    /// present, or the read fails (in which case the status entry is
    /// invalidated so the next check re-probes the disk).
    pub fn get_with<R>(
        &self,
        kind: CacheKind,
        top_level_id: &str,
        cache_id: &str,
        f: impl FnOnce(&[u8], bool) -> R,
    ) -> Option<R> {
        if self.root.is_none() || cache_id.is_empty() {
            return None;
        }
        if !self.is_cached(kind, top_level_id, cache_id) {
            self.stats.lock().unwrap().misses += 1;
            return None;
        }
        let entry = self.status.get(cache_id)?;
        let path = entry.path.clone()?;

        let lock = self.key_locks.for_key(cache_id);
        let guard = lock.read().unwrap();
        let result = read_payload(kind, &path, entry.compressed, f);
        drop(guard);

        match result {
            Ok(value) => {
                self.stats.lock().unwrap().hits += 1;
                Some(value)
            }
            Err(e) => {
                log_debug!(
                    self.logger,
                    "Disk read failed for '{}': {}",
                    path.display(),
                    e
                );
                self.status.invalidate(cache_id);
                self.stats.lock().unwrap().misses += 1;
                None
            }
        }
    }

    /// Read a payload into an owned [`CacheItem`].
    ///
    /// Convenience over [`get_with`](Self::get_with) that always copies
    /// out of the scratch buffer.
    pub fn get(&self, kind: CacheKind, top_level_id: &str, cache_id: &str) -> Option<CacheItem> {
        self.get_with(kind, top_level_id, cache_id, |bytes, compressed| CacheItem {
            data: bytes.to_vec(),
            size: bytes.len(),
            compressed,
            kind,
        })
    }

    /// Whether a backing file exists for this key.
    ///
    /// Fast path: the memoized status answers without touching the disk.
    /// Slow path: probes the filesystem under the per-key read lock (for
    /// pixels the compressed variant is preferred) and installs the
    /// resulting status, negative probes included. Two consecutive calls
    /// with no intervening put or clear return the same value.
    pub fn is_cached(&self, kind: CacheKind, top_level_id: &str, cache_id: &str) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        if cache_id.is_empty() {
            return false;
        }
        if let Some(entry) = self.status.get(cache_id) {
            return entry.present;
        }

        let lock = self.key_locks.for_key(cache_id);
        let _guard = lock.read().unwrap();

        let entry = match kind {
            CacheKind::Pixels => {
                let compressed = Self::file_path(root, top_level_id, cache_id, ".cp");
                let plain = Self::file_path(root, top_level_id, cache_id, ".p");
                if compressed.is_file() {
                    StatusEntry::found(true, compressed)
                } else if plain.is_file() {
                    StatusEntry::found(false, plain)
                } else {
                    StatusEntry::missing()
                }
            }
            CacheKind::Text => {
                let path = Self::file_path(root, top_level_id, cache_id, ".s");
                if path.is_file() {
                    StatusEntry::found(true, path)
                } else {
                    StatusEntry::missing()
                }
            }
        };
        let present = entry.present;
        self.status.insert(cache_id, entry);
        present
    }

    /// Invalidate the memoized status for a key.
    ///
    /// The backing file is left on disk; because puts use create-new
    /// semantics, a subsequent put for the same key fails with `Error`
    /// until the file is removed externally.
    pub fn clear_is_cached(&self, cache_id: &str) {
        self.status.invalidate(cache_id);
    }

    /// List the filenames under a top-level subdirectory.
    ///
    /// Best-effort: IO errors yield an empty sequence.
    pub fn enumerate(&self, top_level_id: &str) -> Vec<String> {
        let Some(root) = &self.root else {
            return Vec::new();
        };
        let dir = root.join(top_level_id);
        match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
            Err(e) => {
                log_debug!(
                    self.logger,
                    "Disk enumerate failed for '{}': {}",
                    dir.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Snapshot of the tier counters.
    pub fn stats(&self) -> DiskTierStats {
        *self.stats.lock().unwrap()
    }

    fn write_new_file(&self, path: &Path, data: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        for chunk in data.chunks(WRITE_CHUNK) {
            file.write_all(chunk)?;
        }
        file.flush()?;
        Ok(())
    }
}

/// Read until `buf` is full or the source is exhausted.
fn read_chunk(source: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_payload<R>(
    kind: CacheKind,
    path: &Path,
    compressed: bool,
    f: impl FnOnce(&[u8], bool) -> R,
) -> Result<R, CacheError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    match kind {
        CacheKind::Pixels => with_scratch(len, |buf| {
            file.read_exact(buf)?;
            Ok(f(buf, compressed))
        }),
        CacheKind::Text => {
            let mut buf = Vec::with_capacity(len);
            file.read_to_end(&mut buf)?;
            Ok(f(&buf, compressed))
        }
    }
}
