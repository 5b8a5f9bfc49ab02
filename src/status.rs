//! In-memory repository of disk existence checks.
//!
//! Memoizes, per cache id, whether a backing file exists and whether it is
//! the compressed variant, so repeated existence checks skip the
//! filesystem. One reader-writer lock protects the whole map; it is never
//! held across IO and is the innermost lock in the disk store's ordering.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::StatusEntry;

/// Status map for a single disk store.
pub struct StatusRepository {
    entries: RwLock<HashMap<String, StatusEntry>>,
}

impl StatusRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the memoized status for a key.
    pub fn get(&self, cache_id: &str) -> Option<StatusEntry> {
        let entries = self.entries.read().unwrap();
        entries.get(cache_id).cloned()
    }

    /// Install or replace the status for a key.
    pub fn insert(&self, cache_id: &str, entry: StatusEntry) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(cache_id.to_string(), entry);
    }

    /// Drop the status for a key, forcing the next check to re-probe.
    pub fn invalidate(&self, cache_id: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(cache_id);
    }

    /// Drop all statuses.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
    }

    /// Number of memoized keys (positive and negative entries).
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.len()
    }

    /// Whether any key is memoized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatusRepository {
    fn default() -> Self {
        Self::new()
    }
}
