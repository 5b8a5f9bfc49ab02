//! Named reader-writer lock registry.
//!
//! Disk operations serialize per cache id: readers on the same key may
//! proceed concurrently, writers are exclusive, and locks for different
//! keys never contend. Each key's lock is created lazily on first use
//! under a single coarse registry mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Registry of per-key reader-writer locks.
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl KeyLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the lock for a key, creating it on first use.
    ///
    /// The returned handle outlives the registry lookup; hold `.read()` or
    /// `.write()` guards across the guarded IO and release via drop.
    pub fn for_key(&self, key: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Number of keys that have instantiated a lock.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap();
        locks.len()
    }

    /// Whether any lock has been instantiated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_returns_same_lock() {
        let locks = KeyLocks::new();
        let a = locks.for_key("k1");
        let b = locks.for_key("k1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_keys_get_different_locks() {
        let locks = KeyLocks::new();
        let a = locks.for_key("k1");
        let b = locks.for_key("k2");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_on_same_key() {
        let locks = Arc::new(KeyLocks::new());
        let lock = locks.for_key("k");
        let _outer = lock.read().unwrap();

        // A second reader must not block behind the first.
        let locks_clone = locks.clone();
        let handle = thread::spawn(move || {
            let lock = locks_clone.for_key("k");
            let _inner = lock.read().unwrap();
        });
        handle.join().unwrap();
    }

    #[test]
    fn test_writer_excludes_reader() {
        let locks = Arc::new(KeyLocks::new());
        let lock = locks.for_key("k");
        let order = Arc::new(AtomicUsize::new(0));

        let guard = lock.write().unwrap();
        let locks_clone = locks.clone();
        let order_clone = order.clone();
        let handle = thread::spawn(move || {
            let lock = locks_clone.for_key("k");
            let _reader = lock.read().unwrap();
            order_clone.store(2, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        order.store(1, Ordering::SeqCst);
        drop(guard);
        handle.join().unwrap();

        assert_eq!(order.load(Ordering::SeqCst), 2, "reader ran after writer released");
    }

    #[test]
    fn test_locks_for_different_keys_do_not_contend() {
        let locks = Arc::new(KeyLocks::new());
        let lock_a = locks.for_key("a");
        let _writer = lock_a.write().unwrap();

        let locks_clone = locks.clone();
        let handle = thread::spawn(move || {
            let lock_b = locks_clone.for_key("b");
            let _writer = lock_b.write().unwrap();
        });
        handle.join().unwrap();
    }
}
