//! Small shared helpers used across subsystems.

use std::hash::Hash;
use std::sync::Mutex;

use lru::LruCache;

/// A bounded, thread-safe memoization cache.
///
/// [`crate::jid`] uses two of these (capacity ~128 for `create`, ~1024 for
/// `parse`, per the spec's caching note) to avoid re-running PRECIS/IDNA
/// enforcement on repeated input. The cache is purely an optimization: a
/// miss recomputes `f` and stores the result, so it never changes observable
/// semantics.
pub struct BoundedCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Return the cached value for `key`, or compute it with `f`, cache it,
    /// and return it.
    pub fn get_or_insert_with(&self, key: K, f: impl FnOnce() -> V) -> V {
        let mut guard = self.inner.lock().unwrap();
        if let Some(v) = guard.get(&key) {
            return v.clone();
        }
        let v = f();
        guard.put(key, v.clone());
        v
    }

    /// Drop every cached entry. Used by tests that need deterministic,
    /// cache-free runs.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}
