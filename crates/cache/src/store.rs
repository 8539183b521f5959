//! Concurrent key/value result store.

use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared on/off switch for a group of caches.
///
/// Cloning shares the flag, so flipping it on one handle is seen by every
/// cache created with a clone.
#[derive(Debug, Clone)]
pub struct Switch(Arc<AtomicBool>);
impl Switch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the previous state.
    pub fn set(&self, enabled: bool) -> bool {
        self.0.swap(enabled, Ordering::AcqRel)
    }
}
impl Default for Switch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Thread-safe result store.
///
/// Backed by a sharded [`DashMap`], so readers and writers on different keys
/// never contend on a single lock. While the [`Switch`] is off, lookups
/// always miss and stores are silently dropped; call sites never need to
/// special-case a disabled cache.
///
/// Entries are never patched in place: invalidation removes them and the
/// next miss stores a fresh value.
pub struct ResultCache<K, V> {
    switch: Switch,
    entries: DashMap<K, V>,
}
impl<K: Eq + Hash + fmt::Debug, V: fmt::Debug> fmt::Debug for ResultCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache").field("switch", &self.switch).field("entries", &self.entries).finish()
    }
}
impl<K: Eq + Hash, V: Clone> ResultCache<K, V> {
    pub fn new(switch: Switch) -> Self {
        Self { switch, entries: DashMap::new() }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        if !self.switch.is_enabled() {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn store(&self, key: K, value: V) {
        if self.switch.is_enabled() {
            self.entries.insert(key, value);
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key matches `predicate`. Returns the number
    /// of entries removed.
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before.saturating_sub(self.entries.len())
    }

    /// Remove every entry. Returns the number of entries removed.
    pub fn flush(&self) -> usize {
        let before = self.entries.len();
        self.entries.clear();
        before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
