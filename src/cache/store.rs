//! Expiring Store Module
//!
//! In-process key-value store combining HashMap storage with LRU tracking,
//! per-entry expiration and eviction notification.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CachePolicy, CacheStats, EvictionReason, LruTracker, StoreEntry};
use crate::config::StoreConfig;
use crate::tasks::spawn_cleanup_task;

/// Entries taken out of the map, notified once the lock is released.
type Departures<V> = Vec<(String, StoreEntry<V>, EvictionReason)>;

#[derive(Debug)]
struct StoreInner<V> {
    entries: HashMap<String, StoreEntry<V>>,
    lru: LruTracker,
    stats: CacheStats,
}

impl<V: Clone> StoreInner<V> {
    /// Returns a clone of a live value, refreshing its access time.
    ///
    /// An expired occupant is moved to `departures` and reported absent.
    fn live_value(&mut self, key: &str, departures: &mut Departures<V>) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        if entry.is_expired() {
            self.take(key, EvictionReason::Expired, departures);
            return None;
        }
        entry.touch();
        let value = entry.value.clone();
        self.lru.touch(key);
        Some(value)
    }

    fn expire_if_stale(&mut self, key: &str, departures: &mut Departures<V>) {
        if self.entries.get(key).is_some_and(StoreEntry::is_expired) {
            self.take(key, EvictionReason::Expired, departures);
        }
    }

    fn take(&mut self, key: &str, reason: EvictionReason, departures: &mut Departures<V>) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.lru.remove(key);
        match reason {
            EvictionReason::Expired => self.stats.record_expiration(),
            EvictionReason::Evicted => self.stats.record_eviction(),
            EvictionReason::Removed | EvictionReason::Replaced => {}
        }
        self.stats.set_total_entries(self.entries.len());
        departures.push((key.to_string(), entry, reason));
        true
    }

    fn insert(
        &mut self,
        key: &str,
        entry: StoreEntry<V>,
        max_entries: usize,
        departures: &mut Departures<V>,
    ) {
        if self.entries.contains_key(key) {
            self.take(key, EvictionReason::Replaced, departures);
        } else if max_entries > 0 && self.entries.len() >= max_entries {
            if let Some(oldest) = self.lru.evict_oldest() {
                self.take(&oldest, EvictionReason::Evicted, departures);
            }
        }

        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
        self.stats.set_total_entries(self.entries.len());
    }
}

// == Expiring Store ==
/// Thread-safe store with expiration, capacity eviction and eviction callbacks.
///
/// Eviction callbacks and the drop of departed values always run after the
/// internal lock has been released, so callbacks may call back into the store.
pub struct ExpiringStore<V> {
    config: StoreConfig,
    inner: Mutex<StoreInner<V>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl<V> ExpiringStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new store.
    ///
    /// When called from within a tokio runtime and the configured cleanup
    /// interval is non-zero, a background task sweeps expired entries.
    /// Without it, expiration is still detected lazily on access.
    pub fn new(config: StoreConfig) -> Arc<Self> {
        let store = Arc::new(Self {
            config,
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(),
            }),
            cleanup_task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let interval = store.config.cleanup_interval;
        if !interval.is_zero() && tokio::runtime::Handle::try_current().is_ok() {
            let handle = spawn_cleanup_task(Arc::downgrade(&store), interval);
            *store.cleanup_task.lock() = Some(handle);
        }

        debug!(
            "Store '{}' created: max_entries={}, memory_limit_mb={:?}, physical_memory_limit_percent={:?}",
            store.config.name,
            store.config.max_entries,
            store.config.memory_limit_mb,
            store.config.physical_memory_limit_percent
        );

        store
    }

    // == Add Or Get Existing ==
    /// Inserts the value only if the key is absent.
    ///
    /// Returns the live value already stored under `key`, or `None` when the
    /// new value was inserted. An expired occupant counts as absent.
    pub fn add_or_get_existing(&self, key: &str, value: V, policy: CachePolicy<V>) -> Option<V> {
        let mut departures = Vec::new();
        let mut pending = Some(StoreEntry::new(value, policy));

        let existing = {
            let mut inner = self.inner.lock();
            let existing = inner.live_value(key, &mut departures);
            if existing.is_some() {
                inner.stats.record_hit();
            } else {
                inner.stats.record_miss();
                if let Some(entry) = pending.take() {
                    inner.insert(key, entry, self.config.max_entries, &mut departures);
                }
            }
            existing
        };

        drop(pending);
        Self::notify(departures);
        existing
    }

    // == Get ==
    /// Retrieves a live value, refreshing sliding expiration.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut departures = Vec::new();

        let value = {
            let mut inner = self.inner.lock();
            let value = inner.live_value(key, &mut departures);
            if value.is_some() {
                inner.stats.record_hit();
            } else {
                inner.stats.record_miss();
            }
            value
        };

        Self::notify(departures);
        value
    }

    // == Set ==
    /// Stores a value unconditionally.
    ///
    /// A displaced live value is notified as `Replaced`, an expired one as
    /// `Expired`. A new key may evict the least recently used entry.
    pub fn set(&self, key: &str, value: V, policy: CachePolicy<V>) {
        let mut departures = Vec::new();

        {
            let mut inner = self.inner.lock();
            inner.expire_if_stale(key, &mut departures);
            inner.insert(
                key,
                StoreEntry::new(value, policy),
                self.config.max_entries,
                &mut departures,
            );
        }

        Self::notify(departures);
    }

    // == Remove ==
    /// Removes an entry. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.remove_if(key, |_| true)
    }

    /// Removes the entry only if `predicate` accepts its current value.
    pub fn remove_if<P>(&self, key: &str, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut departures = Vec::new();

        let removed = {
            let mut inner = self.inner.lock();
            let matches = inner
                .entries
                .get(key)
                .is_some_and(|entry| predicate(&entry.value));
            matches && inner.take(key, EvictionReason::Removed, &mut departures)
        };

        Self::notify(departures);
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, notifying each.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut departures = Vec::new();

        {
            let mut inner = self.inner.lock();
            let expired: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired {
                inner.take(&key, EvictionReason::Expired, &mut departures);
            }
        }

        let count = departures.len();
        Self::notify(departures);
        count
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // == Dispose ==
    /// Stops the background sweeper and drops every entry without notifying.
    ///
    /// Idempotent. The store stays usable so callers still holding it finish
    /// their operations normally.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = self.cleanup_task.lock().take() {
            task.abort();
        }

        let entries = {
            let mut inner = self.inner.lock();
            inner.lru.clear();
            inner.stats.set_total_entries(0);
            std::mem::take(&mut inner.entries)
        };

        info!(
            "Store '{}' disposed, dropped {} entries",
            self.config.name,
            entries.len()
        );
        drop(entries);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn notify(departures: Departures<V>) {
        for (key, entry, reason) in departures {
            debug!("Entry '{}' left the store: {}", key, reason);
            entry.policy.notify(&key, &entry.value, reason);
        }
    }
}

impl<V> Drop for ExpiringStore<V> {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.get_mut().take() {
            task.abort();
        }
    }
}

impl<V> fmt::Debug for ExpiringStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("config", &self.config)
            .field("entries", &self.inner.lock().entries.len())
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
