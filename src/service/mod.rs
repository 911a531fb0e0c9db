//! Lazy Cache Service
//!
//! Turns the expiring store into a single-flight cache: concurrent
//! get-or-add calls for the same missing key run the factory exactly once
//! and all observe its outcome. Failed computations are never cached.

mod guard;
mod value;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{CachePolicy, CacheStats, ComputationCounters, ExpiringStore, Expiration};
use crate::config::{Config, StoreConfig};
use crate::error::{CacheError, Result};
use crate::lazy::{next_cell_id, AsyncLazyCell, LazyCell};

use guard::PurgeGuard;
pub use value::{unwrap_eviction_callback, CacheValue};

/// Rejects empty and whitespace-only keys.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CacheError::InvalidArgument(
            "cache key must not be empty or whitespace".to_string(),
        ));
    }
    Ok(())
}

// == Lazy Cache ==
/// Single-flight lazy cache over an [`ExpiringStore`].
pub struct LazyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    store: Arc<ExpiringStore<CacheValue<T>>>,
    default_expiration: Duration,
    counters: Arc<ComputationCounters>,
}

impl<T> LazyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache over a fresh store.
    ///
    /// `default_expiration` applies to `add` and `get_or_add` calls without
    /// an explicit expiration, as an absolute deadline from insertion.
    pub fn new(config: StoreConfig, default_expiration: Duration) -> Self {
        Self {
            store: ExpiringStore::new(config),
            default_expiration,
            counters: Arc::new(ComputationCounters::default()),
        }
    }

    /// Creates a cache from process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store_config(), config.default_expiration())
    }

    // == Accessors ==
    /// Name of the underlying store.
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Expiration applied when a call does not supply one.
    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    fn default_policy(&self) -> CachePolicy<T> {
        CachePolicy::new(Expiration::after(self.default_expiration))
    }

    // == Add ==
    /// Stores an already computed value with the default expiration.
    pub fn add(&self, key: &str, item: T) -> Result<()> {
        self.add_with_policy(key, item, self.default_policy())
    }

    /// Stores a value that expires at `deadline`.
    pub fn add_with_absolute(&self, key: &str, item: T, deadline: DateTime<Utc>) -> Result<()> {
        self.add_with_policy(key, item, CachePolicy::absolute(deadline))
    }

    /// Stores a value that expires after `window` without access.
    pub fn add_with_sliding(&self, key: &str, item: T, window: Duration) -> Result<()> {
        self.add_with_policy(key, item, CachePolicy::sliding(window))
    }

    /// Stores a value unconditionally, replacing whatever the key held.
    ///
    /// Bypasses the lazy machinery: the value is stored as is.
    pub fn add_with_policy(&self, key: &str, item: T, policy: CachePolicy<T>) -> Result<()> {
        validate_key(key)?;
        self.store.set(
            key,
            CacheValue::Raw(item),
            policy.map_callback(unwrap_eviction_callback),
        );
        Ok(())
    }

    // == Get ==
    /// Looks a key up, forcing a stored cell if needed.
    ///
    /// Blocks while a computation for the key is in flight. If that
    /// computation came from `get_or_add_async`, the thread is blocked on it
    /// directly: never call this from a current-thread tokio runtime while
    /// such a computation may be pending, it would hang forever. Use
    /// [`get_async`](Self::get_async) there.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        match self.store.get(key) {
            Some(stored) => stored.resolve().map(Some),
            None => Ok(None),
        }
    }

    /// Looks a key up, awaiting a stored cell if needed.
    ///
    /// Suspends instead of blocking while a computation is in flight.
    pub async fn get_async(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        match self.store.get(key) {
            Some(stored) => stored.resolve_async().await.map(Some),
            None => Ok(None),
        }
    }

    // == Get Or Add ==
    /// Returns the cached value, computing it with `factory` on a miss.
    ///
    /// Uses the default expiration. Same blocking caveat as
    /// [`get`](Self::get) when the key holds an in-flight async computation.
    pub fn get_or_add<F>(&self, key: &str, factory: F) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.get_or_add_with_policy(key, factory, self.default_policy())
    }

    /// Get-or-add whose computed value expires at `deadline`.
    pub fn get_or_add_with_absolute<F>(
        &self,
        key: &str,
        factory: F,
        deadline: DateTime<Utc>,
    ) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.get_or_add_with_policy(key, factory, CachePolicy::absolute(deadline))
    }

    /// Get-or-add whose computed value expires after `window` without access.
    pub fn get_or_add_with_sliding<F>(&self, key: &str, factory: F, window: Duration) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.get_or_add_with_policy(key, factory, CachePolicy::sliding(window))
    }

    /// Single-flight get-or-add.
    ///
    /// The caller whose cell wins the insert runs `factory`; concurrent
    /// callers block on that same cell. On failure the entry is purged before
    /// anyone sees the error, so the next call starts a fresh attempt.
    ///
    /// Blocks the calling thread; when the key already holds an in-flight
    /// async computation, must not run on a current-thread tokio runtime.
    pub fn get_or_add_with_policy<F>(
        &self,
        key: &str,
        factory: F,
        policy: CachePolicy<T>,
    ) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        validate_key(key)?;

        let cell_id = next_cell_id();
        let store = Arc::downgrade(&self.store);
        let owned_key = key.to_string();
        let counters = Arc::clone(&self.counters);
        let cell = Arc::new(LazyCell::with_id(cell_id, move || {
            let guard = PurgeGuard::new(store, owned_key, cell_id, counters);
            guard.start();
            let result = factory();
            guard.settle(&result);
            result
        }));

        let existing = self.store.add_or_get_existing(
            key,
            CacheValue::Cell(Arc::clone(&cell)),
            policy.map_callback(unwrap_eviction_callback),
        );

        match existing {
            None => cell.force(),
            Some(stored) => {
                self.counters.record_coalesced();
                debug!("Coalesced get-or-add for key '{}'", key);
                stored.resolve()
            }
        }
    }

    // == Get Or Add Async ==
    /// Async get-or-add with the default expiration.
    pub async fn get_or_add_async<F, Fut>(&self, key: &str, factory: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.get_or_add_async_with_policy(key, factory, self.default_policy())
            .await
    }

    /// Async get-or-add whose computed value expires at `deadline`.
    pub async fn get_or_add_async_with_absolute<F, Fut>(
        &self,
        key: &str,
        factory: F,
        deadline: DateTime<Utc>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.get_or_add_async_with_policy(key, factory, CachePolicy::absolute(deadline))
            .await
    }

    /// Async get-or-add whose computed value expires after `window` without
    /// access.
    pub async fn get_or_add_async_with_sliding<F, Fut>(
        &self,
        key: &str,
        factory: F,
        window: Duration,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.get_or_add_async_with_policy(key, factory, CachePolicy::sliding(window))
            .await
    }

    /// Single-flight get-or-add for async factories.
    ///
    /// Concurrent callers await the same in-flight future without blocking
    /// a thread. The computation is purged from the store when it fails or
    /// is dropped before completing.
    pub async fn get_or_add_async_with_policy<F, Fut>(
        &self,
        key: &str,
        factory: F,
        policy: CachePolicy<T>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        validate_key(key)?;

        let cell_id = next_cell_id();
        // Built before the computation exists: a task dropped before its
        // first poll still purges its entry.
        let guard = PurgeGuard::new(
            Arc::downgrade(&self.store),
            key.to_string(),
            cell_id,
            Arc::clone(&self.counters),
        );
        let cell = AsyncLazyCell::with_id(cell_id, async move {
            guard.start();
            let result = factory().await;
            guard.settle(&result);
            result
        });

        let existing = self.store.add_or_get_existing(
            key,
            CacheValue::AsyncCell(cell.clone()),
            policy.map_callback(unwrap_eviction_callback),
        );

        match existing {
            None => cell.force_async().await,
            Some(stored) => {
                // Never polled; its guard finds no entry of its own to purge.
                drop(cell);
                self.counters.record_coalesced();
                debug!("Coalesced async get-or-add for key '{}'", key);
                stored.resolve_async().await
            }
        }
    }

    // == Remove ==
    /// Removes a key. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.store.remove(key);
        Ok(())
    }

    // == Stats ==
    /// Store statistics merged with the factory counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.store.stats();
        self.counters.apply_to(&mut stats);
        stats
    }

    /// Number of entries, including in-flight computations.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // == Dispose ==
    /// Releases the underlying store.
    ///
    /// Callers already waiting on a computation still receive its outcome.
    pub fn dispose(&self) {
        self.store.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_disposed()
    }
}

impl<T> std::fmt::Debug for LazyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCache")
            .field("store", &self.store)
            .field("default_expiration", &self.default_expiration)
            .finish()
    }
}
