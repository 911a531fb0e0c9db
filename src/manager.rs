//! Cache Manager
//!
//! Owns the current lazy cache instance and replaces it wholesale on
//! `clear_all`, so clearing never races with in-flight computations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::cache::{CachePolicy, CacheStats};
use crate::config::{Config, StoreConfig};
use crate::error::Result;
use crate::service::LazyCache;

/// Holder of the active [`LazyCache`] instance.
///
/// Callers that grabbed the previous instance before a `clear_all` keep
/// working against it; new calls go to the fresh one.
pub struct CacheManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Configuration for every instance this manager creates
    store_config: StoreConfig,
    /// Default expiration handed to every instance
    default_expiration: Duration,
    /// Active instance, `None` once disposed
    current: RwLock<Option<Arc<LazyCache<T>>>>,
}

impl<T> CacheManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a manager with an initial instance built from `store_config`.
    ///
    /// Every instance created later (after `clear_all` or `dispose`) uses the
    /// same configuration.
    pub fn new(store_config: StoreConfig, default_expiration: Duration) -> Self {
        let initial = LazyCache::new(store_config.clone(), default_expiration);
        Self {
            store_config,
            default_expiration,
            current: RwLock::new(Some(Arc::new(initial))),
        }
    }

    /// Creates a manager from process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store_config(), config.default_expiration())
    }

    fn build(&self) -> Arc<LazyCache<T>> {
        Arc::new(LazyCache::new(
            self.store_config.clone(),
            self.default_expiration,
        ))
    }

    // == Current Instance ==
    /// The active instance, created on demand after a dispose.
    ///
    /// The returned handle stays valid across a later `clear_all`.
    pub fn cache(&self) -> Arc<LazyCache<T>> {
        if let Some(cache) = self.current.read().as_ref() {
            return Arc::clone(cache);
        }

        let mut current = self.current.write();
        Arc::clone(current.get_or_insert_with(|| {
            debug!("Recreating cache instance '{}'", self.store_config.name);
            self.build()
        }))
    }

    // == Clear All ==
    /// Swaps in a fresh instance, then releases the old one.
    ///
    /// Returns the number of entries the old instance held.
    pub fn clear_all(&self) -> usize {
        let fresh = self.build();
        let previous = self.current.write().replace(fresh);

        let Some(previous) = previous else {
            return 0;
        };
        let dropped = previous.len();
        previous.dispose();
        info!("Cleared cache '{}' ({} entries dropped)", previous.name(), dropped);
        dropped
    }

    /// Releases the active instance. Calling it again is a no-op.
    pub fn dispose(&self) {
        let previous = self.current.write().take();
        if let Some(previous) = previous {
            previous.dispose();
            debug!("Disposed cache '{}'", previous.name());
        }
    }

    // == Delegates ==
    /// [`LazyCache::add`] on the active instance.
    pub fn add(&self, key: &str, item: T) -> Result<()> {
        self.cache().add(key, item)
    }

    /// [`LazyCache::add_with_policy`] on the active instance.
    pub fn add_with_policy(&self, key: &str, item: T, policy: CachePolicy<T>) -> Result<()> {
        self.cache().add_with_policy(key, item, policy)
    }

    /// [`LazyCache::get`] on the active instance.
    ///
    /// Blocks while a computation for the key is in flight; do not call it
    /// from a current-thread tokio runtime when that computation came from
    /// `get_or_add_async`. Use [`get_async`](Self::get_async) there.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        self.cache().get(key)
    }

    /// [`LazyCache::get_async`] on the active instance.
    pub async fn get_async(&self, key: &str) -> Result<Option<T>> {
        self.cache().get_async(key).await
    }

    /// [`LazyCache::get_or_add`] on the active instance.
    ///
    /// Same blocking caveat as [`get`](Self::get).
    pub fn get_or_add<F>(&self, key: &str, factory: F) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.cache().get_or_add(key, factory)
    }

    /// [`LazyCache::get_or_add_with_policy`] on the active instance.
    pub fn get_or_add_with_policy<F>(
        &self,
        key: &str,
        factory: F,
        policy: CachePolicy<T>,
    ) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.cache().get_or_add_with_policy(key, factory, policy)
    }

    /// [`LazyCache::get_or_add_async`] on the active instance.
    pub async fn get_or_add_async<F, Fut>(&self, key: &str, factory: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.cache().get_or_add_async(key, factory).await
    }

    /// [`LazyCache::get_or_add_async_with_policy`] on the active instance.
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
        self.cache()
            .get_or_add_async_with_policy(key, factory, policy)
            .await
    }

    /// [`LazyCache::remove`] on the active instance.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.cache().remove(key)
    }

    /// Statistics of the active instance only.
    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }
}

impl<T> Drop for CacheManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(current) = self.current.get_mut().take() {
            current.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> CacheManager<String> {
        CacheManager::new(
            StoreConfig {
                cleanup_interval: Duration::ZERO,
                ..StoreConfig::named("manager")
            },
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_clear_all_drops_everything() {
        let manager = test_manager();
        manager.add("a", "1".to_string()).unwrap();
        manager
            .get_or_add("b", || Ok("2".to_string()))
            .unwrap();

        assert_eq!(manager.clear_all(), 2);

        assert_eq!(manager.get("a").unwrap(), None);
        assert_eq!(manager.get("b").unwrap(), None);
        assert!(manager.cache().is_empty());
    }

    #[test]
    fn test_clear_all_replaces_instance() {
        let manager = test_manager();
        let before = manager.cache();

        manager.clear_all();

        assert!(!Arc::ptr_eq(&before, &manager.cache()));
        assert!(before.is_disposed());
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let manager = test_manager();
        manager.add("a", "1".to_string()).unwrap();

        manager.dispose();
        manager.dispose();

        // A fresh instance is created on next use
        assert_eq!(manager.get("a").unwrap(), None);
        manager.add("a", "2".to_string()).unwrap();
        assert_eq!(manager.get("a").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let manager = test_manager();
        assert!(Arc::ptr_eq(&manager.cache(), &manager.cache()));
    }

    #[tokio::test]
    async fn test_async_delegates() {
        let manager = test_manager();

        let value = manager
            .get_or_add_async("k", || async { Ok("v".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "v");
        assert_eq!(manager.get_async("k").await.unwrap(), Some("v".to_string()));

        manager.remove("k").unwrap();
        assert_eq!(manager.get_async("k").await.unwrap(), None);
        assert_eq!(manager.stats().factory_executions, 1);
    }
}
