//! Integration Tests for the lazy cache
//!
//! Exercises single-flight computation, failure handling, clear-all and
//! eviction notification through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use lazy_cache::{
    CacheError, CacheManager, CachePolicy, EvictionReason, LazyCache, StoreConfig,
};

// == Helper Functions ==

fn store_config(max_entries: usize, cleanup_interval: Duration) -> StoreConfig {
    StoreConfig {
        max_entries,
        cleanup_interval,
        ..StoreConfig::named("integration")
    }
}

fn test_cache() -> LazyCache<usize> {
    LazyCache::new(store_config(0, Duration::ZERO), Duration::from_secs(60))
}

fn test_manager() -> Arc<CacheManager<usize>> {
    Arc::new(CacheManager::new(
        store_config(0, Duration::ZERO),
        Duration::from_secs(60),
    ))
}

type Seen = Arc<Mutex<Vec<(String, usize, EvictionReason)>>>;

fn recording_policy(policy: CachePolicy<usize>) -> (CachePolicy<usize>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let policy = policy.with_eviction_callback(move |key: &str, value: &usize, reason| {
        sink.lock().unwrap().push((key.to_string(), *value, reason));
    });
    (policy, seen)
}

// == Single Flight ==

#[test]
fn test_concurrent_get_or_add_runs_factory_once() {
    let cache = Arc::new(test_cache());
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_add("shared", move || {
                    thread::sleep(Duration::from_millis(50));
                    Ok(runs.fetch_add(1, Ordering::SeqCst) + 100)
                })
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 100);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.factory_executions, 1);
    assert_eq!(stats.coalesced_requests, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_add_async_runs_factory_once() {
    let cache = Arc::new(test_cache());
    let runs = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                cache
                    .get_or_add_async("shared", move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(runs.fetch_add(1, Ordering::SeqCst) + 100)
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 100);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_distinct_keys_compute_independently() {
    let cache = test_cache();

    assert_eq!(cache.get_or_add("a", || Ok(1)).unwrap(), 1);
    assert_eq!(cache.get_or_add("b", || Ok(2)).unwrap(), 2);
    assert_eq!(cache.stats().factory_executions, 2);
}

// == Failure Handling ==

#[test]
fn test_waiters_share_failure_then_retry_succeeds() {
    let cache = Arc::new(test_cache());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_add("flaky", || {
                    thread::sleep(Duration::from_millis(30));
                    Err(anyhow!("database unavailable"))
                })
            })
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, CacheError::FactoryFailure(_)));
    }

    assert_eq!(cache.get("flaky").unwrap(), None);
    assert_eq!(cache.get_or_add("flaky", || Ok(7)).unwrap(), 7);
    assert_eq!(cache.get("flaky").unwrap(), Some(7));
}

#[tokio::test]
async fn test_async_failure_is_purged() {
    let cache = test_cache();
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let counter = runs.clone();
        let result = cache
            .get_or_add_async("flaky", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<usize, _>(anyhow!("timeout"))
            })
            .await;
        assert!(matches!(result, Err(CacheError::FactoryFailure(_))));
        assert!(cache.is_empty());
    }

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().factory_failures, 3);
}

#[tokio::test]
async fn test_failure_message_is_preserved() {
    let cache = test_cache();

    let err = cache
        .get_or_add_async("key", || async { Err::<usize, _>(anyhow!("upstream returned 503")) })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("upstream returned 503"));
}

// == Key Validation ==

#[test]
fn test_invalid_keys_rejected_before_factory_runs() {
    let cache = test_cache();
    let runs = Arc::new(AtomicUsize::new(0));

    for key in ["", "  ", "\t"] {
        let counter = runs.clone();
        let result = cache.get_or_add(key, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_keys_rejected_before_async_factory_runs() {
    let cache = test_cache();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let result = cache
        .get_or_add_async(" ", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await;

    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

// == Clear All ==

#[test]
fn test_clear_all_drops_every_entry() {
    let manager = test_manager();
    manager.add("raw", 1).unwrap();
    manager.get_or_add("lazy", || Ok(2)).unwrap();

    manager.clear_all();

    assert_eq!(manager.get("raw").unwrap(), None);
    assert_eq!(manager.get("lazy").unwrap(), None);
    assert_eq!(manager.get_or_add("lazy", || Ok(3)).unwrap(), 3);
}

#[test]
fn test_clear_all_does_not_disrupt_in_flight_computation() {
    let manager = test_manager();
    let started = Arc::new(Barrier::new(2));

    let worker = {
        let manager = manager.clone();
        let started = started.clone();
        thread::spawn(move || {
            manager.get_or_add("slow", move || {
                started.wait();
                thread::sleep(Duration::from_millis(100));
                Ok(42)
            })
        })
    };

    started.wait();
    manager.clear_all();

    // The in-flight caller still gets its value
    assert_eq!(worker.join().unwrap().unwrap(), 42);
    // The fresh instance never saw it
    assert_eq!(manager.get("slow").unwrap(), None);
}

#[tokio::test]
async fn test_clear_all_does_not_disrupt_in_flight_async_computation() {
    let manager = test_manager();

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .get_or_add_async("slow", || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(42)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.clear_all();

    assert_eq!(pending.await.unwrap().unwrap(), 42);
    assert_eq!(manager.get_async("slow").await.unwrap(), None);
}

#[test]
fn test_manager_dispose_twice() {
    let manager = test_manager();
    manager.add("key", 1).unwrap();

    manager.dispose();
    manager.dispose();

    assert_eq!(manager.get("key").unwrap(), None);
}

// == Eviction Notification ==

#[tokio::test]
async fn test_sliding_expiration_notifies_unwrapped_value() {
    let cache: LazyCache<usize> = LazyCache::new(
        store_config(0, Duration::from_millis(10)),
        Duration::from_secs(60),
    );
    let (policy, seen) = recording_policy(CachePolicy::sliding(Duration::from_millis(50)));

    cache
        .get_or_add_async_with_policy("session", || async { Ok(5) }, policy)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(cache.is_empty());
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[("session".to_string(), 5, EvictionReason::Expired)]
    );
}

#[test]
fn test_capacity_eviction_notifies_evicted() {
    let cache: LazyCache<usize> =
        LazyCache::new(store_config(2, Duration::ZERO), Duration::from_secs(60));
    let (policy, seen) = recording_policy(CachePolicy::never());

    cache.get_or_add_with_policy("first", || Ok(1), policy.clone()).unwrap();
    cache.get_or_add_with_policy("second", || Ok(2), policy.clone()).unwrap();
    cache.get_or_add_with_policy("third", || Ok(3), policy).unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[("first".to_string(), 1, EvictionReason::Evicted)]
    );
}

#[test]
fn test_overwrite_notifies_replaced() {
    let cache = test_cache();
    let (policy, seen) = recording_policy(CachePolicy::never());

    cache.add_with_policy("key", 1, policy).unwrap();
    cache.add("key", 2).unwrap();

    assert_eq!(cache.get("key").unwrap(), Some(2));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[("key".to_string(), 1, EvictionReason::Replaced)]
    );
}

// == Cancellation ==

#[test]
fn test_dropped_async_computation_is_purged() {
    let cache = test_cache();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(async {
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_add_async("slow", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            }),
        )
        .await;
        assert!(abandoned.is_err());
    });

    // The caller gave up but the computation is still in flight
    assert_eq!(cache.len(), 1);

    // Shutting the runtime down drops the computation mid-way
    drop(runtime);

    assert!(cache.is_empty());
    assert_eq!(cache.get_or_add("slow", || Ok(2)).unwrap(), 2);
}

#[test]
fn test_async_computation_dropped_before_first_poll_is_purged() {
    let cache = test_cache();
    let runs = Arc::new(AtomicUsize::new(0));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(async {
        let counter = runs.clone();
        let mut caller = Box::pin(cache.get_or_add_async("cold", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }));
        // One poll spawns the computation; the runtime never gets to run it
        assert!(futures::poll!(&mut caller).is_pending());
        drop(caller);
    });
    drop(runtime);

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
    assert_eq!(cache.get("cold").unwrap(), None);
    assert_eq!(cache.get_or_add("cold", || Ok(2)).unwrap(), 2);
}

// == Reads During Computation ==

#[test]
fn test_get_blocks_until_in_flight_computation_completes() {
    let cache = Arc::new(test_cache());
    let runs = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Barrier::new(2));

    let owner = {
        let cache = cache.clone();
        let runs = runs.clone();
        let started = started.clone();
        thread::spawn(move || {
            cache.get_or_add("slow", move || {
                started.wait();
                thread::sleep(Duration::from_millis(100));
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(9)
            })
        })
    };

    started.wait();
    // The entry exists but is still computing
    assert_eq!(cache.get("slow").unwrap(), Some(9));

    assert_eq!(owner.join().unwrap().unwrap(), 9);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().factory_executions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_async_awaits_in_flight_computation() {
    let cache = Arc::new(test_cache());
    let runs = Arc::new(AtomicUsize::new(0));

    let owner = {
        let cache = cache.clone();
        let runs = runs.clone();
        tokio::spawn(async move {
            cache
                .get_or_add_async("slow", move || async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(9)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_async("slow").await.unwrap(), Some(9));

    // A blocking read from a blocking-pool thread sees the same value
    let reader = cache.clone();
    let blocking = tokio::task::spawn_blocking(move || reader.get("slow"));
    assert_eq!(blocking.await.unwrap().unwrap(), Some(9));

    assert_eq!(owner.await.unwrap().unwrap(), 9);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// == Expiration Overloads ==

#[test]
fn test_get_or_add_with_absolute_expires() {
    let cache = test_cache();
    let deadline = chrono::Utc::now() + chrono::Duration::milliseconds(50);

    assert_eq!(cache.get_or_add_with_absolute("abs", || Ok(1), deadline).unwrap(), 1);
    assert_eq!(cache.get("abs").unwrap(), Some(1));

    thread::sleep(Duration::from_millis(100));

    assert_eq!(cache.get("abs").unwrap(), None);
    assert_eq!(cache.get_or_add_with_absolute("abs", || Ok(2), deadline).unwrap(), 2);
}

#[test]
fn test_get_or_add_with_sliding_expires_without_access() {
    let cache = test_cache();
    let window = Duration::from_millis(80);

    assert_eq!(cache.get_or_add_with_sliding("slide", || Ok(1), window).unwrap(), 1);

    // Reads inside the window keep it alive
    for _ in 0..3 {
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("slide").unwrap(), Some(1));
    }

    thread::sleep(Duration::from_millis(160));
    assert_eq!(cache.get("slide").unwrap(), None);
}

#[tokio::test]
async fn test_get_or_add_async_with_absolute_expires() {
    let cache = test_cache();
    let deadline = chrono::Utc::now() + chrono::Duration::milliseconds(50);

    let value = cache
        .get_or_add_async_with_absolute("abs", || async { Ok(1) }, deadline)
        .await
        .unwrap();
    assert_eq!(value, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.get_async("abs").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_or_add_async_with_sliding_expires_without_access() {
    let cache = test_cache();
    let window = Duration::from_millis(80);

    let value = cache
        .get_or_add_async_with_sliding("slide", || async { Ok(1) }, window)
        .await
        .unwrap();
    assert_eq!(value, 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(cache.get_async("slide").await.unwrap(), Some(1));

    tokio::time::sleep(Duration::from_millis(160)).await;
    assert_eq!(cache.get_async("slide").await.unwrap(), None);
}
