//! Asynchronous lazy cell.

use std::fmt;
use std::future::Future;

use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{CacheError, Result};

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Async counterpart of [`LazyCell`](super::LazyCell).
///
/// Wraps the computation in a [`Shared`] future: every clone awaits the same
/// in-flight computation instead of blocking a thread. Nothing runs until the
/// first poll. When created inside a tokio runtime the computation is spawned
/// on first poll, so it keeps running even if the caller that started it
/// stops waiting.
pub struct AsyncLazyCell<T> {
    id: u64,
    outcome: SharedOutcome<T>,
}

impl<T> AsyncLazyCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_id(super::next_cell_id(), future)
    }

    pub(crate) fn with_id<F>(id: u64, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let computation = async move { future.await.map_err(CacheError::factory) };

        let outcome = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => async move {
                runtime.spawn(computation).await.unwrap_or_else(|err| {
                    Err(CacheError::factory(anyhow!(
                        "value computation was aborted: {}",
                        err
                    )))
                })
            }
            .boxed(),
            Err(_) => computation.boxed(),
        };

        Self {
            id,
            outcome: outcome.shared(),
        }
    }

    /// Starts the computation if needed and awaits the shared outcome.
    pub async fn force_async(&self) -> Result<T> {
        self.outcome.clone().await
    }

    /// Blocks the current thread until the shared outcome is available.
    ///
    /// Must not be called from a single-threaded runtime that is also
    /// responsible for driving the computation.
    pub fn force_blocking(&self) -> Result<T> {
        futures::executor::block_on(self.outcome.clone())
    }

    /// The computed value, without forcing.
    pub fn value(&self) -> Option<T> {
        match self.outcome.peek() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome.peek(), Some(Ok(_)))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.outcome.peek(), Some(Err(_)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Clone for AsyncLazyCell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            outcome: self.outcome.clone(),
        }
    }
}

impl<T> fmt::Debug for AsyncLazyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncLazyCell")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_nothing_runs_before_first_force() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let cell = AsyncLazyCell::new(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!cell.is_completed());

        assert_eq!(cell.force_async().await.unwrap(), 7);
        assert_eq!(cell.force_async().await.unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cell.value(), Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_awaiters_share_one_computation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let cell = AsyncLazyCell::new(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let cell = cell.clone();
                tokio::spawn(async move { cell.force_async().await.unwrap() })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_by_all_awaiters() {
        let cell: AsyncLazyCell<u32> = AsyncLazyCell::new(async { Err(anyhow!("upstream 503")) });

        let first = cell.force_async().await;
        let second = cell.clone().force_async().await;

        assert!(matches!(first, Err(CacheError::FactoryFailure(_))));
        assert!(matches!(second, Err(CacheError::FactoryFailure(_))));
        assert!(cell.is_faulted());
    }

    #[tokio::test]
    async fn test_computation_outlives_cancelled_caller() {
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        let cell = AsyncLazyCell::new(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok("done")
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(5), cell.force_async()).await;
        assert!(abandoned.is_err());

        // Nobody is awaiting, the spawned computation still completes
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(cell.force_async().await.unwrap(), "done");
    }

    async fn explode() -> anyhow::Result<u32> {
        panic!("computation exploded")
    }

    #[tokio::test]
    async fn test_panicking_computation_faults_cell() {
        let cell = AsyncLazyCell::new(explode());

        assert!(matches!(cell.force_async().await, Err(CacheError::FactoryFailure(_))));
    }

    #[test]
    fn test_force_blocking_without_runtime() {
        let cell = AsyncLazyCell::new(async { Ok(5u8) });
        assert_eq!(cell.force_blocking().unwrap(), 5);
        assert_eq!(tokio_test::block_on(cell.force_async()).unwrap(), 5);
    }
}
