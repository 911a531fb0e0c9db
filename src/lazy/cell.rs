//! Synchronous lazy cell.

use std::fmt;
use std::sync::OnceLock;

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::error::{CacheError, Result};

type Factory<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

/// Runs a factory at most once and memoizes its outcome.
///
/// Concurrent `force` callers block until the single running factory
/// finishes, then all observe the same value or the same failure. A faulted
/// cell is never retried.
pub struct LazyCell<T> {
    id: u64,
    factory: Mutex<Option<Factory<T>>>,
    outcome: OnceLock<Result<T>>,
}

impl<T: Clone> LazyCell<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self::with_id(super::next_cell_id(), factory)
    }

    pub(crate) fn with_id<F>(id: u64, factory: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            id,
            factory: Mutex::new(Some(Box::new(factory))),
            outcome: OnceLock::new(),
        }
    }

    /// Runs the factory if nobody has yet and returns the shared outcome.
    pub fn force(&self) -> Result<T> {
        self.outcome.get_or_init(|| self.run()).clone()
    }

    fn run(&self) -> Result<T> {
        // Taken before running: a panicking factory is never invoked twice.
        let factory = self.factory.lock().take();
        match factory {
            Some(factory) => factory().map_err(CacheError::factory),
            None => Err(CacheError::factory(anyhow!(
                "value factory panicked during an earlier attempt"
            ))),
        }
    }

    /// The computed value, without forcing.
    pub fn value(&self) -> Option<T> {
        match self.outcome.get() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> LazyCell<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.outcome.get(), Some(Err(_)))
    }
}

impl<T> fmt::Debug for LazyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome.get() {
            Some(Ok(_)) => "completed",
            Some(Err(_)) => "faulted",
            None => "pending",
        };
        f.debug_struct("LazyCell")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}
