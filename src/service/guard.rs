//! Failure purge for in-flight computations.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::cache::{ComputationCounters, ExpiringStore};
use crate::service::CacheValue;

/// Removes the entry holding a given cell unless the computation succeeds.
///
/// Owned by the computation itself, so it lives exactly as long as the
/// computation does. Settling it with a successful result disarms it; a
/// failure, a panic unwinding through the factory or the computation being
/// dropped before it finishes (even before its first poll) purges the entry,
/// so no faulted cell stays discoverable once the failure is observed.
pub(crate) struct PurgeGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    store: Weak<ExpiringStore<CacheValue<T>>>,
    key: String,
    cell_id: u64,
    counters: Arc<ComputationCounters>,
    armed: bool,
}

impl<T> PurgeGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        store: Weak<ExpiringStore<CacheValue<T>>>,
        key: String,
        cell_id: u64,
        counters: Arc<ComputationCounters>,
    ) -> Self {
        Self {
            store,
            key,
            cell_id,
            counters,
            armed: true,
        }
    }

    /// Records that the factory is actually running.
    pub(crate) fn start(&self) {
        self.counters.record_execution();
    }

    /// Inspects the factory outcome, purging on failure before it is returned.
    pub(crate) fn settle(mut self, result: &anyhow::Result<T>) {
        match result {
            Ok(_) => self.armed = false,
            Err(err) => {
                self.counters.record_failure();
                warn!("Value factory for key '{}' failed: {:#}", self.key, err);
            }
        }
    }
}

impl<T> Drop for PurgeGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(store) = self.store.upgrade() else {
            return;
        };

        let cell_id = self.cell_id;
        // Only the entry holding this very cell: a newer attempt may already
        // occupy the key.
        if store.remove_if(&self.key, |value| value.cell_id() == Some(cell_id)) {
            debug!("Purged failed computation for key '{}'", self.key);
        }
    }
}
