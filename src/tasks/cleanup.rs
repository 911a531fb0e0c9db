//! Expiration Sweep Task
//!
//! Background task that periodically removes expired store entries so their
//! eviction callbacks fire even when nobody reads the key again.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ExpiringStore;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task only holds a weak reference: it stops on its own once the store
/// is dropped or disposed. Must be called from within a tokio runtime.
///
/// # Returns
/// A JoinHandle for the spawned task, which the store aborts on dispose.
pub fn spawn_cleanup_task<V>(store: Weak<ExpiringStore<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!("Starting expiration sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let Some(store) = store.upgrade() else {
                debug!("Store dropped, stopping expiration sweep");
                break;
            };
            if store.is_disposed() {
                debug!("Store '{}' disposed, stopping expiration sweep", store.name());
                break;
            }

            let removed = store.cleanup_expired();
            if removed > 0 {
                info!("Expiration sweep on '{}': removed {} entries", store.name(), removed);
            } else {
                debug!("Expiration sweep on '{}': no expired entries found", store.name());
            }
        }
    })
}
