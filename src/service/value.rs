//! Stored value representation and the eviction-callback adapter.

use std::fmt;
use std::sync::Arc;

use crate::cache::{EvictionCallback, EvictionReason};
use crate::error::Result;
use crate::lazy::{AsyncLazyCell, LazyCell};

// == Cache Value ==
/// What the lazy layer keeps in the expiring store.
///
/// Values added directly are stored raw; values produced through
/// get-or-add are stored as the cell computing them.
pub enum CacheValue<T> {
    Raw(T),
    Cell(Arc<LazyCell<T>>),
    AsyncCell(AsyncLazyCell<T>),
}

impl<T> CacheValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Produces the user value, forcing a cell if necessary.
    ///
    /// An async cell is driven to completion on the current thread.
    pub fn resolve(&self) -> Result<T> {
        match self {
            CacheValue::Raw(value) => Ok(value.clone()),
            CacheValue::Cell(cell) => cell.force(),
            CacheValue::AsyncCell(cell) => cell.force_blocking(),
        }
    }

    /// Produces the user value, awaiting an async cell.
    pub async fn resolve_async(&self) -> Result<T> {
        match self {
            CacheValue::Raw(value) => Ok(value.clone()),
            CacheValue::Cell(cell) => cell.force(),
            CacheValue::AsyncCell(cell) => cell.force_async().await,
        }
    }

    /// Identity of the cell held, if any.
    pub fn cell_id(&self) -> Option<u64> {
        match self {
            CacheValue::Raw(_) => None,
            CacheValue::Cell(cell) => Some(cell.id()),
            CacheValue::AsyncCell(cell) => Some(cell.id()),
        }
    }
}

impl<T: Clone> Clone for CacheValue<T> {
    fn clone(&self) -> Self {
        match self {
            CacheValue::Raw(value) => CacheValue::Raw(value.clone()),
            CacheValue::Cell(cell) => CacheValue::Cell(Arc::clone(cell)),
            CacheValue::AsyncCell(cell) => CacheValue::AsyncCell(cell.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CacheValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            CacheValue::Cell(cell) => f.debug_tuple("Cell").field(cell).finish(),
            CacheValue::AsyncCell(cell) => f.debug_tuple("AsyncCell").field(cell).finish(),
        }
    }
}

// == Eviction Callback Adapter ==
/// Rewrites a callback over user values into one over stored values.
///
/// Observers only ever see user values: raw values are passed through and
/// cells pass their computed value. A cell that never completed (still
/// running, or faulted and purged) is not reported.
pub fn unwrap_eviction_callback<T>(callback: EvictionCallback<T>) -> EvictionCallback<CacheValue<T>>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |key: &str, stored: &CacheValue<T>, reason: EvictionReason| {
        let completed = match stored {
            CacheValue::Raw(value) => return callback(key, value, reason),
            CacheValue::Cell(cell) => cell.value(),
            CacheValue::AsyncCell(cell) => cell.value(),
        };
        if let Some(value) = completed {
            callback(key, &value, reason);
        }
    })
}
