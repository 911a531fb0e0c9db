//! Cache Policy Module
//!
//! Expiration modes, eviction reasons and the per-entry policy that ties
//! them to an optional eviction callback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Expiration ==
/// When an entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// The entry lives until it is removed or evicted
    #[default]
    Never,
    /// The entry expires at a fixed wall-clock deadline
    Absolute(DateTime<Utc>),
    /// The entry expires after this long without being accessed
    Sliding(Duration),
}

impl Expiration {
    /// An absolute deadline `ttl` from now.
    ///
    /// A `ttl` too large to represent never expires.
    pub fn after(ttl: Duration) -> Self {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .map_or(Expiration::Never, Expiration::Absolute)
    }
}

// == Eviction Reason ==
/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Absolute deadline passed or sliding window lapsed
    Expired,
    /// Dropped to make room under the capacity limit
    Evicted,
    /// Explicitly removed
    Removed,
    /// Overwritten by a newer value for the same key
    Replaced,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Evicted => "evicted",
            EvictionReason::Removed => "removed",
            EvictionReason::Replaced => "replaced",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer invoked with `(key, value, reason)` when an entry leaves the store.
pub type EvictionCallback<V> = Arc<dyn Fn(&str, &V, EvictionReason) + Send + Sync>;

// == Cache Policy ==
/// Expiration plus an optional eviction observer for a single entry.
pub struct CachePolicy<V> {
    pub expiration: Expiration,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V> CachePolicy<V> {
    pub fn new(expiration: Expiration) -> Self {
        Self {
            expiration,
            on_evicted: None,
        }
    }

    pub fn never() -> Self {
        Self::new(Expiration::Never)
    }

    pub fn absolute(deadline: DateTime<Utc>) -> Self {
        Self::new(Expiration::Absolute(deadline))
    }

    pub fn sliding(window: Duration) -> Self {
        Self::new(Expiration::Sliding(window))
    }

    /// Attaches an eviction observer, replacing any previous one.
    pub fn with_eviction_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &V, EvictionReason) + Send + Sync + 'static,
    {
        self.on_evicted = Some(Arc::new(callback));
        self
    }

    pub fn eviction_callback(&self) -> Option<&EvictionCallback<V>> {
        self.on_evicted.as_ref()
    }

    /// Converts the policy to another value type by rewriting its callback.
    ///
    /// `map` only runs when a callback is attached.
    pub fn map_callback<U, M>(self, map: M) -> CachePolicy<U>
    where
        M: FnOnce(EvictionCallback<V>) -> EvictionCallback<U>,
    {
        CachePolicy {
            expiration: self.expiration,
            on_evicted: self.on_evicted.map(map),
        }
    }

    pub(crate) fn notify(&self, key: &str, value: &V, reason: EvictionReason) {
        if let Some(callback) = &self.on_evicted {
            callback(key, value, reason);
        }
    }
}

impl<V> Clone for CachePolicy<V> {
    fn clone(&self) -> Self {
        Self {
            expiration: self.expiration,
            on_evicted: self.on_evicted.clone(),
        }
    }
}

impl<V> Default for CachePolicy<V> {
    fn default() -> Self {
        Self::never()
    }
}

impl<V> fmt::Debug for CachePolicy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("expiration", &self.expiration)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}
