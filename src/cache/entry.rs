//! Store Entry Module
//!
//! Defines a single stored value together with its policy and access times.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::cache::{CachePolicy, Expiration};

// == Store Entry ==
/// A stored value with its policy and access bookkeeping.
#[derive(Debug, Clone)]
pub struct StoreEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration and eviction observer
    pub policy: CachePolicy<V>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last read or write, drives sliding expiration
    last_accessed: Instant,
}

impl<V> StoreEntry<V> {
    // == Constructor ==
    pub fn new(value: V, policy: CachePolicy<V>) -> Self {
        Self {
            value,
            policy,
            created_at: Utc::now(),
            last_accessed: Instant::now(),
        }
    }

    // == Touch ==
    /// Records an access, restarting a sliding window.
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to its deadline.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), Instant::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>, now_instant: Instant) -> bool {
        match self.policy.expiration {
            Expiration::Never => false,
            Expiration::Absolute(deadline) => now >= deadline,
            Expiration::Sliding(window) => {
                now_instant.saturating_duration_since(self.last_accessed) >= window
            }
        }
    }

    // == Time To Live ==
    /// Remaining lifetime, or None if the entry never expires.
    ///
    /// Returns `Some(Duration::ZERO)` once expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        match self.policy.expiration {
            Expiration::Never => None,
            Expiration::Absolute(deadline) => {
                Some((deadline - Utc::now()).to_std().unwrap_or_default())
            }
            Expiration::Sliding(window) => {
                Some(window.saturating_sub(self.last_accessed.elapsed()))
            }
        }
    }
}
