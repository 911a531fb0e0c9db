//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CachePolicy, Expiration};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: The value to store
/// - `ttl`: Optional expiration in seconds (uses the cache default if absent)
/// - `sliding`: Treat `ttl` as a sliding window instead of a deadline
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: String,
    /// Optional expiration in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Whether `ttl` is a sliding window
    #[serde(default)]
    pub sliding: bool,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.trim().is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.ttl == Some(0) {
            return Some("TTL must be greater than zero".to_string());
        }
        if self.sliding && self.ttl.is_none() {
            return Some("Sliding expiration requires a ttl".to_string());
        }
        None
    }

    /// Expiration policy requested by the client, if any.
    pub fn policy(&self) -> Option<CachePolicy<String>> {
        let ttl = Duration::from_secs(self.ttl?);
        Some(if self.sliding {
            CachePolicy::sliding(ttl)
        } else {
            CachePolicy::new(Expiration::after(ttl))
        })
    }
}
