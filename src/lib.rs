//! Lazy Cache - A single-flight lazy cache over an in-memory expiring store
//!
//! Concurrent get-or-add calls for a missing key run the value factory once
//! and share its outcome; failures are never cached. Ships with a small HTTP
//! front end exposing the cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod lazy;
pub mod manager;
pub mod models;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use cache::{CachePolicy, EvictionReason, Expiration};
pub use config::{Config, StoreConfig};
pub use error::{CacheError, Result};
pub use manager::CacheManager;
pub use service::{CacheValue, LazyCache};
