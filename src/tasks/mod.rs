//! Background Tasks Module
//!
//! Contains background tasks owned by cache instances.
//!
//! # Tasks
//! - Expiration sweep: removes expired entries at the configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
