//! Lazy Module
//!
//! Single-assignment cells that run a value factory at most once and share
//! its outcome with every observer.

mod async_cell;
mod cell;

use std::sync::atomic::{AtomicU64, Ordering};

pub use async_cell::AsyncLazyCell;
pub use cell::LazyCell;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique cell identity.
pub(crate) fn next_cell_id() -> u64 {
    NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed)
}
