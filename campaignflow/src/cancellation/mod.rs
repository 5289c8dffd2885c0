//! Structured cancellation and cleanup utilities.
//!
//! This module provides:
//! - `CancellationToken` for cooperative, run-scoped cancellation
//! - `CleanupRegistry` for LIFO release of run resources

mod cleanup;
mod token;

pub use cleanup::CleanupRegistry;
pub use token::{CancelCallback, CancellationToken};
