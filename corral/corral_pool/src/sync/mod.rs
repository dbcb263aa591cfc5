//! Synchronization helpers for pool callers.
//!
//! - Cooperative cancellation of blocked pool operations

pub mod cancel;

// Re-export key types from cancel
pub use cancel::CancelToken;
