#![deny(warnings)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Corral Pool
//!
//! A thread-safe pool of interchangeable, reusable resources.
//!
//! Callers borrow a resource for exclusive use and return it when done; the
//! pool guarantees that no two callers ever hold the same resource at once.
//! On top of that it provides:
//!
//! - Blocking, timed, cancellable, and non-blocking acquisition
//! - Growing and shrinking the member set while callers are active
//! - Graceful (drain) and immediate shutdown, with reopening
//!
//! ## Example
//!
//! ```
//! use corral_pool::{ResourcePool, Token};
//!
//! let pool = ResourcePool::with_resources([Token::new(), Token::new()]);
//! pool.open();
//!
//! let held = pool.acquire().expect("pool is open with idle resources");
//! // ... do exclusive work with the resource ...
//! pool.release(held).expect("resource is checked out");
//! ```

/// Pool engine and the identity of pooled resources
pub mod pool;

/// Synchronization helpers for pool callers
pub mod sync;

// Re-export key types for easier access
pub use pool::exclusive::{
    AcquireError, AddError, CloseError, ForcedRemoval, PoolCounts, PoolStats, ReleaseError,
    RemoveError, ResourcePool,
};
pub use pool::resource::{Resource, Token};
pub use sync::cancel::CancelToken;
