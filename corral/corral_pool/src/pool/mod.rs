//! Exclusive pooling of reusable resources.
//!
//! This module provides the pooling machinery:
//!
//! - Identity-keyed membership for arbitrary caller-supplied types
//! - A blocking, thread-safe checkout/return engine with graceful and
//!   forced shutdown

pub mod exclusive;
pub mod resource;

// Re-export key types from exclusive
pub use exclusive::{
    AcquireError, AddError, CloseError, ForcedRemoval, PoolCounts, PoolStats, ReleaseError,
    RemoveError, ResourcePool,
};

// Re-export key types from resource
pub use resource::{Resource, Token};
