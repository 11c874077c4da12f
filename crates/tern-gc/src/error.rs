//! GC error types

use thiserror::Error;

use crate::object::GcRef;

/// Errors reported by the collector and the root set
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GcError {
    /// `remove_root` was called more times than `add_root`
    #[error("root underflow: {0} is not rooted")]
    RootUnderflow(GcRef),

    /// The handle points at a slot that has since been swept
    #[error("stale reference: {0} was collected")]
    StaleReference(GcRef),

    /// The registry reached its configured object limit
    #[error("heap exhausted: {limit} objects allocated")]
    HeapExhausted {
        /// Configured maximum number of live objects
        limit: usize,
    },
}

/// Result type for GC operations
pub type GcResult<T> = std::result::Result<T, GcError>;
