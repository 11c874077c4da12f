//! Closure bridge errors

use tern_vm::{RuntimeId, VmError};
use thiserror::Error;

/// Errors from creating or invoking a script closure
#[derive(Debug, Error)]
pub enum ClosureError {
    /// The owning context has been torn down
    #[error("execution context has been destroyed")]
    ContextDestroyed,

    /// The value handed to [`create`](crate::create) is not a live function
    #[error("value is not callable: {0}")]
    NotCallable(String),

    /// The callable was allocated by a runtime other than the context's
    #[error("callable {callable} does not belong to {runtime}")]
    ForeignCallable {
        /// Rendering of the callable
        callable: String,
        /// Runtime of the context the closure was requested for
        runtime: RuntimeId,
    },

    /// The closure was invalidated; the callable was not run
    #[error("closure '{description}' has been invalidated")]
    Invalidated {
        /// Closure description
        description: String,
    },

    /// An unrooted callable was reclaimed by the collector
    #[error("callable of closure '{description}' has been collected")]
    CallableCollected {
        /// Closure description
        description: String,
    },

    /// Invocation attempted while the collector is running
    #[error("closure '{description}' invoked during garbage collection")]
    Collecting {
        /// Closure description
        description: String,
    },

    /// The callable threw; the exception is pending on the runtime
    #[error("closure '{description}' threw: {message}")]
    Exception {
        /// Closure description
        description: String,
        /// Rendering of the thrown value
        message: String,
    },

    /// Engine failure outside the call itself
    #[error(transparent)]
    Vm(#[from] VmError),
}

impl ClosureError {
    /// Whether the callable ran and threw
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }
}

/// Result type for closure operations
pub type ClosureResult<T> = std::result::Result<T, ClosureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_description() {
        let err = ClosureError::Exception {
            description: "on-click".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "closure 'on-click' threw: boom");
        assert!(err.is_exception());

        let err: ClosureError = VmError::ContextDestroyed.into();
        assert!(!err.is_exception());
    }
}
