//! VM error types

use crate::value::Value;
use tern_gc::GcError;
use thiserror::Error;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., calling non-function)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Call depth exceeded `RuntimeConfig::max_call_depth`
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Out of memory
    #[error("OutOfMemory")]
    OutOfMemory,

    /// The execution context has been torn down
    #[error("execution context has been destroyed")]
    ContextDestroyed,

    /// Thrown script exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    /// Collector bookkeeping error
    #[error("GC error: {0}")]
    Gc(#[from] GcError),
}

/// A thrown script value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create an exception from a thrown script value
    pub fn exception(value: Value) -> Self {
        let message = value.to_string();
        Self::Exception(Box::new(ThrownValue { message, value }))
    }

    /// The script value this error raises when it escapes a callable.
    ///
    /// Thrown values are passed through, engine errors become their message.
    pub fn to_exception_value(&self) -> Value {
        match self {
            Self::Exception(thrown) => thrown.value.clone(),
            other => Value::string(&other.to_string()),
        }
    }
}

impl From<String> for VmError {
    fn from(s: String) -> Self {
        VmError::type_error(s)
    }
}

impl From<&str> for VmError {
    fn from(s: &str) -> Self {
        VmError::type_error(s)
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_value_passthrough() {
        let err = VmError::exception(Value::number(7.0));
        assert_eq!(err.to_exception_value(), Value::number(7.0));
        assert_eq!(err.to_string(), "Uncaught exception: 7");
    }

    #[test]
    fn test_engine_error_becomes_message() {
        let err = VmError::StackOverflow;
        assert_eq!(
            err.to_exception_value().as_str(),
            Some("RangeError: Maximum call stack size exceeded")
        );
    }
}
