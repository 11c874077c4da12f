//! Pending exception save/restore
//!
//! Native code that calls back into script while an exception may already be
//! pending saves that exception first, so the nested call starts clean and
//! the outer exception survives it.

use tracing::{error, warn};

use crate::runtime::Runtime;
use crate::value::Value;

/// Pending exception taken aside for the duration of a nested call.
///
/// Dropping the guard (or calling [`restore`](Self::restore)) puts the saved
/// exception back. If the nested call left a new exception pending, the new
/// one stays and the saved one is discarded.
#[must_use = "dropping the guard restores the saved exception immediately"]
pub struct SavedExceptionState<'a> {
    runtime: &'a Runtime,
    saved: Option<Value>,
}

impl<'a> SavedExceptionState<'a> {
    pub(crate) fn new(runtime: &'a Runtime) -> Self {
        Self {
            runtime,
            saved: runtime.take_pending_exception(),
        }
    }

    /// The exception that was pending when the state was saved
    pub fn saved(&self) -> Option<&Value> {
        self.saved.as_ref()
    }

    /// Restore the saved exception now
    pub fn restore(self) {}

    /// Drop the saved exception instead of restoring it
    pub fn discard(mut self) {
        self.saved = None;
    }
}

impl Drop for SavedExceptionState<'_> {
    fn drop(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        if self.runtime.is_exception_pending() {
            warn!(
                target: "tern::vm",
                runtime = %self.runtime.id(),
                superseded = %saved,
                "pending exception superseded by a nested call"
            );
        } else {
            self.runtime.throw(saved);
        }
    }
}

impl Runtime {
    /// Take the pending exception aside until the returned guard drops
    pub fn save_exception_state(&self) -> SavedExceptionState<'_> {
        SavedExceptionState::new(self)
    }
}

/// Take the pending exception and report it, returning whether there was one.
///
/// Used where an exception has nowhere to propagate, such as a callback
/// returning into native code that discards its result.
pub fn log_pending_exception(runtime: &Runtime, origin: &str) -> bool {
    match runtime.take_pending_exception() {
        Some(exception) => {
            error!(
                target: "tern::vm",
                runtime = %runtime.id(),
                origin,
                %exception,
                "uncaught exception"
            );
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_exception_is_restored() {
        let runtime = Runtime::new();
        runtime.throw(Value::string("outer"));

        let saved = runtime.save_exception_state();
        assert!(!runtime.is_exception_pending());
        assert_eq!(saved.saved(), Some(&Value::string("outer")));
        saved.restore();

        assert_eq!(runtime.pending_exception(), Some(Value::string("outer")));
    }

    #[test]
    fn test_nested_exception_wins() {
        let runtime = Runtime::new();
        runtime.throw(Value::string("outer"));

        {
            let _saved = runtime.save_exception_state();
            runtime.throw(Value::string("inner"));
        }

        assert_eq!(runtime.pending_exception(), Some(Value::string("inner")));
    }

    #[test]
    fn test_discard() {
        let runtime = Runtime::new();
        runtime.throw(Value::string("outer"));
        runtime.save_exception_state().discard();
        assert!(!runtime.is_exception_pending());
    }

    #[test]
    fn test_log_pending_exception_clears() {
        let runtime = Runtime::new();
        assert!(!log_pending_exception(&runtime, "test"));
        runtime.throw(Value::number(1.0));
        assert!(log_pending_exception(&runtime, "test"));
        assert!(!runtime.is_exception_pending());
    }
}
