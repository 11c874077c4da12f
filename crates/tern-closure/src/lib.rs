//! # Tern Closure
//!
//! Wraps script callables from a `tern-vm` runtime in refcounted host
//! closures, so host code can store and invoke them like any other
//! callback.
//!
//! ## Lifetimes
//!
//! The host side manages closures by reference count, the script side by
//! tracing collection. A [`ScriptClosure`] bridges the two with an explicit
//! one-way lifecycle:
//!
//! - created valid, optionally rooting its callable
//! - invoked any number of times
//! - invalidated exactly once: when the owning context is torn down, when the
//!   host invalidates it, or when the last host reference is dropped
//!
//! After invalidation the callable is never touched again.
//!
//! ## Example
//!
//! ```
//! use tern_closure::create;
//! use tern_vm::{Context, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let context = Context::new(&runtime).unwrap();
//! let double = runtime
//!     .new_function("double", |args| {
//!         Ok(Value::number(args.arg(0).as_number().unwrap_or(0.0) * 2.0))
//!     })
//!     .unwrap();
//!
//! let closure = create(&context, &double, "double", true).unwrap();
//! let result = closure.invoke(&Value::undefined(), &[Value::int32(21)]).unwrap();
//! assert_eq!(result, Value::int32(42));
//!
//! closure.invalidate();
//! assert!(closure.invoke(&Value::undefined(), &[Value::int32(21)]).is_err());
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod closure;
pub mod error;
pub mod host;
pub mod signal;

pub use closure::{RootingPolicy, ScriptClosure, create};
pub use error::{ClosureError, ClosureResult};
pub use host::{HostClosure, WeakHostClosure};
pub use signal::{HandlerId, Signal};
