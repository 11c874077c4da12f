//! # Tern VM
//!
//! Single-threaded scripting engine core that hosts script callables for the
//! closure bridge.
//!
//! ## Design Principles
//!
//! - **Single-threaded**: All engine types are `!Send`/`!Sync`. The embedding
//!   serializes access to a runtime by construction, not by locking.
//! - **Tracing GC**: Heap objects live in a `tern-gc` registry and are only
//!   reclaimed by an explicit [`Runtime::gc`] call
//! - **Pending exceptions**: A failed call leaves its exception on the
//!   runtime until someone takes it
//! - **Explicit teardown**: Contexts notify registered callbacks before they
//!   release anything

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod exception;
pub mod function;
pub mod gc;
pub mod object;
pub mod runtime;
pub mod value;

pub use context::{Context, ContextId, ContextScope, ContextState, NotifierId};
pub use error::{ThrownValue, VmError, VmResult};
pub use exception::{SavedExceptionState, log_pending_exception};
pub use function::{CallArgs, JsFunction, NativeFn};
pub use gc::{RefCollector, Rooted, Trace, Tracer};
pub use object::{HeapObject, JsObject};
pub use runtime::{Runtime, RuntimeConfig, RuntimeId, TracerId};
pub use tern_gc::{GcConfig, GcRef, HeapId};
pub use value::Value;
