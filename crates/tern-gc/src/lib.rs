//! # Tern Garbage Collector
//!
//! Stop-the-world tracing collector for the Tern scripting engine.
//!
//! ## Design
//!
//! - **Slot registry**: Objects live in generation-tagged slots and are
//!   addressed by [`GcRef`] handles, never by raw pointers
//! - **Tri-color marking**: White/gray/black marking with a gray worklist,
//!   so cycles without a root are reclaimed
//! - **Persistent roots**: A counted [`RootSet`] for values that native code
//!   must keep alive regardless of script reachability
//! - **Deferred drop**: Sweep hands dead values back to the caller so their
//!   destructors run after the registry is no longer borrowed

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod heap;
pub mod mark_sweep;
pub mod object;
pub mod roots;

pub use error::{GcError, GcResult};
pub use heap::GcConfig;
pub use mark_sweep::{AllocationRegistry, GcTraceable, RegistryStats};
pub use object::{GcRef, HeapId, MarkColor};
pub use roots::RootSet;
