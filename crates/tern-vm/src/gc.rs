//! Garbage collection support
//!
//! This module provides the tracer interface handed to embedder trace hooks
//! during the mark phase, and a RAII root for native code.

use std::rc::Rc;

use tern_gc::GcRef;

use crate::runtime::Runtime;
use crate::value::Value;

/// Tracer interface for GC marking phase
pub trait Tracer {
    /// Mark a heap object as reachable
    fn mark(&mut self, target: GcRef);

    /// Mark a value as reachable
    fn mark_value(&mut self, value: &Value) {
        if let Some(target) = value.as_gc_ref() {
            self.mark(target);
        }
    }
}

/// Trait for types that can be traced by the GC
pub trait Trace {
    /// Trace all references in this object
    fn trace(&self, tracer: &mut dyn Tracer);
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.mark_value(self);
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(item) = self {
            item.trace(tracer);
        }
    }
}

/// Tracer that records every reference it is shown
#[derive(Debug, Default)]
pub struct RefCollector {
    refs: Vec<GcRef>,
}

impl RefCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// References seen so far, in visit order
    pub fn refs(&self) -> &[GcRef] {
        &self.refs
    }

    /// Whether `target` was reported
    pub fn contains(&self, target: GcRef) -> bool {
        self.refs.contains(&target)
    }

    /// Consume into the recorded references
    pub fn into_refs(self) -> Vec<GcRef> {
        self.refs
    }
}

impl Tracer for RefCollector {
    fn mark(&mut self, target: GcRef) {
        self.refs.push(target);
    }
}

/// A GC root held by native code.
///
/// The value stays reachable until the guard is dropped.
pub struct Rooted {
    runtime: Rc<Runtime>,
    value: Value,
}

impl Rooted {
    pub(crate) fn new(runtime: Rc<Runtime>, value: Value) -> Self {
        if let Some(target) = value.as_gc_ref() {
            runtime.add_root(target);
        }
        Self { runtime, value }
    }

    /// Get the rooted value
    pub fn get(&self) -> &Value {
        &self.value
    }
}

impl std::ops::Deref for Rooted {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl Drop for Rooted {
    fn drop(&mut self) {
        if let Some(target) = self.value.as_gc_ref()
            && let Err(err) = self.runtime.remove_root(target)
        {
            tracing::warn!(target: "tern::vm", %err, "failed to release rooted value");
        }
    }
}
