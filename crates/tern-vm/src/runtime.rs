//! VM runtime - the engine instance
//!
//! The runtime owns the heap, the persistent root set, the pending exception
//! and the stack of entered execution scopes. Contexts hold a strong
//! reference to their runtime; the runtime only records which contexts are
//! alive so their globals can be treated as roots.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use tern_gc::{AllocationRegistry, GcConfig, GcError, GcRef, HeapId, RegistryStats, RootSet};
use tracing::{debug, trace};

use crate::context::ContextId;
use crate::error::{VmError, VmResult};
use crate::function::{CallArgs, JsFunction};
use crate::gc::{RefCollector, Rooted, Tracer};
use crate::object::{HeapObject, JsObject};
use crate::value::Value;

static NEXT_RUNTIME_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a runtime, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u32);

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// Handle for a registered extra-roots tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TracerId(u64);

type ExtraRootsTracer = Rc<dyn Fn(&mut dyn Tracer)>;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum nesting of script calls, including calls re-entered from
    /// native code
    pub max_call_depth: usize,
    /// Heap configuration
    pub gc: GcConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            gc: GcConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum call depth
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the heap configuration
    pub fn gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }
}

/// The engine instance
///
/// `Runtime` is neither `Send` nor `Sync`: every entry into the engine
/// happens on the thread that created it.
pub struct Runtime {
    id: RuntimeId,
    config: RuntimeConfig,
    heap: RefCell<AllocationRegistry<HeapObject>>,
    roots: RefCell<RootSet>,
    /// Live contexts and their global objects
    contexts: RefCell<IndexMap<ContextId, GcRef>>,
    /// Entered execution scopes, innermost last
    scopes: RefCell<Vec<ContextId>>,
    /// Callee, `this` and arguments of every in-flight call
    frames: RefCell<Vec<Value>>,
    call_depth: Cell<usize>,
    pending_exception: RefCell<Option<Value>>,
    extra_tracers: RefCell<IndexMap<TracerId, ExtraRootsTracer>>,
    next_tracer_id: Cell<u64>,
    collecting: Cell<bool>,
}

impl Runtime {
    /// Create a new runtime with default configuration
    pub fn new() -> Rc<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Rc<Self> {
        let id = RuntimeId(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed));
        debug!(target: "tern::vm", runtime = %id, "runtime created");
        Rc::new(Self {
            id,
            heap: RefCell::new(AllocationRegistry::with_config(&config.gc)),
            roots: RefCell::new(RootSet::new()),
            contexts: RefCell::new(IndexMap::new()),
            scopes: RefCell::new(Vec::new()),
            frames: RefCell::new(Vec::new()),
            call_depth: Cell::new(0),
            pending_exception: RefCell::new(None),
            extra_tracers: RefCell::new(IndexMap::new()),
            next_tracer_id: Cell::new(0),
            collecting: Cell::new(false),
            config,
        })
    }

    /// Runtime identity
    pub fn id(&self) -> RuntimeId {
        self.id
    }

    /// Get runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Allocation and object access
    // ------------------------------------------------------------------

    fn alloc(&self, object: HeapObject) -> VmResult<GcRef> {
        if self.collecting.get() {
            return Err(VmError::internal("allocation while the collector is running"));
        }
        self.heap
            .borrow_mut()
            .allocate(object)
            .map_err(|err| match err {
                GcError::HeapExhausted { .. } => VmError::OutOfMemory,
                other => VmError::Gc(other),
            })
    }

    /// Allocate an empty plain object
    pub fn alloc_object(&self) -> VmResult<Value> {
        self.alloc(HeapObject::Object(JsObject::new()))
            .map(Value::object)
    }

    /// Allocate a function object
    pub fn alloc_function(&self, function: JsFunction) -> VmResult<Value> {
        self.alloc(HeapObject::Function(Rc::new(function)))
            .map(Value::object)
    }

    /// Allocate a function object with no captures
    pub fn new_function<F>(&self, name: &str, body: F) -> VmResult<Value>
    where
        F: Fn(&CallArgs<'_>) -> VmResult<Value> + 'static,
    {
        self.alloc_function(JsFunction::new(name, body))
    }

    /// Identity of this runtime's heap, carried by every reference it hands out
    pub fn heap_id(&self) -> HeapId {
        self.heap.borrow().heap_id()
    }

    /// Whether `value` is an object allocated by this runtime, live or not
    pub fn owns(&self, value: &Value) -> bool {
        value
            .as_gc_ref()
            .is_some_and(|target| self.heap.borrow().owns(target))
    }

    /// Whether `target` still points at a live heap object
    pub fn is_alive(&self, target: GcRef) -> bool {
        self.heap.borrow().is_alive(target)
    }

    /// Whether `value` is a live function object
    pub fn is_function(&self, value: &Value) -> bool {
        self.function(value).is_some()
    }

    pub(crate) fn function(&self, value: &Value) -> Option<Rc<JsFunction>> {
        let target = value.as_gc_ref()?;
        self.heap
            .borrow()
            .get(target)
            .and_then(HeapObject::as_function)
            .cloned()
    }

    /// Read a property of a plain object
    pub fn get_property(&self, object: &Value, key: &str) -> Option<Value> {
        let target = object.as_gc_ref()?;
        self.heap
            .borrow()
            .get(target)
            .and_then(HeapObject::as_object)
            .and_then(|object| object.get(key).cloned())
    }

    /// Write a property of a plain object
    pub fn set_property(&self, object: &Value, key: &str, value: Value) -> VmResult<()> {
        let target = object
            .as_gc_ref()
            .ok_or_else(|| VmError::type_error(format!("cannot set '{}' on {}", key, object)))?;
        let mut heap = self.heap.borrow_mut();
        let slot = heap
            .get_mut(target)
            .ok_or(VmError::Gc(GcError::StaleReference(target)))?;
        let object = slot
            .as_object_mut()
            .ok_or_else(|| VmError::type_error(format!("cannot set '{}' on a function", key)))?;
        object.set(key, value);
        Ok(())
    }

    /// Delete a property of a plain object, returning it
    pub fn delete_property(&self, object: &Value, key: &str) -> Option<Value> {
        let target = object.as_gc_ref()?;
        self.heap
            .borrow_mut()
            .get_mut(target)
            .and_then(HeapObject::as_object_mut)
            .and_then(|object| object.delete(key))
    }

    /// Number of live heap objects
    pub fn object_count(&self) -> usize {
        self.heap.borrow().allocation_count()
    }

    // ------------------------------------------------------------------
    // Rooting
    // ------------------------------------------------------------------

    /// Root `target` until a matching [`remove_root`](Self::remove_root)
    pub fn add_root(&self, target: GcRef) {
        self.roots.borrow_mut().add(target);
        trace!(target: "tern::vm", runtime = %self.id, %target, "root added");
    }

    /// Release one root on `target`
    pub fn remove_root(&self, target: GcRef) -> VmResult<()> {
        self.roots.borrow_mut().remove(target)?;
        trace!(target: "tern::vm", runtime = %self.id, %target, "root removed");
        Ok(())
    }

    /// Outstanding roots on `target`
    pub fn root_count(&self, target: GcRef) -> usize {
        self.roots.borrow().count(target)
    }

    /// Outstanding root operations across the whole runtime
    pub fn outstanding_roots(&self) -> u64 {
        self.roots.borrow().outstanding()
    }

    /// Root `value` for as long as the returned guard lives
    pub fn root(self: &Rc<Self>, value: Value) -> Rooted {
        Rooted::new(Rc::clone(self), value)
    }

    /// Register a tracer called during every mark phase.
    ///
    /// The tracer must not allocate, must not call into script and must not
    /// fail.
    pub fn add_extra_roots_tracer<F>(&self, tracer: F) -> TracerId
    where
        F: Fn(&mut dyn Tracer) + 'static,
    {
        let id = TracerId(self.next_tracer_id.get());
        self.next_tracer_id.set(id.0 + 1);
        self.extra_tracers.borrow_mut().insert(id, Rc::new(tracer));
        id
    }

    /// Unregister an extra-roots tracer
    pub fn remove_extra_roots_tracer(&self, id: TracerId) -> bool {
        self.extra_tracers.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of registered extra-roots tracers
    pub fn extra_roots_tracer_count(&self) -> usize {
        self.extra_tracers.borrow().len()
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Whether a collection is in progress
    pub fn is_collecting(&self) -> bool {
        self.collecting.get()
    }

    /// Run a full collection, returning the number of objects reclaimed.
    ///
    /// Reclaimed objects are dropped after the collector has finished, so
    /// their destructors may call back into the runtime.
    pub fn gc(&self) -> usize {
        if self.collecting.replace(true) {
            return 0;
        }

        let reclaimed = {
            let _collecting = CollectingGuard(&self.collecting);
            let roots = self.collect_roots();
            self.heap.borrow_mut().collect(&roots)
        };

        let count = reclaimed.len();
        drop(reclaimed);
        debug!(
            target: "tern::vm",
            runtime = %self.id,
            reclaimed = count,
            live = self.object_count(),
            "collection finished"
        );
        count
    }

    fn collect_roots(&self) -> Vec<GcRef> {
        let mut collector = RefCollector::new();

        for target in self.roots.borrow().iter() {
            collector.mark(target);
        }
        for global in self.contexts.borrow().values() {
            collector.mark(*global);
        }
        for value in self.frames.borrow().iter() {
            collector.mark_value(value);
        }
        if let Some(exception) = self.pending_exception.borrow().as_ref() {
            collector.mark_value(exception);
        }

        let tracers: Vec<ExtraRootsTracer> =
            self.extra_tracers.borrow().values().cloned().collect();
        for tracer in tracers {
            tracer(&mut collector);
        }

        collector.into_refs()
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> RegistryStats {
        self.heap.borrow().stats()
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    /// Make `value` the pending exception
    pub fn throw(&self, value: Value) {
        *self.pending_exception.borrow_mut() = Some(value);
    }

    /// Whether an exception is pending
    pub fn is_exception_pending(&self) -> bool {
        self.pending_exception.borrow().is_some()
    }

    /// The pending exception, if any
    pub fn pending_exception(&self) -> Option<Value> {
        self.pending_exception.borrow().clone()
    }

    /// Take the pending exception, leaving none
    pub fn take_pending_exception(&self) -> Option<Value> {
        self.pending_exception.borrow_mut().take()
    }

    /// Discard the pending exception
    pub fn clear_pending_exception(&self) {
        self.pending_exception.borrow_mut().take();
    }

    // ------------------------------------------------------------------
    // Execution scopes and call frames
    // ------------------------------------------------------------------

    /// The innermost entered context
    pub fn current_context(&self) -> Option<ContextId> {
        self.scopes.borrow().last().copied()
    }

    /// Number of entered execution scopes
    pub fn scope_depth(&self) -> usize {
        self.scopes.borrow().len()
    }

    /// Current script call depth
    pub fn call_depth(&self) -> usize {
        self.call_depth.get()
    }

    pub(crate) fn push_scope(&self, id: ContextId) {
        self.scopes.borrow_mut().push(id);
    }

    pub(crate) fn pop_scope(&self, id: ContextId) {
        let popped = self.scopes.borrow_mut().pop();
        debug_assert_eq!(popped, Some(id), "execution scopes must nest");
    }

    pub(crate) fn push_frame(
        &self,
        callee: &Value,
        this: &Value,
        args: &[Value],
    ) -> VmResult<FrameGuard<'_>> {
        let depth = self.call_depth.get();
        if depth >= self.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        self.call_depth.set(depth + 1);

        let mut frames = self.frames.borrow_mut();
        let base = frames.len();
        frames.push(callee.clone());
        frames.push(this.clone());
        frames.extend_from_slice(args);
        Ok(FrameGuard {
            runtime: self,
            base,
        })
    }

    pub(crate) fn register_context(&self, id: ContextId, global: GcRef) {
        self.contexts.borrow_mut().insert(id, global);
    }

    pub(crate) fn unregister_context(&self, id: ContextId) {
        self.contexts.borrow_mut().shift_remove(&id);
    }

    /// Number of live contexts
    pub fn context_count(&self) -> usize {
        self.contexts.borrow().len()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("objects", &self.object_count())
            .field("contexts", &self.context_count())
            .field("call_depth", &self.call_depth.get())
            .field("has_exception", &self.is_exception_pending())
            .finish()
    }
}

struct CollectingGuard<'a>(&'a Cell<bool>);

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Keeps one call's values rooted and its depth counted while it runs
pub(crate) struct FrameGuard<'a> {
    runtime: &'a Runtime,
    base: usize,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.runtime.frames.borrow_mut().truncate(self.base);
        self.runtime
            .call_depth
            .set(self.runtime.call_depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_ids_are_unique() {
        let a = Runtime::new();
        let b = Runtime::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_properties() {
        let runtime = Runtime::new();
        let object = runtime.alloc_object().unwrap();
        runtime.set_property(&object, "x", Value::int32(1)).unwrap();
        assert_eq!(runtime.get_property(&object, "x"), Some(Value::int32(1)));
        assert_eq!(runtime.delete_property(&object, "x"), Some(Value::int32(1)));
        assert_eq!(runtime.get_property(&object, "x"), None);
        assert!(runtime.set_property(&Value::null(), "x", Value::null()).is_err());
    }

    #[test]
    fn test_unrooted_objects_are_collected() {
        let runtime = Runtime::new();
        let object = runtime.alloc_object().unwrap();
        let target = object.as_gc_ref().unwrap();

        assert_eq!(runtime.gc(), 1);
        assert!(!runtime.is_alive(target));
        assert!(runtime.owns(&object));
        assert_eq!(runtime.get_property(&object, "x"), None);

        let stats = runtime.gc_stats();
        assert_eq!(stats.collection_count, 1);
        assert_eq!(stats.last_reclaimed, 1);
        assert_eq!(stats.allocation_count, 0);
    }

    #[test]
    fn test_objects_of_another_runtime_do_not_resolve() {
        let first = Runtime::new();
        let second = Runtime::new();
        let ours = first.alloc_object().unwrap();
        let theirs = second.new_function("f", |_| Ok(Value::undefined())).unwrap();

        assert_ne!(first.heap_id(), second.heap_id());
        assert_eq!(ours.as_gc_ref().unwrap().index(), theirs.as_gc_ref().unwrap().index());
        assert!(!first.owns(&theirs));
        assert!(second.owns(&theirs));
        assert!(!first.owns(&Value::int32(1)));
        assert!(!first.is_function(&theirs));
        assert!(first.set_property(&theirs, "x", Value::null()).is_err());
    }

    #[test]
    fn test_roots_and_extra_tracers() {
        let runtime = Runtime::new();
        let rooted = runtime.alloc_object().unwrap().as_gc_ref().unwrap();
        let traced = runtime.alloc_object().unwrap().as_gc_ref().unwrap();

        runtime.add_root(rooted);
        let id = runtime.add_extra_roots_tracer(move |tracer| tracer.mark(traced));

        assert_eq!(runtime.gc(), 0);
        assert!(runtime.is_alive(rooted));
        assert!(runtime.is_alive(traced));

        assert!(runtime.remove_extra_roots_tracer(id));
        runtime.remove_root(rooted).unwrap();
        assert_eq!(runtime.gc(), 2);
        assert_eq!(runtime.outstanding_roots(), 0);
    }

    #[test]
    fn test_remove_root_underflow() {
        let runtime = Runtime::new();
        let target = runtime.alloc_object().unwrap().as_gc_ref().unwrap();
        assert!(matches!(
            runtime.remove_root(target),
            Err(VmError::Gc(GcError::RootUnderflow(_)))
        ));
    }

    #[test]
    fn test_heap_limit_reports_out_of_memory() {
        let config = RuntimeConfig::new().gc(GcConfig::new().max_objects(2));
        let runtime = Runtime::with_config(config);
        runtime.alloc_object().unwrap();
        runtime.alloc_object().unwrap();
        assert!(matches!(runtime.alloc_object(), Err(VmError::OutOfMemory)));
    }

    #[test]
    fn test_pending_exception_is_a_root() {
        let runtime = Runtime::new();
        let error = runtime.alloc_object().unwrap();
        runtime.throw(error.clone());

        runtime.gc();
        assert!(runtime.is_alive(error.as_gc_ref().unwrap()));
        assert_eq!(runtime.take_pending_exception(), Some(error));
        assert!(!runtime.is_exception_pending());
    }
}
