//! Execution contexts
//!
//! A context is one global environment inside a runtime. Script runs in a
//! context, and native code that holds on to script values registers a
//! teardown notifier so it hears about the context going away before any of
//! its state is released.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tern_gc::GcRef;
use tracing::{debug, trace};

use crate::error::{VmError, VmResult};
use crate::function::CallArgs;
use crate::runtime::Runtime;
use crate::value::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a context, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// Handle for a registered teardown notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifierId(u64);

/// Lifecycle of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Running normally
    Alive,
    /// Teardown notifiers are running
    TearingDown,
    /// Torn down; no further script can run
    Destroyed,
}

type TeardownNotifier = Box<dyn FnOnce(&Context)>;

/// A global environment in a runtime
pub struct Context {
    id: ContextId,
    runtime: Rc<Runtime>,
    global: GcRef,
    state: Cell<ContextState>,
    notifiers: RefCell<IndexMap<NotifierId, TeardownNotifier>>,
    next_notifier: Cell<u64>,
}

impl Context {
    /// Create a context with a fresh global object
    pub fn new(runtime: &Rc<Runtime>) -> VmResult<Rc<Self>> {
        let global = runtime
            .alloc_object()?
            .as_gc_ref()
            .ok_or_else(|| VmError::internal("global object is not a heap reference"))?;
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        runtime.register_context(id, global);
        debug!(target: "tern::vm", runtime = %runtime.id(), context = %id, "context created");

        Ok(Rc::new(Self {
            id,
            runtime: Rc::clone(runtime),
            global,
            state: Cell::new(ContextState::Alive),
            notifiers: RefCell::new(IndexMap::new()),
            next_notifier: Cell::new(0),
        }))
    }

    /// Context identity
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Owning runtime
    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    /// Lifecycle state
    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    /// Whether the context accepts new script calls and notifiers
    pub fn is_alive(&self) -> bool {
        self.state.get() == ContextState::Alive
    }

    /// The global object
    pub fn global(&self) -> Value {
        Value::object(self.global)
    }

    /// Read a global binding
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.runtime.get_property(&self.global(), name)
    }

    /// Write a global binding
    pub fn set_global(&self, name: &str, value: Value) -> VmResult<()> {
        if self.state.get() == ContextState::Destroyed {
            return Err(VmError::ContextDestroyed);
        }
        self.runtime.set_property(&self.global(), name, value)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Register a callback run once when the context is torn down.
    ///
    /// Notifiers run in registration order, before the global object is
    /// released.
    pub fn register_teardown<F>(&self, notifier: F) -> VmResult<NotifierId>
    where
        F: FnOnce(&Context) + 'static,
    {
        if !self.is_alive() {
            return Err(VmError::ContextDestroyed);
        }
        let id = NotifierId(self.next_notifier.get());
        self.next_notifier.set(id.0 + 1);
        self.notifiers.borrow_mut().insert(id, Box::new(notifier));
        Ok(id)
    }

    /// Unregister a teardown notifier, returning whether it was still pending
    pub fn unregister_teardown(&self, id: NotifierId) -> bool {
        self.notifiers.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of pending teardown notifiers
    pub fn teardown_count(&self) -> usize {
        self.notifiers.borrow().len()
    }

    /// Tear the context down.
    ///
    /// Runs every teardown notifier, then drops the global object from the
    /// runtime's roots. Idempotent; also runs when the last reference to the
    /// context is dropped.
    pub fn destroy(&self) {
        if !self.is_alive() {
            return;
        }
        self.state.set(ContextState::TearingDown);
        debug!(
            target: "tern::vm",
            context = %self.id,
            notifiers = self.teardown_count(),
            "context teardown started"
        );

        // Notifiers may unregister each other, so pop one at a time.
        loop {
            let next = self.notifiers.borrow_mut().shift_remove_index(0);
            let Some((id, notifier)) = next else {
                break;
            };
            trace!(
                target: "tern::vm",
                context = %self.id,
                notifier = id.0,
                "running teardown notifier"
            );
            notifier(self);
        }

        self.runtime.unregister_context(self.id);
        self.state.set(ContextState::Destroyed);
        debug!(target: "tern::vm", context = %self.id, "context destroyed");
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Enter this context's execution scope until the guard drops
    pub fn enter(&self) -> ContextScope<'_> {
        self.runtime.push_scope(self.id);
        ContextScope { context: self }
    }

    /// Call `callee` with `this` and `args`.
    ///
    /// On failure the thrown value becomes the runtime's pending exception
    /// and the error is returned as well.
    pub fn call(
        self: &Rc<Self>,
        callee: &Value,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        if self.state.get() == ContextState::Destroyed {
            return Err(VmError::ContextDestroyed);
        }
        if self.runtime.is_collecting() {
            return Err(VmError::internal(
                "cannot call into script while the collector is running",
            ));
        }

        let result = self.call_function(callee, this, args);
        if let Err(err) = &result {
            self.runtime.throw(err.to_exception_value());
        }
        result
    }

    fn call_function(
        self: &Rc<Self>,
        callee: &Value,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let function = self
            .runtime
            .function(callee)
            .ok_or_else(|| VmError::type_error(format!("{} is not a function", callee)))?;

        let _scope = self.enter();
        let _frame = self.runtime.push_frame(callee, this, args)?;
        function.call(&CallArgs {
            context: self,
            function: &function,
            this,
            args,
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("runtime", &self.runtime.id())
            .field("state", &self.state.get())
            .field("notifiers", &self.teardown_count())
            .finish()
    }
}

/// An entered execution scope; leaving happens on drop
pub struct ContextScope<'a> {
    context: &'a Context,
}

impl ContextScope<'_> {
    /// The entered context
    pub fn context(&self) -> &Context {
        self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.context.runtime.pop_scope(self.context.id);
    }
}
