//! Script callables wrapped as host closures
//!
//! A [`ScriptClosure`] ties a script function to a [`HostClosure`]. The host
//! side may keep the closure for as long as it likes; the script side may
//! tear the owning context down at any time. Both paths end in the same
//! one-way invalidation, after which the callable is never touched again.
//!
//! ## Rooting
//!
//! A rooted closure holds one persistent root on its callable from creation
//! until invalidation. An unrooted closure relies on something else keeping
//! the callable reachable and reports [`ClosureError::CallableCollected`] if
//! it was reclaimed.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tern_gc::GcRef;
use tern_vm::{
    Context, ContextId, NotifierId, Runtime, RuntimeId, Tracer, Value, VmError,
    log_pending_exception,
};
use tracing::{debug, trace, warn};

use crate::error::{ClosureError, ClosureResult};
use crate::host::HostClosure;

/// Whether a closure holds a root on its callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootingPolicy {
    /// The callable stays alive while the closure is valid
    Rooted,
    /// The callable is kept alive by someone else
    Unrooted,
}

impl From<bool> for RootingPolicy {
    fn from(root_function: bool) -> Self {
        if root_function {
            Self::Rooted
        } else {
            Self::Unrooted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Validity {
    Valid,
    Invalidated,
}

struct ClosureInner {
    runtime_id: RuntimeId,
    context_id: ContextId,
    runtime: Weak<Runtime>,
    context: Weak<Context>,
    callable: GcRef,
    rooting: RootingPolicy,
    description: String,
    validity: Cell<Validity>,
    /// Root held on `callable`; taken exactly once
    root: Cell<Option<GcRef>>,
    /// Registration on the context's teardown notifiers
    notifier: Cell<Option<NotifierId>>,
}

impl ClosureInner {
    fn is_valid(&self) -> bool {
        self.validity.get() == Validity::Valid
    }

    fn invalidate(&self) {
        if self.validity.replace(Validity::Invalidated) == Validity::Invalidated {
            return;
        }

        if let Some(root) = self.root.take()
            && let Some(runtime) = self.runtime.upgrade()
            && let Err(err) = runtime.remove_root(root)
        {
            warn!(
                target: "tern::closure",
                closure = %self.description,
                %err,
                "failed to release callable root"
            );
        }

        if let Some(id) = self.notifier.take()
            && let Some(context) = self.context.upgrade()
        {
            context.unregister_teardown(id);
        }

        debug!(
            target: "tern::closure",
            closure = %self.description,
            context = %self.context_id,
            "closure invalidated"
        );
    }

    fn invoke(&self, this: &Value, args: &[Value]) -> ClosureResult<Value> {
        if !self.is_valid() {
            debug!(
                target: "tern::closure",
                closure = %self.description,
                "invoke on invalidated closure ignored"
            );
            return Err(ClosureError::Invalidated {
                description: self.description.clone(),
            });
        }

        let context = self
            .context
            .upgrade()
            .ok_or(ClosureError::ContextDestroyed)?;
        let runtime = context.runtime();
        assert_eq!(
            runtime.heap_id(),
            self.callable.heap(),
            "closure '{}' entered through a runtime that does not own its callable",
            self.description
        );

        if runtime.is_collecting() {
            warn!(
                target: "tern::closure",
                closure = %self.description,
                "attempted to call into script during garbage collection"
            );
            return Err(ClosureError::Collecting {
                description: self.description.clone(),
            });
        }
        if !runtime.is_alive(self.callable) {
            return Err(ClosureError::CallableCollected {
                description: self.description.clone(),
            });
        }

        trace!(
            target: "tern::closure",
            closure = %self.description,
            args = args.len(),
            depth = runtime.call_depth(),
            "invoking closure"
        );

        let saved = runtime.save_exception_state();
        match context.call(&Value::object(self.callable), this, args) {
            Ok(value) => {
                saved.restore();
                Ok(value)
            }
            Err(VmError::ContextDestroyed) => Err(ClosureError::ContextDestroyed),
            Err(err) => {
                let message = runtime
                    .pending_exception()
                    .map_or_else(|| err.to_string(), |exception| exception.to_string());
                // The new exception stays pending over the saved one.
                drop(saved);
                Err(ClosureError::Exception {
                    description: self.description.clone(),
                    message,
                })
            }
        }
    }
}

/// A script callable wrapped in a host closure
#[derive(Clone)]
pub struct ScriptClosure {
    host: HostClosure,
    inner: Rc<ClosureInner>,
}

/// Wrap `callable` as a host closure owned by `context`.
///
/// With `root_function` set the callable is rooted until the closure is
/// invalidated. The closure is invalidated when the context is torn down,
/// when [`ScriptClosure::invalidate`] (or [`HostClosure::invalidate`]) is
/// called, or when the last host reference is dropped.
pub fn create(
    context: &Rc<Context>,
    callable: &Value,
    description: impl Into<String>,
    root_function: bool,
) -> ClosureResult<ScriptClosure> {
    let description = description.into();
    if !context.is_alive() {
        return Err(ClosureError::ContextDestroyed);
    }

    let runtime = context.runtime();
    if callable.is_object() && !runtime.owns(callable) {
        return Err(ClosureError::ForeignCallable {
            callable: callable.to_string(),
            runtime: runtime.id(),
        });
    }
    let target = callable
        .as_gc_ref()
        .filter(|_| runtime.is_function(callable))
        .ok_or_else(|| ClosureError::NotCallable(callable.to_string()))?;

    let rooting = RootingPolicy::from(root_function);
    let inner = Rc::new(ClosureInner {
        runtime_id: runtime.id(),
        context_id: context.id(),
        runtime: Rc::downgrade(runtime),
        context: Rc::downgrade(context),
        callable: target,
        rooting,
        description,
        validity: Cell::new(Validity::Valid),
        root: Cell::new(None),
        notifier: Cell::new(None),
    });

    let marshal_inner = Rc::clone(&inner);
    let host = HostClosure::with_data(inner.clone(), move |_, params| {
        marshal(&marshal_inner, params)
    });

    let on_invalidate = Rc::clone(&inner);
    host.add_invalidate_notifier(move |_| on_invalidate.invalidate());
    let on_finalize = Rc::clone(&inner);
    host.add_finalize_notifier(move || on_finalize.invalidate());

    let weak_host = host.downgrade();
    let notifier = context
        .register_teardown(move |_| {
            if let Some(host) = weak_host.upgrade() {
                host.invalidate();
            }
        })
        .map_err(|err| match err {
            VmError::ContextDestroyed => ClosureError::ContextDestroyed,
            other => ClosureError::Vm(other),
        })?;
    inner.notifier.set(Some(notifier));

    if rooting == RootingPolicy::Rooted {
        runtime.add_root(target);
        inner.root.set(Some(target));
    }

    debug!(
        target: "tern::closure",
        closure = %inner.description,
        context = %inner.context_id,
        ?rooting,
        "closure created"
    );

    Ok(ScriptClosure { host, inner })
}

/// Host entry point: `this` is `undefined` and failures are reported here,
/// since the host caller has nowhere to receive them.
fn marshal(inner: &ClosureInner, params: &[Value]) -> Option<Value> {
    match inner.invoke(&Value::undefined(), params) {
        Ok(value) => Some(value),
        Err(err) => {
            if err.is_exception() {
                if let Some(runtime) = inner.runtime.upgrade() {
                    log_pending_exception(&runtime, &inner.description);
                }
            } else {
                debug!(
                    target: "tern::closure",
                    closure = %inner.description,
                    %err,
                    "host invocation failed"
                );
            }
            None
        }
    }
}

impl ScriptClosure {
    /// Same as [`create`]
    pub fn new(
        context: &Rc<Context>,
        callable: &Value,
        description: impl Into<String>,
        root_function: bool,
    ) -> ClosureResult<Self> {
        create(context, callable, description, root_function)
    }

    /// The script closure embedded in `host`, if it wraps one
    pub fn from_host(host: &HostClosure) -> Option<Self> {
        host.data::<ClosureInner>().map(|inner| Self {
            host: host.clone(),
            inner,
        })
    }

    /// Call the callable with `this` and `args`.
    ///
    /// A thrown exception is left pending on the runtime. An exception that
    /// was already pending is kept aside during the call and restored after
    /// it, unless the call throws a new one.
    pub fn invoke(&self, this: &Value, args: &[Value]) -> ClosureResult<Value> {
        self.inner.invoke(this, args)
    }

    /// Make the closure permanently inert. Idempotent.
    pub fn invalidate(&self) {
        self.host.invalidate();
    }

    /// Report the callable to the collector while the closure is valid and
    /// rooted
    pub fn trace(&self, tracer: &mut dyn Tracer) {
        if self.inner.is_valid() && self.inner.rooting == RootingPolicy::Rooted {
            tracer.mark(self.inner.callable);
        }
    }

    /// Runtime the callable belongs to
    pub fn runtime_id(&self) -> RuntimeId {
        self.inner.runtime_id
    }

    /// Context the closure is registered with
    pub fn context_id(&self) -> ContextId {
        self.inner.context_id
    }

    /// The owning context, if it has not been dropped
    pub fn context(&self) -> Option<Rc<Context>> {
        self.inner.context.upgrade()
    }

    /// The wrapped callable; `None` once invalidated
    pub fn callable(&self) -> Option<Value> {
        self.inner
            .is_valid()
            .then(|| Value::object(self.inner.callable))
    }

    /// Whether the closure can still run its callable
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// Diagnostic label
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Rooting policy fixed at creation
    pub fn rooting(&self) -> RootingPolicy {
        self.inner.rooting
    }

    /// The host closure
    pub fn host(&self) -> &HostClosure {
        &self.host
    }

    /// Convert into the host closure
    pub fn into_host(self) -> HostClosure {
        self.host
    }
}

impl From<ScriptClosure> for HostClosure {
    fn from(closure: ScriptClosure) -> Self {
        closure.into_host()
    }
}

impl fmt::Debug for ScriptClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptClosure")
            .field("description", &self.inner.description)
            .field("context", &self.inner.context_id)
            .field("rooting", &self.inner.rooting)
            .field("validity", &self.inner.validity.get())
            .finish()
    }
}
