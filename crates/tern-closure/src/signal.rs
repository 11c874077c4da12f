//! Signals: host-side holders of connected closures
//!
//! A signal owns one reference to every connected closure. Disconnecting a
//! handler invalidates it, and dropping the signal disconnects everything.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tern_vm::{Runtime, TracerId, Tracer, Value};
use tracing::{debug, trace};

use crate::closure::ScriptClosure;
use crate::host::HostClosure;

/// Handle for a connected handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A named event with connected handlers
pub struct Signal {
    name: String,
    handlers: RefCell<IndexMap<HandlerId, HostClosure>>,
    next_id: Cell<u64>,
    /// Extra-roots tracers registered on behalf of this signal
    tracers: RefCell<Vec<(Weak<Runtime>, TracerId)>>,
}

impl Signal {
    /// Create a signal with no handlers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RefCell::new(IndexMap::new()),
            next_id: Cell::new(1),
            tracers: RefCell::new(Vec::new()),
        }
    }

    /// Signal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect a handler; it runs on every emission until disconnected
    pub fn connect(&self, closure: impl Into<HostClosure>) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().insert(id, closure.into());
        trace!(target: "tern::signal", signal = %self.name, handler = id.0, "handler connected");
        id
    }

    /// Disconnect and invalidate a handler
    pub fn disconnect(&self, id: HandlerId) -> bool {
        let removed = self.handlers.borrow_mut().shift_remove(&id);
        match removed {
            Some(closure) => {
                closure.invalidate();
                trace!(
                    target: "tern::signal",
                    signal = %self.name,
                    handler = id.0,
                    "handler disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Disconnect and invalidate every handler
    pub fn disconnect_all(&self) {
        let handlers = std::mem::take(&mut *self.handlers.borrow_mut());
        if handlers.is_empty() {
            return;
        }
        debug!(
            target: "tern::signal",
            signal = %self.name,
            handlers = handlers.len(),
            "disconnecting all handlers"
        );
        for closure in handlers.into_values() {
            closure.invalidate();
        }
    }

    /// Whether `id` is still connected
    pub fn is_connected(&self, id: HandlerId) -> bool {
        self.handlers.borrow().contains_key(&id)
    }

    /// Number of connected handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Invoke every handler connected at the time of the call, in connection
    /// order, returning the last value produced.
    ///
    /// Handlers may connect or disconnect handlers while the signal is
    /// emitting. A handler disconnected during the emission is skipped; one
    /// connected during it first runs on the next emission.
    pub fn emit(&self, args: &[Value]) -> Option<Value> {
        let snapshot: Vec<(HandlerId, HostClosure)> = self
            .handlers
            .borrow()
            .iter()
            .map(|(id, closure)| (*id, closure.clone()))
            .collect();
        trace!(
            target: "tern::signal",
            signal = %self.name,
            handlers = snapshot.len(),
            "emitting"
        );

        let mut last = None;
        for (id, closure) in snapshot {
            if !self.is_connected(id) {
                continue;
            }
            if let Some(value) = closure.invoke(args) {
                last = Some(value);
            }
        }
        last
    }

    /// Report the callables of connected script closures
    pub fn trace(&self, tracer: &mut dyn Tracer) {
        for closure in self.handlers.borrow().values() {
            if let Some(script) = ScriptClosure::from_host(closure) {
                script.trace(tracer);
            }
        }
    }

    /// Trace this signal on every collection of `runtime` for as long as the
    /// signal is alive. The tracer is unregistered when the signal drops.
    pub fn register_tracer(self: &Rc<Self>, runtime: &Rc<Runtime>) -> TracerId {
        let signal = Rc::downgrade(self);
        let id = runtime.add_extra_roots_tracer(move |tracer| {
            if let Some(signal) = signal.upgrade() {
                signal.trace(tracer);
            }
        });
        self.tracers.borrow_mut().push((Rc::downgrade(runtime), id));
        id
    }

    /// Remove every tracer registered through [`Signal::register_tracer`]
    pub fn unregister_tracers(&self) {
        let tracers = std::mem::take(&mut *self.tracers.borrow_mut());
        for (runtime, id) in tracers {
            if let Some(runtime) = runtime.upgrade() {
                runtime.remove_extra_roots_tracer(id);
            }
        }
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        self.unregister_tracers();
        self.disconnect_all();
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> HostClosure {
        let log = Rc::clone(log);
        HostClosure::new(move |_, _| {
            log.borrow_mut().push(label);
            Some(Value::string(label))
        })
    }

    #[test]
    fn test_emit_in_connection_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Signal::new("changed");
        signal.connect(recording(&log, "a"));
        signal.connect(recording(&log, "b"));

        assert_eq!(signal.emit(&[]), Some(Value::string("b")));
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_disconnect_invalidates() {
        let signal = Signal::new("changed");
        let closure = HostClosure::new(|_, _| None);
        let id = signal.connect(closure.clone());

        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert!(closure.is_invalid());
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_drop_invalidates_handlers() {
        let closure = HostClosure::new(|_, _| None);
        {
            let signal = Signal::new("changed");
            signal.connect(closure.clone());
        }
        assert!(closure.is_invalid());
        assert_eq!(closure.ref_count(), 1);
    }

    #[test]
    fn test_dropped_signals_release_their_tracers() {
        let runtime = Runtime::new();
        for i in 0..100 {
            let signal = Rc::new(Signal::new(format!("changed-{i}")));
            signal.register_tracer(&runtime);
            assert_eq!(runtime.extra_roots_tracer_count(), 1);
        }
        assert_eq!(runtime.extra_roots_tracer_count(), 0);

        let kept = Rc::new(Signal::new("kept"));
        kept.register_tracer(&runtime);
        kept.register_tracer(&runtime);
        assert_eq!(runtime.extra_roots_tracer_count(), 2);
        kept.unregister_tracers();
        assert_eq!(runtime.extra_roots_tracer_count(), 0);
    }

    #[test]
    fn test_signal_outliving_runtime_drops_cleanly() {
        let signal = Rc::new(Signal::new("changed"));
        {
            let runtime = Runtime::new();
            signal.register_tracer(&runtime);
        }
        drop(signal);
    }

    #[test]
    fn test_reentrant_disconnect_skips_later_handler() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Rc::new(Signal::new("changed"));
        let victim = Rc::new(Cell::new(None));

        let weak = Rc::downgrade(&signal);
        let victim_in = Rc::clone(&victim);
        signal.connect(HostClosure::new(move |_, _| {
            if let (Some(signal), Some(id)) = (weak.upgrade(), victim_in.get()) {
                signal.disconnect(id);
            }
            None
        }));
        victim.set(Some(signal.connect(recording(&log, "victim"))));

        signal.emit(&[]);
        assert!(log.borrow().is_empty());
        assert_eq!(signal.handler_count(), 1);
    }
}
