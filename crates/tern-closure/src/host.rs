//! Refcounted host closures
//!
//! [`HostClosure`] is the callback object the host side passes around and
//! stores. Cloning takes a reference; dropping the last reference finalizes
//! it. A closure can be invalidated at any time, after which invoking it does
//! nothing. Whatever is wrapped inside learns about both events through
//! notifiers.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tern_vm::Value;

type Marshal = Box<dyn Fn(&HostClosure, &[Value]) -> Option<Value>>;
type InvalidateNotifier = Box<dyn FnOnce(&HostClosure)>;
type FinalizeNotifier = Box<dyn FnOnce()>;

struct Inner {
    marshal: Marshal,
    invalid: Cell<bool>,
    invalidate_notifiers: RefCell<Vec<InvalidateNotifier>>,
    finalize_notifiers: RefCell<Vec<FinalizeNotifier>>,
    data: Option<Rc<dyn Any>>,
}

/// A refcounted host-side callback
#[derive(Clone)]
pub struct HostClosure {
    inner: Rc<Inner>,
}

impl HostClosure {
    /// Create a closure around a marshal function
    pub fn new<F>(marshal: F) -> Self
    where
        F: Fn(&HostClosure, &[Value]) -> Option<Value> + 'static,
    {
        Self::build(None, Box::new(marshal))
    }

    /// Create a closure carrying opaque data, retrievable with
    /// [`data`](Self::data)
    pub fn with_data<F>(data: Rc<dyn Any>, marshal: F) -> Self
    where
        F: Fn(&HostClosure, &[Value]) -> Option<Value> + 'static,
    {
        Self::build(Some(data), Box::new(marshal))
    }

    fn build(data: Option<Rc<dyn Any>>, marshal: Marshal) -> Self {
        Self {
            inner: Rc::new(Inner {
                marshal,
                invalid: Cell::new(false),
                invalidate_notifiers: RefCell::new(Vec::new()),
                finalize_notifiers: RefCell::new(Vec::new()),
                data,
            }),
        }
    }

    /// Run the marshal function, or return `None` without running it once
    /// the closure is invalid
    pub fn invoke(&self, params: &[Value]) -> Option<Value> {
        if self.inner.invalid.get() {
            return None;
        }
        (self.inner.marshal)(self, params)
    }

    /// Mark the closure invalid and run its invalidate notifiers. Idempotent.
    pub fn invalidate(&self) {
        if self.inner.invalid.replace(true) {
            return;
        }
        let notifiers = std::mem::take(&mut *self.inner.invalidate_notifiers.borrow_mut());
        for notifier in notifiers {
            notifier(self);
        }
    }

    /// Whether [`invalidate`](Self::invalidate) has run
    pub fn is_invalid(&self) -> bool {
        self.inner.invalid.get()
    }

    /// Run `notifier` on the first invalidation.
    ///
    /// Ignored when the closure is already invalid.
    pub fn add_invalidate_notifier<F>(&self, notifier: F)
    where
        F: FnOnce(&HostClosure) + 'static,
    {
        if self.inner.invalid.get() {
            return;
        }
        self.inner
            .invalidate_notifiers
            .borrow_mut()
            .push(Box::new(notifier));
    }

    /// Run `notifier` when the last strong reference is dropped
    pub fn add_finalize_notifier<F>(&self, notifier: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner
            .finalize_notifiers
            .borrow_mut()
            .push(Box::new(notifier));
    }

    /// Number of strong references
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Create a weak handle that does not keep the closure alive
    pub fn downgrade(&self) -> WeakHostClosure {
        WeakHostClosure {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The attached data, if it is a `T`
    pub fn data<T: Any>(&self) -> Option<Rc<T>> {
        self.inner.data.clone()?.downcast::<T>().ok()
    }

    /// Whether both handles refer to the same closure
    pub fn ptr_eq(&self, other: &HostClosure) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for HostClosure {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) != 1 {
            return;
        }
        // Last reference: invalidate first, then finalize, unless an
        // invalidate notifier took a new reference.
        self.invalidate();
        if Rc::strong_count(&self.inner) == 1 {
            let notifiers = std::mem::take(&mut *self.inner.finalize_notifiers.borrow_mut());
            for notifier in notifiers {
                notifier();
            }
        }
    }
}

impl fmt::Debug for HostClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClosure")
            .field("ref_count", &self.ref_count())
            .field("invalid", &self.is_invalid())
            .finish()
    }
}

/// Weak handle to a [`HostClosure`]
#[derive(Clone)]
pub struct WeakHostClosure {
    inner: Weak<Inner>,
}

impl WeakHostClosure {
    /// Take a strong reference if the closure is still alive
    pub fn upgrade(&self) -> Option<HostClosure> {
        self.inner.upgrade().map(|inner| HostClosure { inner })
    }
}

impl fmt::Debug for WeakHostClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHostClosure")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_closure(count: &Rc<Cell<usize>>) -> HostClosure {
        let count = Rc::clone(count);
        HostClosure::new(move |_, params| {
            count.set(count.get() + 1);
            params.first().cloned()
        })
    }

    #[test]
    fn test_invoke_until_invalidated() {
        let count = Rc::new(Cell::new(0));
        let closure = counting_closure(&count);

        assert_eq!(closure.invoke(&[Value::int32(1)]), Some(Value::int32(1)));
        closure.invalidate();
        assert_eq!(closure.invoke(&[Value::int32(1)]), None);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_invalidate_notifiers_run_once() {
        let runs = Rc::new(Cell::new(0));
        let closure = HostClosure::new(|_, _| None);
        let runs_in = Rc::clone(&runs);
        closure.add_invalidate_notifier(move |closure| {
            assert!(closure.is_invalid());
            runs_in.set(runs_in.get() + 1);
        });

        closure.invalidate();
        closure.invalidate();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_last_drop_invalidates_then_finalizes() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let closure = HostClosure::new(|_, _| None);
        let extra = closure.clone();
        assert_eq!(closure.ref_count(), 2);

        let log = Rc::clone(&order);
        closure.add_invalidate_notifier(move |_| log.borrow_mut().push("invalidate"));
        let log = Rc::clone(&order);
        closure.add_finalize_notifier(move || log.borrow_mut().push("finalize"));

        drop(extra);
        assert!(order.borrow().is_empty());

        let weak = closure.downgrade();
        drop(closure);
        assert_eq!(*order.borrow(), vec!["invalidate", "finalize"]);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_finalize_after_explicit_invalidate() {
        let finalized = Rc::new(Cell::new(false));
        let closure = HostClosure::new(|_, _| None);
        let finalized_in = Rc::clone(&finalized);
        closure.add_finalize_notifier(move || finalized_in.set(true));

        closure.invalidate();
        assert!(!finalized.get());
        drop(closure);
        assert!(finalized.get());
    }

    #[test]
    fn test_data_downcast() {
        let closure = HostClosure::with_data(Rc::new(7u32), |closure, _| {
            closure.data::<u32>().map(|n| Value::number(f64::from(*n)))
        });
        assert_eq!(closure.data::<u32>().as_deref(), Some(&7));
        assert!(closure.data::<String>().is_none());
        assert_eq!(closure.invoke(&[]), Some(Value::int32(7)));
    }

    #[test]
    fn test_ptr_eq_tracks_identity() {
        let closure = HostClosure::new(|_, _| None);
        let same = closure.clone();
        let other = HostClosure::new(|_, _| None);
        assert!(closure.ptr_eq(&same));
        assert!(!closure.ptr_eq(&other));
        assert!(closure.downgrade().upgrade().is_some_and(|c| c.ptr_eq(&closure)));
    }
}
