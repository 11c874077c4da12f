//! Integration tests for collection across contexts, calls and captures

use std::cell::Cell;
use std::rc::Rc;

use tern_vm::{Context, JsFunction, Runtime, Value, VmError};

#[test]
fn test_function_captures_are_traced() {
    let runtime = Runtime::new();
    let context = Context::new(&runtime).unwrap();
    let captured = runtime.alloc_object().unwrap();
    runtime
        .set_property(&captured, "answer", Value::int32(42))
        .unwrap();

    let getter = runtime
        .alloc_function(
            JsFunction::new("getter", |args| {
                let target = args.capture(0);
                Ok(args
                    .runtime()
                    .get_property(&target, "answer")
                    .unwrap_or_default())
            })
            .with_captures(vec![captured.clone()]),
        )
        .unwrap();
    context.set_global("getter", getter.clone()).unwrap();

    runtime.gc();
    assert!(runtime.is_alive(captured.as_gc_ref().unwrap()));
    assert_eq!(
        context.call(&getter, &Value::undefined(), &[]).unwrap(),
        Value::int32(42)
    );

    context.set_global("getter", Value::undefined()).unwrap();
    assert_eq!(runtime.gc(), 2);
    assert!(!runtime.is_alive(captured.as_gc_ref().unwrap()));
}

#[test]
fn test_contexts_share_a_heap() {
    let runtime = Runtime::new();
    let first = Context::new(&runtime).unwrap();
    let second = Context::new(&runtime).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(runtime.context_count(), 2);

    let shared = runtime.alloc_object().unwrap();
    first.set_global("shared", shared.clone()).unwrap();
    second.set_global("shared", shared.clone()).unwrap();

    first.destroy();
    runtime.gc();
    assert!(runtime.is_alive(shared.as_gc_ref().unwrap()));

    second.destroy();
    runtime.gc();
    assert!(!runtime.is_alive(shared.as_gc_ref().unwrap()));
    assert_eq!(runtime.context_count(), 0);
}

#[test]
fn test_teardown_notifier_can_still_read_globals() {
    let runtime = Runtime::new();
    let context = Context::new(&runtime).unwrap();
    context.set_global("flag", Value::boolean(true)).unwrap();

    let seen = Rc::new(Cell::new(false));
    let seen_in = Rc::clone(&seen);
    context
        .register_teardown(move |ctx| {
            seen_in.set(ctx.get_global("flag") == Some(Value::boolean(true)));
        })
        .unwrap();

    drop(context);
    assert!(seen.get());
}

#[test]
fn test_error_in_nested_call_unwinds_depth() {
    let runtime = Runtime::new();
    let context = Context::new(&runtime).unwrap();
    let failing = runtime
        .new_function("failing", |_| Err(VmError::range_error("bad length")))
        .unwrap();
    context.set_global("failing", failing).unwrap();
    let caller = runtime
        .new_function("caller", |args| {
            let context = args.context();
            let callee = context.get_global("failing").unwrap_or_default();
            context.call(&callee, &Value::undefined(), &[])
        })
        .unwrap();

    let err = context.call(&caller, &Value::undefined(), &[]).unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)));
    assert_eq!(
        runtime.take_pending_exception(),
        Some(Value::string("RangeError: bad length"))
    );
    assert_eq!(runtime.call_depth(), 0);
    assert_eq!(runtime.scope_depth(), 0);
}
