//! GC correctness tests
//!
//! These tests verify that the stop-the-world mark/sweep garbage collector
//! correctly handles various scenarios.

use tern_gc::{AllocationRegistry, GcRef, GcTraceable, RootSet};

/// Simple test object for GC testing
struct TestObject {
    value: i32,
    /// Optional reference to another object
    reference: Option<GcRef>,
}

impl GcTraceable for TestObject {
    const NEEDS_TRACE: bool = true;

    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        if let Some(target) = self.reference {
            tracer(target);
        }
    }
}

fn leaf(value: i32) -> TestObject {
    TestObject {
        value,
        reference: None,
    }
}

#[test]
fn test_collect_simple_garbage() {
    let mut registry = AllocationRegistry::new();
    registry.allocate(leaf(42)).unwrap();
    assert_eq!(registry.allocation_count(), 1);

    let reclaimed = registry.collect(&[]);
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].value, 42);
    assert_eq!(registry.allocation_count(), 0);
}

#[test]
fn test_circular_references_collected() {
    let mut registry = AllocationRegistry::new();
    let first = registry.allocate(leaf(1)).unwrap();
    let second = registry
        .allocate(TestObject {
            value: 2,
            reference: Some(first),
        })
        .unwrap();
    registry.get_mut(first).unwrap().reference = Some(second);

    let reclaimed = registry.collect(&[]);
    assert_eq!(reclaimed.len(), 2);
    assert!(!registry.is_alive(first));
    assert!(!registry.is_alive(second));
}

#[test]
fn test_reachable_chain_survives() {
    let mut registry = AllocationRegistry::new();
    let tail = registry.allocate(leaf(3)).unwrap();
    let middle = registry
        .allocate(TestObject {
            value: 2,
            reference: Some(tail),
        })
        .unwrap();
    let head = registry
        .allocate(TestObject {
            value: 1,
            reference: Some(middle),
        })
        .unwrap();
    let garbage = registry.allocate(leaf(99)).unwrap();

    let reclaimed = registry.collect(&[head]);
    assert_eq!(reclaimed.len(), 1);
    assert!(registry.is_alive(tail));
    assert!(!registry.is_alive(garbage));
    assert_eq!(registry.stats().last_marked, 3);
}

#[test]
fn test_root_set_drives_collection() {
    let mut registry = AllocationRegistry::new();
    let mut roots = RootSet::new();
    let target = registry.allocate(leaf(7)).unwrap();

    roots.add(target);
    let live: Vec<GcRef> = roots.iter().collect();
    assert!(registry.collect(&live).is_empty());
    assert!(registry.is_alive(target));

    roots.remove(target).unwrap();
    let live: Vec<GcRef> = roots.iter().collect();
    assert_eq!(registry.collect(&live).len(), 1);
    assert!(!registry.is_alive(target));
}

#[test]
fn test_multiple_collections_accumulate_stats() {
    let mut registry = AllocationRegistry::new();
    for round in 0..3 {
        registry.allocate(leaf(round)).unwrap();
        registry.collect(&[]);
    }
    let stats = registry.stats();
    assert_eq!(stats.collection_count, 3);
    assert_eq!(stats.last_reclaimed, 1);
    assert_eq!(stats.allocation_count, 0);
}
