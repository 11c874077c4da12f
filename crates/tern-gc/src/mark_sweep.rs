//! Stop-the-world Mark/Sweep Garbage Collector
//!
//! ## Design
//!
//! - **Slot Allocation**: Objects live in a `Vec` of slots; freed slots are
//!   reused through a free list and bump their generation
//! - **Tri-color Marking**: White/gray/black marking with a gray worklist
//! - **Deferred Drop**: `collect` returns the swept values instead of dropping
//!   them in place. Destructors of swept values may call back into whatever
//!   owns the registry, so they must run after the registry borrow ends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::error::{GcError, GcResult};
use crate::heap::GcConfig;
use crate::object::{GcRef, HeapId, MarkColor};

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Trait for types that can be traced by the GC
pub trait GcTraceable {
    /// Whether this type contains GC references that need tracing
    const NEEDS_TRACE: bool;

    /// Trace all GC references in this value
    fn trace(&self, tracer: &mut dyn FnMut(GcRef));
}

impl GcTraceable for () {
    const NEEDS_TRACE: bool = false;
    fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
}

impl GcTraceable for i32 {
    const NEEDS_TRACE: bool = false;
    fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
}

impl GcTraceable for f64 {
    const NEEDS_TRACE: bool = false;
    fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
}

impl GcTraceable for String {
    const NEEDS_TRACE: bool = false;
    fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
}

struct Slot<T> {
    generation: u32,
    mark: MarkColor,
    value: Option<T>,
}

/// Registry statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of live objects
    pub allocation_count: usize,
    /// Number of collections performed
    pub collection_count: usize,
    /// Objects reclaimed by the last collection
    pub last_reclaimed: usize,
    /// Objects marked by the last collection
    pub last_marked: usize,
    /// Total pause time across all collections
    pub total_pause_time: Duration,
    /// Pause time of the last collection
    pub last_pause_time: Duration,
}

/// Central registry tracking all GC-managed allocations.
pub struct AllocationRegistry<T> {
    heap: HeapId,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    max_objects: usize,
    stats: RegistryStats,
}

impl<T: GcTraceable> AllocationRegistry<T> {
    /// Create a new allocation registry
    pub fn new() -> Self {
        Self::with_config(&GcConfig::default())
    }

    /// Create a registry from a GC configuration
    pub fn with_config(config: &GcConfig) -> Self {
        Self {
            heap: HeapId(NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed)),
            slots: Vec::with_capacity(config.initial_capacity),
            free: Vec::new(),
            live: 0,
            max_objects: config.max_objects,
            stats: RegistryStats::default(),
        }
    }

    /// Allocate a new object.
    ///
    /// Fails with [`GcError::HeapExhausted`] once `max_objects` objects are
    /// live. The caller may collect and retry.
    pub fn allocate(&mut self, value: T) -> GcResult<GcRef> {
        if self.live >= self.max_objects {
            return Err(GcError::HeapExhausted {
                limit: self.max_objects,
            });
        }

        let gc_ref = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.mark = MarkColor::White;
                slot.value = Some(value);
                GcRef::new(self.heap, index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    mark: MarkColor::White,
                    value: Some(value),
                });
                GcRef::new(self.heap, index, 0)
            }
        };
        self.live += 1;
        Ok(gc_ref)
    }

    /// Identity of this registry, carried by every handle it allocates
    pub fn heap_id(&self) -> HeapId {
        self.heap
    }

    /// Whether `gc_ref` was allocated by this registry, live or not
    pub fn owns(&self, gc_ref: GcRef) -> bool {
        gc_ref.heap() == self.heap
    }

    fn slot(&self, gc_ref: GcRef) -> Option<&Slot<T>> {
        if !self.owns(gc_ref) {
            return None;
        }
        self.slots
            .get(gc_ref.index() as usize)
            .filter(|slot| slot.generation == gc_ref.generation() && slot.value.is_some())
    }

    /// Get the object behind `gc_ref`, if it has not been collected
    pub fn get(&self, gc_ref: GcRef) -> Option<&T> {
        self.slot(gc_ref).and_then(|slot| slot.value.as_ref())
    }

    /// Get the object behind `gc_ref` mutably
    pub fn get_mut(&mut self, gc_ref: GcRef) -> Option<&mut T> {
        if !self.owns(gc_ref) {
            return None;
        }
        self.slots
            .get_mut(gc_ref.index() as usize)
            .filter(|slot| slot.generation == gc_ref.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `gc_ref` still points at a live object
    pub fn is_alive(&self, gc_ref: GcRef) -> bool {
        self.slot(gc_ref).is_some()
    }

    /// Get the number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.live
    }

    /// Get collection statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            allocation_count: self.live,
            ..self.stats.clone()
        }
    }

    /// Perform a full mark/sweep collection.
    ///
    /// Returns the reclaimed values. Dropping them is the caller's job.
    pub fn collect(&mut self, roots: &[GcRef]) -> Vec<T> {
        let start = Instant::now();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "tern::gc",
            roots = roots.len(),
            objects = self.live,
            "GC cycle starting"
        );

        // Phase 1: Reset all marks to white
        for slot in &mut self.slots {
            slot.mark = MarkColor::White;
        }

        // Phase 2: Mark from roots
        let marked = self.mark(roots);

        // Phase 3: Sweep unmarked objects
        let reclaimed = self.sweep();

        let elapsed = start.elapsed();
        self.stats.collection_count += 1;
        self.stats.last_reclaimed = reclaimed.len();
        self.stats.last_marked = marked;
        self.stats.total_pause_time += elapsed;
        self.stats.last_pause_time = elapsed;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "tern::gc",
            collection = self.stats.collection_count,
            freed_objects = reclaimed.len(),
            live_objects = self.live,
            pause_us = elapsed.as_micros() as u64,
            "GC cycle complete"
        );

        reclaimed
    }

    fn shade(&mut self, gc_ref: GcRef, worklist: &mut VecDeque<GcRef>) {
        if self.owns(gc_ref)
            && let Some(slot) = self.slots.get_mut(gc_ref.index() as usize)
            && slot.generation == gc_ref.generation()
            && slot.value.is_some()
            && slot.mark == MarkColor::White
        {
            slot.mark = MarkColor::Gray;
            worklist.push_back(gc_ref);
        }
    }

    fn mark(&mut self, roots: &[GcRef]) -> usize {
        let mut worklist = VecDeque::with_capacity(roots.len());
        let mut children = Vec::new();
        let mut marked = 0;

        for &root in roots {
            self.shade(root, &mut worklist);
        }

        while let Some(gray) = worklist.pop_front() {
            if T::NEEDS_TRACE
                && let Some(value) = self.get(gray)
            {
                value.trace(&mut |child| children.push(child));
            }
            for child in children.drain(..) {
                self.shade(child, &mut worklist);
            }
            self.slots[gray.index() as usize].mark = MarkColor::Black;
            marked += 1;
        }

        marked
    }

    fn sweep(&mut self) -> Vec<T> {
        let mut reclaimed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.mark != MarkColor::White {
                continue;
            }
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                reclaimed.push(value);
            }
        }
        self.live -= reclaimed.len();
        reclaimed
    }
}

impl<T: GcTraceable> Default for AllocationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
