//! Persistent root set
//!
//! Roots are counted: every `add` must be balanced by exactly one `remove`.
//! A value stays rooted while its count is above zero.

use rustc_hash::FxHashMap;

use crate::error::{GcError, GcResult};
use crate::object::GcRef;

/// Counted set of persistent GC roots
#[derive(Debug, Default)]
pub struct RootSet {
    counts: FxHashMap<GcRef, usize>,
    /// Total `add` calls over the lifetime of the set
    added: u64,
    /// Total successful `remove` calls over the lifetime of the set
    removed: u64,
}

impl RootSet {
    /// Create an empty root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Root `target` once more
    pub fn add(&mut self, target: GcRef) {
        *self.counts.entry(target).or_insert(0) += 1;
        self.added += 1;
    }

    /// Drop one root on `target`
    pub fn remove(&mut self, target: GcRef) -> GcResult<()> {
        let Some(count) = self.counts.get_mut(&target) else {
            return Err(GcError::RootUnderflow(target));
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&target);
        }
        self.removed += 1;
        Ok(())
    }

    /// Number of outstanding roots on `target`
    pub fn count(&self, target: GcRef) -> usize {
        self.counts.get(&target).copied().unwrap_or(0)
    }

    /// Whether `target` has at least one root
    pub fn is_rooted(&self, target: GcRef) -> bool {
        self.counts.contains_key(&target)
    }

    /// Number of distinct rooted objects
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no object is rooted
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Outstanding root operations (`added - removed`)
    pub fn outstanding(&self) -> u64 {
        self.added - self.removed
    }

    /// Distinct rooted objects, for the mark phase
    pub fn iter(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.counts.keys().copied()
    }
}
