//! GC object handles

use std::fmt;

/// Handle to a GC-managed object.
///
/// A handle is the id of the registry that allocated it, an index into that
/// registry, and the generation the slot had when the object was allocated.
/// Once the object is swept the slot generation moves on, so an old handle
/// can never observe a newer object. A handle from another registry never
/// resolves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    heap: HeapId,
    index: u32,
    generation: u32,
}

impl GcRef {
    pub(crate) const fn new(heap: HeapId, index: u32, generation: u32) -> Self {
        Self {
            heap,
            index,
            generation,
        }
    }

    /// Registry that allocated the object
    pub const fn heap(self) -> HeapId {
        self.heap
    }

    /// Slot index
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({}#{}@{})", self.heap.0, self.index, self.generation)
    }
}

impl fmt::Display for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Identity of an allocation registry, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub(crate) u32);

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap#{}", self.0)
    }
}

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_identity() {
        let a = GcRef::new(HeapId(1), 3, 0);
        let b = GcRef::new(HeapId(1), 3, 1);
        let c = GcRef::new(HeapId(2), 3, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.index(), b.index());
        assert_eq!(format!("{}", b), "#3@1");
        assert_eq!(format!("{:?}", c), "GcRef(2#3@0)");
    }
}
