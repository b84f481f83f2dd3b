//! Object identifiers.
//!
//! Ids are handed out by an [`IdAllocator`] owned by whoever registers the
//! objects. There is no process-wide counter: two allocators produce
//! independent, deterministic sequences.

use crate::error::{Error, Result};

/// Identifier of a renderable object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Raw id value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id allocator.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Create an allocator starting at id 0.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Create an allocator whose first id is `first`.
    pub const fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> Result<ObjectId> {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .ok_or_else(|| Error::Exhausted("object ids".to_string()))?;
        Ok(ObjectId(id))
    }

    /// Number of ids handed out so far (relative to the starting id).
    pub const fn peek(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate().unwrap(), ObjectId(0));
        assert_eq!(ids.allocate().unwrap(), ObjectId(1));
        assert_eq!(ids.allocate().unwrap(), ObjectId(2));
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn allocators_are_independent() {
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();
        a.allocate().unwrap();
        a.allocate().unwrap();
        assert_eq!(b.allocate().unwrap(), ObjectId(0));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut ids = IdAllocator::starting_at(u32::MAX);
        assert!(matches!(ids.allocate(), Err(Error::Exhausted(_))));
    }
}
