//! Frame ID allocation over the cyclic `1..=255` space.

use crate::error::{Error, Result};
use crate::types::FrameId;

/// Hands out frame IDs round-robin, skipping identifiers still in flight.
///
/// The cursor advances on every probe so that a freed identifier is not
/// immediately handed out again while older ones are available.
#[derive(Debug, Clone)]
pub struct FrameIdAllocator {
    cursor: u8,
}

impl FrameIdAllocator {
    /// Create an allocator whose first identifier is 1.
    pub fn new() -> Self {
        FrameIdAllocator {
            cursor: FrameId::MIN.get(),
        }
    }

    /// Allocate the next identifier for which `in_use` returns `false`.
    ///
    /// Fails with [`Error::CapacityExceeded`] when every identifier in the
    /// space is outstanding. Never returns [`FrameId::NONE`].
    pub fn allocate(&mut self, in_use: impl Fn(FrameId) -> bool) -> Result<FrameId> {
        for _ in 0..FrameId::SPACE {
            let candidate = FrameId(self.cursor);
            self.cursor = if self.cursor == FrameId::MAX.get() {
                FrameId::MIN.get()
            } else {
                self.cursor + 1
            };
            if !in_use(candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::CapacityExceeded)
    }

    /// The identifier the next call to [`allocate`](Self::allocate) probes first.
    pub fn peek(&self) -> FrameId {
        FrameId(self.cursor)
    }
}

impl Default for FrameIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn starts_at_one_and_increments() {
        let mut alloc = FrameIdAllocator::new();
        assert_eq!(alloc.allocate(|_| false).unwrap(), FrameId(1));
        assert_eq!(alloc.allocate(|_| false).unwrap(), FrameId(2));
        assert_eq!(alloc.allocate(|_| false).unwrap(), FrameId(3));
    }

    #[test]
    fn wraps_from_max_to_one_skipping_zero() {
        let mut alloc = FrameIdAllocator::new();
        for _ in 0..254 {
            alloc.allocate(|_| false).unwrap();
        }
        assert_eq!(alloc.allocate(|_| false).unwrap(), FrameId(255));
        assert_eq!(alloc.allocate(|_| false).unwrap(), FrameId(1));
    }

    #[test]
    fn skips_identifiers_in_use() {
        let mut alloc = FrameIdAllocator::new();
        let busy: HashSet<u8> = [1, 2, 4].into_iter().collect();
        assert_eq!(alloc.allocate(|id| busy.contains(&id.get())).unwrap(), FrameId(3));
        assert_eq!(alloc.allocate(|id| busy.contains(&id.get())).unwrap(), FrameId(5));
        assert_eq!(alloc.peek(), FrameId(6));
    }

    #[test]
    fn full_space_is_capacity_error() {
        let mut alloc = FrameIdAllocator::new();
        let result = alloc.allocate(|_| true);
        assert!(matches!(result, Err(Error::CapacityExceeded)));
    }

    #[test]
    fn single_free_identifier_is_found() {
        let mut alloc = FrameIdAllocator::new();
        let id = alloc.allocate(|id| id != FrameId(200)).unwrap();
        assert_eq!(id, FrameId(200));
    }

    #[test]
    fn distinct_until_space_exhausted() {
        let mut alloc = FrameIdAllocator::new();
        let mut held = HashSet::new();
        for _ in 0..FrameId::SPACE {
            let id = alloc.allocate(|id| held.contains(&id)).unwrap();
            assert!(!id.is_none());
            assert!(held.insert(id), "identifier {} handed out twice", id);
        }
        assert!(matches!(
            alloc.allocate(|id| held.contains(&id)),
            Err(Error::CapacityExceeded)
        ));
    }
}
