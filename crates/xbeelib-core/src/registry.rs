//! The pending-request registry.
//!
//! Single source of truth for which frame IDs are outstanding. Every exit
//! path (response, timeout, write failure, close) goes through
//! [`Registry::take`] or [`Registry::remove_all`], so whichever path runs
//! first owns the request and every later path finds nothing.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::completion::Completion;
use crate::scheduler::TimerHandle;
use crate::types::FrameId;

/// One outstanding correlated request.
#[derive(Debug)]
pub struct PendingRequest<T> {
    /// Identifier the request was sent with.
    pub frame_id: FrameId,
    /// Completion handle for the caller's future.
    pub completion: Completion<T>,
    /// When the request was issued.
    pub issued_at: Instant,
    /// When the request times out.
    pub deadline: Instant,
    /// The scheduled timeout.
    pub timer: TimerHandle,
}

/// Map from frame ID to its pending request.
#[derive(Debug)]
pub struct Registry<T> {
    entries: HashMap<FrameId, PendingRequest<T>>,
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Registry {
            entries: HashMap::new(),
        }
    }

    /// Register a pending request under its frame ID.
    ///
    /// The caller guarantees the identifier is free; the allocator probes
    /// [`contains`](Self::contains) before handing one out. Returns the
    /// displaced entry if that guarantee was broken.
    pub fn register(&mut self, pending: PendingRequest<T>) -> Option<PendingRequest<T>> {
        let displaced = self.entries.insert(pending.frame_id, pending);
        if let Some(ref old) = displaced {
            tracing::warn!(frame_id = %old.frame_id, "pending request displaced in registry");
        }
        displaced
    }

    /// Remove and return the request for `frame_id`, if any.
    pub fn take(&mut self, frame_id: FrameId) -> Option<PendingRequest<T>> {
        self.entries.remove(&frame_id)
    }

    /// Remove and return the request for `frame_id` only if it still owns
    /// `timer`. A timer left over from an earlier holder of the same
    /// identifier matches nothing.
    pub fn take_if_timer(
        &mut self,
        frame_id: FrameId,
        timer: TimerHandle,
    ) -> Option<PendingRequest<T>> {
        match self.entries.get(&frame_id) {
            Some(pending) if pending.timer == timer => self.entries.remove(&frame_id),
            _ => None,
        }
    }

    /// Remove and return every pending request.
    pub fn remove_all(&mut self) -> Vec<PendingRequest<T>> {
        self.entries.drain().map(|(_, pending)| pending).collect()
    }

    /// Whether `frame_id` is outstanding.
    pub fn contains(&self, frame_id: FrameId) -> bool {
        self.entries.contains_key(&frame_id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
