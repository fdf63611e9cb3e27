//! Deadline bookkeeping for pending requests.
//!
//! The scheduler never sleeps on its own. The IO task asks for
//! [`next_deadline`](TimeoutScheduler::next_deadline), sleeps until then,
//! and drains [`pop_expired`](TimeoutScheduler::pop_expired). Cancelling a
//! timer removes it from the queue immediately, so a cancelled timer can
//! never be returned as expired.

use std::collections::BTreeMap;

use tokio::time::Instant;

use crate::types::FrameId;

/// Owns one scheduled timeout.
///
/// The ticket is unique for the lifetime of the scheduler, so a handle
/// still identifies its own timer after the frame ID has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    deadline: Instant,
    ticket: u64,
}

impl TimerHandle {
    /// When this timer fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Ordered queue of request deadlines.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    next_ticket: u64,
    queue: BTreeMap<(Instant, u64), FrameId>,
}

impl TimeoutScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timeout for `frame_id` at `deadline`.
    pub fn schedule(&mut self, frame_id: FrameId, deadline: Instant) -> TimerHandle {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.insert((deadline, ticket), frame_id);
        TimerHandle { deadline, ticket }
    }

    /// Cancel a timer. Returns `false` if it had already fired or been cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.queue.remove(&(handle.deadline, handle.ticket)).is_some()
    }

    /// The earliest outstanding deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<(FrameId, TimerHandle)> {
        let mut expired = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            let (deadline, ticket) = *entry.key();
            if deadline > now {
                break;
            }
            let frame_id = entry.remove();
            expired.push((frame_id, TimerHandle { deadline, ticket }));
        }
        expired
    }

    /// Drop every scheduled timer.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of scheduled timers.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no timers are scheduled.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
