//! The frame correlation engine.
//!
//! [`Correlator`] matches inbound response frames to the requests that
//! caused them. It is plain synchronous state: the IO task in `xbeelib`
//! owns one per session and calls into it from its event loop, so no two
//! events ever interleave mid-update and no lock is needed.
//!
//! Every pending request ends in exactly one of: resolved by a matching
//! frame, rejected by the frame's status, `Timeout`, `Transport`, or
//! `Closed`. Each of those paths first `take`s the entry from the
//! registry; whichever runs first wins and the rest find nothing.

use std::time::Duration;

use tokio::time::Instant;

use crate::allocator::FrameIdAllocator;
use crate::completion::{Completion, Reply, ResponseFuture};
use crate::error::{Error, Result};
use crate::registry::{PendingRequest, Registry};
use crate::scheduler::TimeoutScheduler;
use crate::types::{Correlated, FrameId};

/// Maps a matched response frame to success or failure.
///
/// Supplied by the command layer, which knows which frame kinds carry a
/// delivery or command status.
pub type Classifier<T> = fn(T) -> Result<T>;

/// Result of [`Correlator::begin`].
#[derive(Debug)]
pub struct Begun<T> {
    /// Identifier to encode into the outgoing frame.
    pub frame_id: FrameId,
    /// Future the caller awaits.
    pub response: ResponseFuture<T>,
    /// For fire-and-forget requests, the completion the writer resolves
    /// once the bytes are on the wire. `None` for correlated requests.
    pub ack: Option<Completion<T>>,
}

/// What [`Correlator::on_frame`] did with a frame.
#[derive(Debug)]
pub enum Dispatch<T> {
    /// The frame resolved the request with this identifier.
    Resolved(FrameId),
    /// The frame's status rejected the request with this identifier.
    Rejected(FrameId),
    /// No outstanding request matched; the frame is handed back.
    Unsolicited(T),
}

/// Per-session frame correlation state.
#[derive(Debug)]
pub struct Correlator<T> {
    allocator: FrameIdAllocator,
    registry: Registry<T>,
    timers: TimeoutScheduler,
    classify: Classifier<T>,
}

impl<T: Correlated> Correlator<T> {
    /// Create a correlator for a fresh session.
    pub fn new(classify: Classifier<T>) -> Self {
        Correlator {
            allocator: FrameIdAllocator::new(),
            registry: Registry::new(),
            timers: TimeoutScheduler::new(),
            classify,
        }
    }

    /// Start a request.
    ///
    /// With `expects_response == false` the request uses
    /// [`FrameId::NONE`] and nothing is registered; the returned `ack`
    /// must be resolved by whoever writes the frame. Otherwise a fresh
    /// identifier is allocated and the request is registered with a
    /// deadline of `now + timeout`. A timeout whose deadline cannot be
    /// represented fails with [`Error::Validation`] before anything is
    /// allocated.
    pub fn begin(
        &mut self,
        expects_response: bool,
        timeout: Duration,
        now: Instant,
    ) -> Result<Begun<T>> {
        let (completion, response) = Completion::pair();

        if !expects_response {
            return Ok(Begun {
                frame_id: FrameId::NONE,
                response,
                ack: Some(completion),
            });
        }

        let deadline = now.checked_add(timeout).ok_or_else(|| {
            Error::Validation(format!("timeout of {:?} is out of range", timeout))
        })?;
        let registry = &self.registry;
        let frame_id = self.allocator.allocate(|id| registry.contains(id))?;
        let timer = self.timers.schedule(frame_id, deadline);
        self.registry.register(PendingRequest {
            frame_id,
            completion,
            issued_at: now,
            deadline,
            timer,
        });

        tracing::trace!(
            frame_id = %frame_id,
            timeout_ms = timeout.as_millis() as u64,
            outstanding = self.registry.len(),
            "request registered"
        );

        Ok(Begun {
            frame_id,
            response,
            ack: None,
        })
    }

    /// Route an inbound frame to the request it answers.
    pub fn on_frame(&mut self, frame: T) -> Dispatch<T> {
        let frame_id = match frame.frame_id() {
            Some(id) if !id.is_none() => id,
            _ => return Dispatch::Unsolicited(frame),
        };

        let Some(pending) = self.registry.take(frame_id) else {
            tracing::trace!(frame_id = %frame_id, "response for unknown or expired frame ID");
            return Dispatch::Unsolicited(frame);
        };
        self.timers.cancel(pending.timer);

        match (self.classify)(frame) {
            Ok(frame) => {
                tracing::trace!(frame_id = %frame_id, "request resolved");
                pending.completion.resolve(Reply::Frame(frame));
                Dispatch::Resolved(frame_id)
            }
            Err(error) => {
                tracing::debug!(frame_id = %frame_id, error = %error, "request rejected by status");
                pending.completion.reject(error);
                Dispatch::Rejected(frame_id)
            }
        }
    }

    /// Reject the request whose frame could not be written.
    ///
    /// Returns `false` if the request had already completed.
    pub fn on_write_failed(&mut self, frame_id: FrameId, error: &Error) -> bool {
        match self.registry.take(frame_id) {
            Some(pending) => {
                self.timers.cancel(pending.timer);
                pending.completion.reject(Error::Transport(error.to_string()));
                true
            }
            None => false,
        }
    }

    /// Reject every request whose deadline is at or before `now`.
    ///
    /// Returns the identifiers that timed out.
    pub fn expire(&mut self, now: Instant) -> Vec<FrameId> {
        let mut timed_out = Vec::new();
        for (frame_id, timer) in self.timers.pop_expired(now) {
            if let Some(pending) = self.registry.take_if_timer(frame_id, timer) {
                let elapsed = now.saturating_duration_since(pending.issued_at);
                tracing::debug!(
                    frame_id = %frame_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request timed out"
                );
                pending.completion.reject(Error::Timeout {
                    frame_id: frame_id.get(),
                    elapsed,
                });
                timed_out.push(frame_id);
            }
        }
        timed_out
    }

    /// Reject every outstanding request after a fatal transport failure.
    pub fn fail_all(&mut self, error: &Error) -> usize {
        let message = error.to_string();
        self.drain(|| Error::Transport(message.clone()))
    }

    /// Reject every outstanding request because the session is closing.
    pub fn close(&mut self) -> usize {
        self.drain(|| Error::Closed)
    }

    fn drain(&mut self, error: impl Fn() -> Error) -> usize {
        self.timers.clear();
        let drained = self.registry.remove_all();
        let count = drained.len();
        for pending in drained {
            pending.completion.reject(error());
        }
        if count > 0 {
            tracing::debug!(count, "rejected all outstanding requests");
        }
        count
    }

    /// The earliest deadline among outstanding requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.registry.len()
    }

    /// Whether `frame_id` is held by an outstanding request.
    pub fn is_outstanding(&self, frame_id: FrameId) -> bool {
        self.registry.contains(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Minimal frame: an optional identifier plus a status byte.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestFrame {
        id: Option<u8>,
        status: u8,
    }

    impl Correlated for TestFrame {
        fn frame_id(&self) -> Option<FrameId> {
            self.id.map(FrameId)
        }
    }

    fn classify(frame: TestFrame) -> Result<TestFrame> {
        if frame.status == 0 {
            Ok(frame)
        } else {
            Err(Error::DeliveryFailed {
                frame_id: frame.id.unwrap_or(0),
                status: frame.status,
                reason: "no ACK".into(),
            })
        }
    }

    fn response(id: u8) -> TestFrame {
        TestFrame {
            id: Some(id),
            status: 0,
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(1000);

    #[tokio::test]
    async fn first_two_requests_get_one_and_two() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);

        let first = correlator.begin(true, TIMEOUT, now).unwrap();
        let second = correlator.begin(true, TIMEOUT, now).unwrap();
        assert_eq!(first.frame_id, FrameId(1));
        assert_eq!(second.frame_id, FrameId(2));
        assert!(first.ack.is_none());

        // A frame for 2 resolves only the second request.
        assert!(matches!(correlator.on_frame(response(2)), Dispatch::Resolved(FrameId(2))));
        assert_eq!(second.response.await.unwrap(), Reply::Frame(response(2)));
        assert!(correlator.is_outstanding(FrameId(1)));

        // The first times out at its deadline.
        assert!(correlator.expire(now + Duration::from_millis(999)).is_empty());
        assert_eq!(correlator.expire(now + TIMEOUT), vec![FrameId(1)]);
        match first.response.await {
            Err(Error::Timeout { frame_id, elapsed }) => {
                assert_eq!(frame_id, 1);
                assert_eq!(elapsed, TIMEOUT);
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn fire_and_forget_uses_reserved_id() {
        let mut correlator = Correlator::new(classify);
        let begun = correlator.begin(false, TIMEOUT, Instant::now()).unwrap();

        assert_eq!(begun.frame_id, FrameId::NONE);
        assert_eq!(correlator.outstanding(), 0);
        assert_eq!(correlator.next_deadline(), None);

        begun.ack.unwrap().resolve(Reply::Sent);
        assert_eq!(begun.response.await.unwrap(), Reply::Sent);
    }

    #[tokio::test]
    async fn concurrent_requests_have_distinct_ids() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let mut seen = HashSet::new();
        let mut held = Vec::new();
        for _ in 0..FrameId::SPACE {
            let begun = correlator.begin(true, TIMEOUT, now).unwrap();
            assert!(seen.insert(begun.frame_id));
            held.push(begun);
        }
        assert_eq!(correlator.outstanding(), FrameId::SPACE);

        let overflow = correlator.begin(true, TIMEOUT, now);
        assert!(matches!(overflow, Err(Error::CapacityExceeded)));
        assert_eq!(correlator.outstanding(), FrameId::SPACE);
    }

    #[tokio::test]
    async fn unrepresentable_deadline_is_rejected_before_allocation() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let pending = correlator.begin(true, TIMEOUT, now).unwrap();

        let huge = correlator.begin(true, Duration::MAX, now);
        assert!(matches!(huge, Err(Error::Validation(_))));
        assert_eq!(correlator.outstanding(), 1);

        // The allocator did not advance past the rejected request.
        let next = correlator.begin(true, TIMEOUT, now).unwrap();
        assert_eq!(next.frame_id, FrameId(2));

        correlator.on_frame(response(1));
        assert!(pending.response.await.is_ok());
    }

    #[tokio::test]
    async fn freed_identifier_becomes_available_after_capacity() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let mut held = Vec::new();
        for _ in 0..FrameId::SPACE {
            held.push(correlator.begin(true, TIMEOUT, now).unwrap());
        }

        correlator.on_frame(response(77));
        let next = correlator.begin(true, TIMEOUT, now).unwrap();
        assert_eq!(next.frame_id, FrameId(77));
    }

    #[tokio::test]
    async fn duplicate_response_is_unsolicited() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let begun = correlator.begin(true, TIMEOUT, now).unwrap();

        assert!(matches!(correlator.on_frame(response(1)), Dispatch::Resolved(_)));
        match correlator.on_frame(response(1)) {
            Dispatch::Unsolicited(frame) => assert_eq!(frame, response(1)),
            other => panic!("expected Unsolicited, got {:?}", other),
        }
        assert!(begun.response.await.is_ok());
    }

    #[test]
    fn frames_without_identifier_are_unsolicited() {
        let mut correlator = Correlator::new(classify);
        let frame = TestFrame { id: None, status: 0 };
        assert!(matches!(correlator.on_frame(frame), Dispatch::Unsolicited(_)));

        let zero = TestFrame { id: Some(0), status: 0 };
        assert!(matches!(correlator.on_frame(zero), Dispatch::Unsolicited(_)));
    }

    #[tokio::test]
    async fn frame_just_before_deadline_wins() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let begun = correlator.begin(true, TIMEOUT, now).unwrap();

        assert!(correlator.expire(now + TIMEOUT - Duration::from_millis(1)).is_empty());
        assert!(matches!(correlator.on_frame(response(1)), Dispatch::Resolved(_)));
        assert_eq!(correlator.next_deadline(), None);
        assert!(correlator.expire(now + TIMEOUT).is_empty());
        assert!(begun.response.await.is_ok());
    }

    #[tokio::test]
    async fn status_failure_rejects_same_future() {
        let mut correlator = Correlator::new(classify);
        let begun = correlator.begin(true, TIMEOUT, Instant::now()).unwrap();

        let failed = TestFrame {
            id: Some(1),
            status: 1,
        };
        assert!(matches!(correlator.on_frame(failed), Dispatch::Rejected(FrameId(1))));
        assert!(matches!(
            begun.response.await,
            Err(Error::DeliveryFailed { frame_id: 1, status: 1, .. })
        ));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn write_failure_rejects_with_transport() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let begun = correlator.begin(true, TIMEOUT, now).unwrap();

        assert!(correlator.on_write_failed(begun.frame_id, &Error::ConnectionLost));
        assert!(!correlator.on_write_failed(begun.frame_id, &Error::ConnectionLost));
        assert!(correlator.expire(now + TIMEOUT).is_empty());

        match begun.response.await {
            Err(Error::Transport(msg)) => assert_eq!(msg, "connection lost"),
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_rejects_everything() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let pending: Vec<_> = (0..5)
            .map(|_| correlator.begin(true, TIMEOUT, now).unwrap())
            .collect();

        assert_eq!(correlator.close(), 5);
        assert_eq!(correlator.outstanding(), 0);
        assert_eq!(correlator.next_deadline(), None);

        for begun in pending {
            assert!(matches!(begun.response.await, Err(Error::Closed)));
        }

        // Late frames after close are unsolicited.
        assert!(matches!(correlator.on_frame(response(3)), Dispatch::Unsolicited(_)));
    }

    #[tokio::test]
    async fn fail_all_rejects_with_transport() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let a = correlator.begin(true, TIMEOUT, now).unwrap();
        let b = correlator.begin(true, TIMEOUT, now).unwrap();

        assert_eq!(correlator.fail_all(&Error::ConnectionLost), 2);
        assert!(matches!(a.response.await, Err(Error::Transport(_))));
        assert!(matches!(b.response.await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn out_of_order_responses_resolve_independently() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let begun: Vec<_> = (0..4)
            .map(|_| correlator.begin(true, TIMEOUT, now).unwrap())
            .collect();

        for id in [3u8, 1, 4, 2] {
            assert!(matches!(correlator.on_frame(response(id)), Dispatch::Resolved(_)));
        }
        for (i, b) in begun.into_iter().enumerate() {
            assert_eq!(b.response.await.unwrap(), Reply::Frame(response(i as u8 + 1)));
        }
    }

    #[tokio::test]
    async fn timed_out_identifier_can_be_reallocated() {
        let now = Instant::now();
        let mut correlator = Correlator::new(classify);
        let mut held = Vec::new();
        for _ in 0..FrameId::SPACE {
            held.push(correlator.begin(true, TIMEOUT, now).unwrap());
        }
        // Free identifier 1 by timeout only: give it an earlier deadline.
        correlator.on_frame(response(1));
        let short = correlator.begin(true, Duration::from_millis(10), now).unwrap();
        assert_eq!(short.frame_id, FrameId(1));
        assert_eq!(correlator.expire(now + Duration::from_millis(10)), vec![FrameId(1)]);

        let again = correlator.begin(true, TIMEOUT, now).unwrap();
        assert_eq!(again.frame_id, FrameId(1));

        // A stale response for the old holder now answers the new one.
        assert!(matches!(correlator.on_frame(response(1)), Dispatch::Resolved(_)));
        assert!(again.response.await.is_ok());
    }
}
