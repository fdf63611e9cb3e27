//! Mock transport for deterministic testing of the IO task.
//!
//! Unlike a request/response script, an XBee link delivers responses in
//! any order and mixes in unsolicited frames. [`MockTransport`] therefore
//! splits into two halves: the transport itself, which is moved into the
//! code under test, and a [`MockHandle`] the test keeps to inject inbound
//! bytes, inspect what was written, and provoke failures.
//!
//! # Example
//!
//! ```
//! use xbeelib_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let handle = mock.handle();
//! // Optional: auto-reply when an exact request is written.
//! handle.expect(&[0x7E, 0x00, 0x04, 0x08, 0x01, 0x4E, 0x49, 0x5F],
//!               &[0x7E, 0x00, 0x05, 0x88, 0x01, 0x4E, 0x49, 0x00, 0xDF]);
//! // Or push bytes at any time.
//! handle.inject(&[0x7E, 0x00, 0x02, 0x8A, 0x06, 0x6F]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use xbeelib_core::error::{Error, Result};
use xbeelib_core::transport::Transport;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    sent_log: Vec<Vec<u8>>,
    connected: bool,
    fail_sends: usize,
    closed: bool,
}

/// A mock [`Transport`] for testing without hardware.
///
/// Writes are recorded and always succeed unless a failure was queued
/// with [`MockHandle::fail_next_send`]. If an expectation is queued and the
/// written bytes match it, its response is delivered as inbound data; a
/// mismatch is a protocol error. With no expectations queued every write
/// is accepted.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Bytes of a chunk that did not fit in the caller's buffer.
    leftover: VecDeque<u8>,
}

/// Test-side control of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                sent_log: Vec::new(),
                connected: true,
                fail_sends: 0,
                closed: false,
            })),
            inbound_tx,
            inbound_rx,
            leftover: VecDeque::new(),
        }
    }

    /// A handle for driving this transport from the test.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
            inbound_tx: self.inbound_tx.clone(),
        }
    }

    fn drain_leftover(&mut self, buf: &mut [u8]) -> usize {
        let n = self.leftover.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.leftover.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Add an expected request and the response to deliver when it is sent.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Deliver bytes to the next `receive()` call.
    pub fn inject(&self, data: &[u8]) {
        let _ = self.inbound_tx.send(data.to_vec());
    }

    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Wait until at least `count` sends have been recorded.
    ///
    /// Returns the sent payloads, or `None` if `timeout` elapses first.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Option<Vec<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent_data();
            if sent.len() >= count {
                return Some(sent);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Make the next `send()` fail with a transport error.
    pub fn fail_next_send(&self) {
        lock(&self.state).fail_sends += 1;
    }

    /// Simulate the port disappearing (or coming back).
    ///
    /// While disconnected, `send()` and `receive()` return
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    /// Whether `close()` has been called on the transport.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(Error::Transport("mock write failure".into()));
        }

        if let Some(expectation) = state.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            let _ = self.inbound_tx.send(expectation.response);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !lock(&self.state).connected {
            return Err(Error::NotConnected);
        }

        if !self.leftover.is_empty() {
            return Ok(self.drain_leftover(buf));
        }

        match tokio::time::timeout(timeout, self.inbound_rx.recv()).await {
            Ok(Some(chunk)) => {
                self.leftover.extend(chunk);
                Ok(self.drain_leftover(buf))
            }
            // The transport holds its own sender, so the channel never closes.
            Ok(None) | Err(_) => Err(Error::ReadTimeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn injected_bytes_are_received() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.inject(&[0x7E, 0x00, 0x01]);

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, WAIT).await.unwrap();
        assert_eq!(&buf[..n], &[0x7E, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn expectation_delivers_response() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.expect(&[0x01, 0x02], &[0xAA, 0xBB]);

        mock.send(&[0x01, 0x02]).await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);

        let mut buf = [0u8; 8];
        let n = mock.receive(&mut buf, WAIT).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn mismatched_expectation_errors() {
        let mut mock = MockTransport::new();
        mock.handle().expect(&[0x01], &[0xFF]);

        let result = mock.send(&[0x99]).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn sends_without_expectations_are_accepted() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.send(&[0x01]).await.unwrap();
        mock.send(&[0x02, 0x03]).await.unwrap();
        assert_eq!(handle.sent_data(), vec![vec![0x01], vec![0x02, 0x03]]);
    }

    #[tokio::test]
    async fn receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(5)).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
    }

    #[tokio::test]
    async fn partial_receive_keeps_leftover() {
        let mut mock = MockTransport::new();
        mock.handle().inject(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = [0u8; 3];
        let n = mock.receive(&mut buf, WAIT).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB, 0xCC]);
        let n = mock.receive(&mut buf, WAIT).await.unwrap();
        assert_eq!(&buf[..n], &[0xDD]);
    }

    #[tokio::test]
    async fn fail_next_send_fails_once() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.fail_next_send();

        assert!(matches!(mock.send(&[0x01]).await, Err(Error::Transport(_))));
        assert!(mock.send(&[0x02]).await.is_ok());
        assert_eq!(handle.sent_data().len(), 2);
    }

    #[tokio::test]
    async fn disconnect_and_close() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        handle.set_connected(false);
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        assert!(matches!(mock.receive(&mut buf, WAIT).await, Err(Error::NotConnected)));

        handle.set_connected(true);
        mock.close().await.unwrap();
        assert!(handle.is_closed());
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn wait_for_sent_observes_writes() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        assert!(handle.wait_for_sent(1, Duration::from_millis(10)).await.is_none());

        mock.send(&[0x42]).await.unwrap();
        let sent = handle.wait_for_sent(1, WAIT).await.unwrap();
        assert_eq!(sent, vec![vec![0x42]]);
    }
}
