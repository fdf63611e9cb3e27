//! Transport trait for radio communication.
//!
//! The [`Transport`] trait abstracts over the byte-level link to an XBee
//! module. [`SerialTransport`](https://docs.rs/xbeelib-transport) covers
//! real hardware; `MockTransport` from `xbeelib-test-harness` covers tests.
//!
//! The IO task in `xbeelib` owns exactly one `Transport` for the lifetime
//! of a session. Framing and correlation happen above this trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a radio module.
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes to the radio.
    ///
    /// Returns once all bytes have been handed to the underlying port. An
    /// error here is a write failure for whatever frame the bytes encode.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the radio into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::ReadTimeout`](crate::error::Error::ReadTimeout) if
    /// nothing arrives. Implementations must be cancel-safe: dropping the
    /// future before completion must not lose bytes.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
