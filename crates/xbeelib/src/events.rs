//! Asynchronous session event types.
//!
//! Events are emitted by the IO task through a [`tokio::sync::broadcast`]
//! channel. Subscribers see every inbound frame that did not answer an
//! outstanding request (received data, modem status, node
//! identification, late responses) and the loss of the serial link.

use xbeelib_api::ApiFrame;

/// An event emitted by an XBee session.
///
/// Subscribe via [`crate::XBee::subscribe()`]. Delivery is best-effort
/// through a bounded broadcast channel; slow consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XBeeEvent {
    /// A frame arrived that no outstanding request was waiting for.
    Frame(ApiFrame),

    /// The transport failed. Outstanding requests were rejected and the
    /// session accepts no further commands.
    Disconnected,
}

impl XBeeEvent {
    /// The frame carried by this event, if any.
    pub fn frame(&self) -> Option<&ApiFrame> {
        match self {
            XBeeEvent::Frame(frame) => Some(frame),
            XBeeEvent::Disconnected => None,
        }
    }
}
