//! Error types for xbeelib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Validation, correlation, transport, and
//! protocol failures are all captured here.

use std::time::Duration;

/// The error type for all xbeelib operations.
///
/// `Validation` and `CapacityExceeded` are returned immediately by the
/// issuing operation. `Timeout`, `DeliveryFailed`, `CommandFailed`,
/// `Transport`, and `Closed` only ever arrive through a pending response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied parameters or options were malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Every frame ID is held by an outstanding request.
    ///
    /// Treat this as backpressure: retry once some responses have arrived.
    #[error("no frame ID available: all identifiers are outstanding")]
    CapacityExceeded,

    /// No matching response frame arrived before the deadline.
    #[error("timeout waiting for response to frame {frame_id} after {elapsed:?}")]
    Timeout {
        /// Frame ID of the request that timed out.
        frame_id: u8,
        /// Time between issuing the request and the timeout firing.
        elapsed: Duration,
    },

    /// The radio reported that the transmission was not delivered.
    #[error("delivery failed for frame {frame_id}: {reason} (status 0x{status:02X})")]
    DeliveryFailed {
        /// Frame ID of the failed request.
        frame_id: u8,
        /// Raw status byte from the status frame.
        status: u8,
        /// Human-readable description of the status byte.
        reason: String,
    },

    /// The radio rejected an AT command.
    #[error("AT command {command} failed: {status}")]
    CommandFailed {
        /// Two-character AT command name.
        command: String,
        /// Description of the command status.
        status: String,
    },

    /// A write or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session was closed while the request was outstanding.
    #[error("session closed")]
    Closed,

    /// A protocol-level error (malformed API frame, unexpected response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No session to the radio has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the radio was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// No bytes arrived on the transport within the read window.
    #[error("timeout waiting for data")]
    ReadTimeout,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_validation() {
        let e = Error::Validation("property 'portName' is missing".into());
        assert_eq!(
            e.to_string(),
            "validation error: property 'portName' is missing"
        );
    }

    #[test]
    fn error_display_capacity() {
        let e = Error::CapacityExceeded;
        assert!(e.to_string().contains("no frame ID available"));
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout {
            frame_id: 7,
            elapsed: Duration::from_millis(1000),
        };
        assert_eq!(
            e.to_string(),
            "timeout waiting for response to frame 7 after 1s"
        );
    }

    #[test]
    fn error_display_delivery_failed() {
        let e = Error::DeliveryFailed {
            frame_id: 3,
            status: 0x21,
            reason: "network ACK failure".into(),
        };
        assert_eq!(
            e.to_string(),
            "delivery failed for frame 3: network ACK failure (status 0x21)"
        );
    }

    #[test]
    fn error_display_command_failed() {
        let e = Error::CommandFailed {
            command: "NI".into(),
            status: "invalid parameter".into(),
        };
        assert_eq!(e.to_string(), "AT command NI failed: invalid parameter");
    }

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_closed() {
        assert_eq!(Error::Closed.to_string(), "session closed");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
