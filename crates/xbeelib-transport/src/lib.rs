//! Transport implementations for xbeelib.
//!
//! - [`SerialTransport`]: USB virtual COM ports and UART connections to an
//!   XBee module, built on `tokio-serial`.

pub mod serial;

pub use serial::{DataBits, FlowControl, Parity, PortOptions, SerialTransport, StopBits};
