//! XBeeBuilder -- fluent builder for opening [`XBee`] sessions.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, API mode, and the default response timeout
//! before the transport is opened.
//!
//! # Example
//!
//! ```no_run
//! use xbeelib::{ModuleType, XBeeBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> xbeelib::Result<()> {
//! let xbee = XBeeBuilder::new(ModuleType::ZigBee)
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(115_200)
//!     .default_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use xbeelib_api::ApiMode;
use xbeelib_core::error::{Error, Result};
use xbeelib_core::transport::Transport;
use xbeelib_transport::{PortOptions, SerialTransport};

use crate::options::{DEFAULT_TIMEOUT, ModuleType, XBeeOptions, check_timeout};
use crate::xbee::XBee;

/// Fluent builder for [`XBee`].
///
/// Defaults: 9600 baud 8N1, API mode 1, 5 second response timeout.
///
/// ```ignore
/// let xbee = XBeeBuilder::new(ModuleType::Series1)
///     .serial_port("/dev/ttyUSB0")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct XBeeBuilder {
    module: ModuleType,
    serial_port: Option<String>,
    port_options: PortOptions,
    api_mode: ApiMode,
    default_timeout: Duration,
}

impl XBeeBuilder {
    /// Create a new builder for the given radio family.
    pub fn new(module: ModuleType) -> Self {
        XBeeBuilder {
            module,
            serial_port: None,
            port_options: PortOptions::default(),
            api_mode: ApiMode::default(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Start from validated options, e.g. from
    /// [`validate_options`](crate::options::validate_options).
    pub fn from_options(options: XBeeOptions) -> Self {
        XBeeBuilder {
            module: options.module,
            serial_port: Some(options.port_name),
            port_options: options.port_options,
            api_mode: options.api_mode,
            default_timeout: options.default_timeout,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (must match the module's `BD` setting).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.port_options.baud_rate = baud;
        self
    }

    /// Replace all serial line settings.
    pub fn port_options(mut self, options: PortOptions) -> Self {
        self.port_options = options;
        self
    }

    /// Set the API mode (must match the module's `AP` setting).
    pub fn api_mode(mut self, mode: ApiMode) -> Self {
        self.api_mode = mode;
        self
    }

    /// Set the timeout for commands that do not specify one
    /// (default: 5 s, minimum 10 ms).
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Build an [`XBee`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `xbeelib-test-harness`) and for
    /// advanced use cases where the caller manages the transport
    /// lifecycle directly. Must be called within a Tokio runtime.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<XBee> {
        check_timeout("defaultTimeoutMs", self.default_timeout)?;

        Ok(XBee::new(
            transport,
            self.module,
            self.api_mode,
            self.default_timeout,
        ))
    }

    /// Build an [`XBee`] using a serial transport.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<XBee> {
        check_timeout("defaultTimeoutMs", self.default_timeout)?;
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::Validation("property 'portName' is missing".into()))?;

        let transport = SerialTransport::open_with_options(port, &self.port_options).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
