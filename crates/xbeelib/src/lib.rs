//! # xbeelib -- Async control of XBee radio modules
//!
//! `xbeelib` drives a Digi XBee module attached to a serial port in API
//! mode. Each command gets a frame ID, is written to the shared serial
//! link, and resolves when the module's response carrying the same frame
//! ID comes back, however many other requests are in flight and in
//! whatever order their responses arrive.
//!
//! ## Quick Start
//!
//! ```no_run
//! use xbeelib::{ModuleType, RemoteTransmit, XBeeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let xbee = XBeeBuilder::new(ModuleType::ZigBee)
//!         .serial_port("/dev/ttyUSB1")
//!         .baud_rate(115_200)
//!         .build()
//!         .await?;
//!
//!     let delivered = xbee
//!         .remote_transmit(RemoteTransmit::new("ROUTER", b"hello".to_vec()))
//!         .await?;
//!     println!("delivered: {}", delivered);
//!
//!     xbee.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `xbeelib-core`         | Correlation engine, [`Transport`] trait, errors  |
//! | `xbeelib-api`          | API frame model and binary codec                 |
//! | `xbeelib-transport`    | Serial port transport                            |
//! | `xbeelib-test-harness` | Mock transport for tests                         |
//! | `xbeelib`              | The [`XBee`] session and its builder             |
//!
//! A session spawns one IO task that owns the transport and the
//! correlator. [`XBee`] methods send requests to it over a channel;
//! unsolicited frames come back through [`XBee::subscribe`].

pub mod builder;
pub mod commands;
pub mod events;
mod io;
pub mod options;
mod xbee;

pub use builder::XBeeBuilder;
pub use commands::{Destination, LocalCommand, NodeAddress, RemoteCommand, RemoteTransmit};
pub use events::XBeeEvent;
pub use options::{ModuleType, XBeeOptions, validate_options};
pub use xbee::XBee;

pub use xbeelib_api::{ApiFrame, ApiMode, AtCommand, AtStatus};
pub use xbeelib_core::{Error, Result, Transport};
pub use xbeelib_transport::PortOptions;
