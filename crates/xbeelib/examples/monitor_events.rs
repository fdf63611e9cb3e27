//! Print every unsolicited frame an XBee module reports.
//!
//! Received data, modem status changes, and node identification
//! announcements all arrive through the session's event channel.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=xbeelib=debug cargo run -p xbeelib --example monitor_events
//! ```

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use xbeelib::{ApiFrame, LocalCommand, ModuleType, XBeeBuilder, XBeeEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Adjust this to match your system's serial port.
    let serial_port = "/dev/ttyUSB0";

    let xbee = XBeeBuilder::new(ModuleType::ZigBee)
        .serial_port(serial_port)
        .build()
        .await?;

    let name = xbee.local_command(LocalCommand::new("NI")).await?;
    println!("Listening on '{}'. Press Ctrl-C to stop.", String::from_utf8_lossy(&name));

    let mut events = xbee.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(XBeeEvent::Frame(ApiFrame::ReceivePacket { source64, data, .. })) => {
                    println!("{:016X}: {}", source64, String::from_utf8_lossy(&data));
                }
                Ok(XBeeEvent::Frame(ApiFrame::NodeIdentification {
                    remote64,
                    node_identifier,
                    ..
                })) => {
                    println!("node joined: {} ({:016X})", node_identifier, remote64);
                }
                Ok(XBeeEvent::Frame(frame)) => println!("{:?}", frame),
                Ok(XBeeEvent::Disconnected) => {
                    println!("Disconnected");
                    break;
                }
                Err(RecvError::Lagged(missed)) => println!("missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    }

    xbee.close().await;
    Ok(())
}
