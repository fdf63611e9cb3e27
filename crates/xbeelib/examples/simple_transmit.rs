//! Simple transmit example.
//!
//! Sends one payload to a node named on the command line and reports
//! whether the module confirmed delivery.
//!
//! # Requirements
//!
//! - A ZigBee XBee in API mode 1 on a USB adapter
//! - The serial port path adjusted for your system (e.g., `/dev/ttyUSB1`
//!   on Linux, `COM3` on Windows)
//!
//! # Usage
//!
//! ```sh
//! cargo run -p xbeelib --example simple_transmit -- <destination NI> <data>
//! ```

use xbeelib::{ModuleType, RemoteTransmit, XBeeBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage:");
        eprintln!("  {} <destination ID> <data>", args[0]);
        std::process::exit(1);
    }
    let destination = args[1].as_str();
    let data = args[2].as_bytes().to_vec();

    // Adjust this to match your system's serial port.
    let serial_port = "/dev/ttyUSB1";

    let xbee = XBeeBuilder::new(ModuleType::ZigBee)
        .serial_port(serial_port)
        .baud_rate(115_200)
        .build()
        .await?;

    match xbee
        .remote_transmit(RemoteTransmit::new(destination, data))
        .await
    {
        // `true` means delivered, so there is nothing else to print.
        Ok(_) => println!("Transmission successful"),
        Err(e) => println!("Transmission failed:\n {}", e),
    }

    xbee.close().await;
    Ok(())
}
