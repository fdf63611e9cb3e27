// xbeelib test application -- CLI tool for exercising an XBee module
// against real hardware or a simulated module.
//
// Usage:
//   xbee-test-app --port /dev/ttyUSB0 --module zigbee at NI
//   xbee-test-app --port /dev/ttyUSB0 --module zigbee at D0 --hex 04
//   xbee-test-app --config xbee.json remote-at --dest ROUTER D0
//   xbee-test-app --mock transmit --dest 0x0013A20040000001 "hello"
//   xbee-test-app --mock lookup ROUTER
//   xbee-test-app --mock stress --count 500 --in-flight 32
//   xbee-test-app --port /dev/ttyUSB0 monitor --duration 60

mod mock_module;

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use xbeelib::options::validate_options;
use xbeelib::{
    ApiFrame, ApiMode, Destination, LocalCommand, ModuleType, RemoteCommand, RemoteTransmit, XBee,
    XBeeBuilder, XBeeEvent,
};
use xbeelib_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// xbeelib test application -- drives an XBee module from the command line.
#[derive(Parser)]
#[command(name = "xbee-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock or --config is used.
    #[arg(long)]
    port: Option<String>,

    /// Radio family of the attached module.
    #[arg(long, value_enum, default_value = "zigbee")]
    module: ModuleArg,

    /// Baud rate (must match the module's BD setting).
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// API mode (must match the module's AP setting).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    api_mode: u8,

    /// Default response timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Read session options from a JSON file instead of the flags above.
    /// Uses the same keys as the library: portName, module, apiMode,
    /// defaultTimeoutMs, portOptions.
    #[arg(long, conflicts_with_all = ["port", "mock"])]
    config: Option<String>,

    /// Use a simulated module instead of a real serial port.
    #[arg(long)]
    mock: bool,

    /// Log level when RUST_LOG is not set.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModuleArg {
    /// XBee Series 1 (802.15.4).
    #[value(name = "802.15.4", alias = "series1")]
    Series1,
    Znet,
    Zigbee,
}

impl From<ModuleArg> for ModuleType {
    fn from(arg: ModuleArg) -> Self {
        match arg {
            ModuleArg::Series1 => ModuleType::Series1,
            ModuleArg::Znet => ModuleType::ZNet,
            ModuleArg::Zigbee => ModuleType::ZigBee,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Parameter bytes for an AT command.
#[derive(clap::Args)]
struct ParameterArgs {
    /// Parameter as hex bytes (e.g. 04 or 0013A200).
    #[arg(long, conflicts_with = "text")]
    hex: Option<String>,

    /// Parameter as ASCII text (e.g. a node identifier).
    #[arg(long)]
    text: Option<String>,
}

impl ParameterArgs {
    fn bytes(&self) -> Result<Vec<u8>> {
        match (&self.hex, &self.text) {
            (Some(hex), _) => parse_hex_bytes(hex),
            (None, Some(text)) => Ok(text.as_bytes().to_vec()),
            (None, None) => Ok(Vec::new()),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run an AT command on the local module.
    At {
        /// Two-character command name (e.g. NI, MY, D0).
        command: String,

        #[command(flatten)]
        parameter: ParameterArgs,

        /// Send with frame ID 0 and do not wait for a response.
        #[arg(long)]
        no_wait: bool,
    },

    /// Run an AT command on a remote module.
    RemoteAt {
        /// Node identifier, 0x-prefixed 64-bit address, or 0x-prefixed
        /// 16-bit address.
        #[arg(long)]
        dest: String,

        /// Two-character command name.
        command: String,

        #[command(flatten)]
        parameter: ParameterArgs,
    },

    /// Transmit data to a remote module.
    Transmit {
        /// Node identifier, 0x-prefixed 64-bit address, or 0x-prefixed
        /// 16-bit address.
        #[arg(long)]
        dest: String,

        /// Data to send.
        data: String,
    },

    /// Resolve a node identifier to its addresses.
    Lookup {
        /// Node identifier (NI).
        node: String,
    },

    /// Print unsolicited frames as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Keep many local AT queries in flight at once and check every
    /// response reaches its own caller.
    Stress {
        /// Total number of queries.
        #[arg(long, default_value_t = 100)]
        count: u32,

        /// Maximum queries outstanding at once (1..=255).
        #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(1..=255))]
        in_flight: u32,
    },
}

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

/// Parse a hex string like "0A1b" or "0x0A1B" into bytes.
fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if !s.is_ascii() || s.len() % 2 != 0 {
        bail!("hex parameter must be an even number of hex digits: {s}");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16).with_context(|| format!("invalid hex byte in {s}"))
        })
        .collect()
}

/// Interpret a destination argument.
///
/// `0x` followed by up to 4 hex digits is a 16-bit address, up to 16 hex
/// digits a 64-bit address; anything else is a node identifier.
fn parse_destination(s: &str) -> Result<Destination> {
    let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return Ok(Destination::NodeId(s.to_string()));
    };
    match hex.len() {
        1..=4 => Ok(Destination::Address16(
            u16::from_str_radix(hex, 16).with_context(|| format!("invalid 16-bit address {s}"))?,
        )),
        5..=16 => Ok(Destination::Address64(
            u64::from_str_radix(hex, 16).with_context(|| format!("invalid 64-bit address {s}"))?,
        )),
        _ => bail!("address {s} is longer than 64 bits"),
    }
}

fn format_bytes(data: &[u8]) -> String {
    let hex: Vec<String> = data.iter().map(|b| format!("{b:02X}")).collect();
    let printable = !data.is_empty() && data.iter().all(|b| (b' '..=b'~').contains(b));
    if printable {
        format!("{} ({:?})", hex.join(" "), String::from_utf8_lossy(data))
    } else {
        hex.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn create_xbee(cli: &Cli) -> Result<XBee> {
    if let Some(path) = &cli.config {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
        let value: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("{path} is not valid JSON"))?;
        let options =
            validate_options(&value).with_context(|| format!("invalid options in {path}"))?;
        println!("Opening {} ({})", options.port_name, options.module);
        return Ok(XBeeBuilder::from_options(options).build().await?);
    }

    let api_mode = ApiMode::try_from(cli.api_mode)
        .map_err(|mode| anyhow::anyhow!("unsupported API mode {mode}"))?;
    let builder = XBeeBuilder::new(cli.module.into())
        .baud_rate(cli.baud)
        .api_mode(api_mode)
        .default_timeout(Duration::from_millis(cli.timeout_ms));

    if cli.mock {
        let mock = MockTransport::new();
        mock_module::spawn_mock_module(mock.handle(), api_mode);
        return Ok(builder.build_with_transport(Box::new(mock)).await?);
    }

    let Some(port) = &cli.port else {
        bail!("--port is required unless --mock or --config is used");
    };
    Ok(builder.serial_port(port).build().await?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_at(xbee: &XBee, command: &str, parameter: Vec<u8>, no_wait: bool) -> Result<()> {
    let request = LocalCommand::new(command).parameter(parameter);
    if no_wait {
        xbee.local_command_no_wait(request).await?;
        println!("{command}: sent");
        return Ok(());
    }
    let data = xbee.local_command(request).await?;
    println!("{command}: {}", format_bytes(&data));
    Ok(())
}

async fn cmd_remote_at(xbee: &XBee, dest: &str, command: &str, parameter: Vec<u8>) -> Result<()> {
    let destination = parse_destination(dest)?;
    let data = xbee
        .remote_command(RemoteCommand::new(destination, command).parameter(parameter))
        .await?;
    println!("{dest} {command}: {}", format_bytes(&data));
    Ok(())
}

async fn cmd_transmit(xbee: &XBee, dest: &str, data: &str) -> Result<()> {
    let destination = parse_destination(dest)?;
    let start = Instant::now();
    xbee.remote_transmit(RemoteTransmit::new(destination, data.as_bytes().to_vec()))
        .await?;
    println!(
        "Transmission successful ({} bytes, {:.1} ms)",
        data.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

async fn cmd_lookup(xbee: &XBee, node: &str) -> Result<()> {
    let address = xbee.lookup(node, None).await?;
    println!("{node}:");
    println!("  64-bit address: {:016X}", address.address64);
    println!("  16-bit address: {:04X}", address.address16);
    Ok(())
}

async fn cmd_monitor(xbee: &XBee, duration: u64) -> Result<()> {
    let mut events = xbee.subscribe();
    let deadline =
        (duration > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(duration));
    println!("Monitoring (Ctrl-C to stop)...");

    loop {
        let sleep = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep => break,
            event = events.recv() => match event {
                Ok(XBeeEvent::Frame(frame)) => print_frame(&frame),
                Ok(XBeeEvent::Disconnected) => bail!("module disconnected"),
                Err(RecvError::Lagged(missed)) => eprintln!("warning: missed {missed} events"),
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

fn print_frame(frame: &ApiFrame) {
    match frame {
        ApiFrame::ReceivePacket { source64, data, .. } | ApiFrame::Rx64 { source64, data, .. } => {
            println!("RX from {source64:016X}: {}", format_bytes(data));
        }
        ApiFrame::Rx16 { source16, data, .. } => {
            println!("RX from {source16:04X}: {}", format_bytes(data));
        }
        ApiFrame::ModemStatus { status } => println!("Modem status 0x{status:02X}"),
        ApiFrame::NodeIdentification {
            remote64,
            node_identifier,
            ..
        } => println!("Node identified: {node_identifier} ({remote64:016X})"),
        other => println!("{other:?}"),
    }
}

async fn cmd_stress(xbee: &XBee, count: u32, in_flight: u32) -> Result<()> {
    println!("Stress test: {count} queries, up to {in_flight} in flight");

    // Each query reads a different register so a misrouted response is
    // detectable by its command name.
    const COMMANDS: [&str; 4] = ["NI", "MY", "AP", "SH"];

    let start = Instant::now();
    let mut success = 0u32;
    let mut failures = 0u32;
    let mut issued = 0u32;

    while issued < count {
        let batch = in_flight.min(count - issued);
        let queries = (0..batch).map(|i| {
            let command = COMMANDS[((issued + i) as usize) % COMMANDS.len()];
            async move { (command, xbee.local_command(LocalCommand::new(command)).await) }
        });
        for (command, result) in join_all(queries).await {
            match result {
                Ok(_) => success += 1,
                Err(e) => {
                    eprintln!("{command} failed: {e}");
                    failures += 1;
                }
            }
        }
        issued += batch;
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total queries:  {count}");
    println!("  Successes:      {success}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} queries/sec");

    if failures > 0 {
        bail!("{failures} queries failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let xbee = create_xbee(&cli).await?;

    let result = match &cli.command {
        Command::At {
            command,
            parameter,
            no_wait,
        } => cmd_at(&xbee, command, parameter.bytes()?, *no_wait).await,
        Command::RemoteAt {
            dest,
            command,
            parameter,
        } => cmd_remote_at(&xbee, dest, command, parameter.bytes()?).await,
        Command::Transmit { dest, data } => cmd_transmit(&xbee, dest, data).await,
        Command::Lookup { node } => cmd_lookup(&xbee, node).await,
        Command::Monitor { duration } => cmd_monitor(&xbee, *duration).await,
        Command::Stress { count, in_flight } => cmd_stress(&xbee, *count, *in_flight).await,
    };

    xbee.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes() {
        assert_eq!(parse_hex_bytes("0A1b").unwrap(), vec![0x0A, 0x1B]);
        assert_eq!(parse_hex_bytes("0x04").unwrap(), vec![0x04]);
        assert!(parse_hex_bytes("ABC").is_err());
        assert!(parse_hex_bytes("ZZ").is_err());
    }

    #[test]
    fn destinations() {
        assert_eq!(
            parse_destination("ROUTER").unwrap(),
            Destination::NodeId("ROUTER".into())
        );
        assert_eq!(
            parse_destination("0x1234").unwrap(),
            Destination::Address16(0x1234)
        );
        assert_eq!(
            parse_destination("0x0013A20040000001").unwrap(),
            Destination::Address64(0x0013_A200_4000_0001)
        );
        assert!(parse_destination("0x0013A2004000000100").is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from([
            "xbee-test-app",
            "--mock",
            "--module",
            "802.15.4",
            "remote-at",
            "--dest",
            "0x0001",
            "D0",
            "--hex",
            "04",
        ])
        .unwrap();
        assert!(cli.mock);
        assert!(matches!(cli.module, ModuleArg::Series1));
        match cli.command {
            Command::RemoteAt { dest, command, parameter } => {
                assert_eq!(dest, "0x0001");
                assert_eq!(command, "D0");
                assert_eq!(parameter.bytes().unwrap(), vec![0x04]);
            }
            _ => panic!("expected remote-at"),
        }
    }

    #[tokio::test]
    async fn mock_session_round_trip() {
        let cli = Cli::try_parse_from(["xbee-test-app", "--mock", "lookup", "ROUTER"]).unwrap();
        let xbee = create_xbee(&cli).await.unwrap();

        assert_eq!(xbee.local_command(LocalCommand::new("NI")).await.unwrap(), b"MOCK");
        let address = xbee.lookup("ROUTER", None).await.unwrap();
        assert_eq!(address.address16, 0x1234);
        assert!(
            xbee.remote_transmit(RemoteTransmit::new("ROUTER", b"hi".to_vec()))
                .await
                .unwrap()
        );
        cmd_stress(&xbee, 40, 20).await.unwrap();
        xbee.close().await;
    }
}
