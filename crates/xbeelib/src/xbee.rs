//! The [`XBee`] session handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use xbeelib_api::{ApiMode, AtCommand};
use xbeelib_core::error::Result;
use xbeelib_core::transport::Transport;

use crate::commands::{self, Destination, LocalCommand, NodeAddress, RemoteCommand, RemoteTransmit};
use crate::events::XBeeEvent;
use crate::io::{IoConfig, XBeeIo, spawn_io_task};
use crate::options::{ModuleType, check_timeout};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An open session with a locally attached XBee module.
///
/// Construct with [`XBeeBuilder`](crate::XBeeBuilder). Every command
/// method may be called concurrently from several tasks; responses are
/// matched to their requests by frame ID regardless of arrival order.
///
/// Validation and capacity errors are returned before anything is
/// written. Every other failure ([`Timeout`](crate::Error::Timeout),
/// [`DeliveryFailed`](crate::Error::DeliveryFailed),
/// [`CommandFailed`](crate::Error::CommandFailed),
/// [`Transport`](crate::Error::Transport), [`Closed`](crate::Error::Closed))
/// is the outcome of the request itself.
///
/// Dropping the handle shuts the session down as if [`close`](Self::close)
/// had been called.
pub struct XBee {
    module: ModuleType,
    default_timeout: Duration,
    io: XBeeIo,
    event_tx: broadcast::Sender<XBeeEvent>,
    nodes: Mutex<HashMap<String, NodeAddress>>,
    closed: AtomicBool,
}

impl XBee {
    /// Start the IO task on `transport`.
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        module: ModuleType,
        api_mode: ApiMode,
        default_timeout: Duration,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let io = spawn_io_task(transport, IoConfig { api_mode }, event_tx.clone());
        info!(module = %module, api_mode = api_mode.as_u8(), "XBee session started");

        XBee {
            module,
            default_timeout,
            io,
            event_tx,
            nodes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The radio family this session was opened for.
    pub fn module(&self) -> ModuleType {
        self.module
    }

    /// Timeout used when a command does not set its own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Subscribe to unsolicited frames and disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<XBeeEvent> {
        self.event_tx.subscribe()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run an AT command on the local module and return its data.
    ///
    /// ```no_run
    /// # async fn example(xbee: &xbeelib::XBee) -> xbeelib::Result<()> {
    /// use xbeelib::LocalCommand;
    ///
    /// let name = xbee.local_command(LocalCommand::new("NI")).await?;
    /// println!("{}", String::from_utf8_lossy(&name));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn local_command(&self, request: LocalCommand) -> Result<Vec<u8>> {
        let command = AtCommand::new(&request.command)?;
        let timeout = self.resolve_timeout(request.timeout)?;

        debug!(command = %command, "local AT command");
        let frame = commands::cmd_local_at(command, &request.parameter);
        let response = self.io.request(frame, timeout).await?;
        commands::parse_command_data(response)
    }

    /// Send a local AT command with frame ID 0.
    ///
    /// The module sends no response, so this resolves once the frame has
    /// been written. Useful for `AC` or to set parameters in bulk.
    pub async fn local_command_no_wait(&self, request: LocalCommand) -> Result<()> {
        let command = AtCommand::new(&request.command)?;

        debug!(command = %command, "local AT command, no response");
        let frame = commands::cmd_local_at(command, &request.parameter);
        self.io.send(frame).await
    }

    /// Run an AT command on a remote module and return its data.
    pub async fn remote_command(&self, request: RemoteCommand) -> Result<Vec<u8>> {
        request.destination.validate()?;
        let command = AtCommand::new(&request.command)?;
        let timeout = self.resolve_timeout(request.timeout)?;

        let address = self.resolve(&request.destination, timeout).await?;
        debug!(command = %command, destination = %request.destination, "remote AT command");
        let frame = commands::cmd_remote_at(address, command, &request.parameter);
        let response = self.io.request(frame, timeout).await?;
        commands::parse_command_data(response)
    }

    /// Transmit data to a remote module.
    ///
    /// Resolves to `true` once the module reports delivery; a failed
    /// delivery is [`Error::DeliveryFailed`](crate::Error::DeliveryFailed).
    pub async fn remote_transmit(&self, request: RemoteTransmit) -> Result<bool> {
        request.destination.validate()?;
        request.validate_data()?;
        let timeout = self.resolve_timeout(request.timeout)?;

        let address = self.resolve(&request.destination, timeout).await?;
        debug!(
            destination = %request.destination,
            bytes = request.data.len(),
            "remote transmit"
        );
        let frame = commands::cmd_transmit(self.module, address, &request.data);
        let response = self.io.request(frame, timeout).await?;
        commands::parse_transmit_status(response)
    }

    /// Find a node by its node identifier (`NI`).
    ///
    /// Results are cached for the lifetime of the session; a cached
    /// address is returned without touching the radio.
    pub async fn lookup(
        &self,
        node_identifier: &str,
        timeout: Option<Duration>,
    ) -> Result<NodeAddress> {
        commands::validate_node_identifier(node_identifier)?;
        let timeout = self.resolve_timeout(timeout)?;

        if let Some(address) = self.nodes.lock().await.get(node_identifier) {
            return Ok(*address);
        }

        debug!(node = %node_identifier, "node discovery");
        let frame = commands::cmd_node_discover(node_identifier)?;
        let response = self.io.request(frame, timeout).await?;
        let data = commands::parse_command_data(response)?;
        let address = commands::parse_node_discover_response(&data)?;

        debug!(
            node = %node_identifier,
            address64 = format_args!("{:016X}", address.address64),
            address16 = format_args!("{:04X}", address.address16),
            "node found"
        );
        self.nodes
            .lock()
            .await
            .insert(node_identifier.to_string(), address);
        Ok(address)
    }

    /// Forget cached node addresses.
    pub async fn clear_node_cache(&self) {
        self.nodes.lock().await.clear();
    }

    /// Close the session.
    ///
    /// Outstanding requests are rejected with
    /// [`Error::Closed`](crate::Error::Closed) and the transport is closed.
    /// Later commands fail with `Closed` immediately.
    /// Calling `close` again does nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.io.shutdown().await;
        info!("XBee session closed");
    }

    fn resolve_timeout(&self, timeout: Option<Duration>) -> Result<Duration> {
        match timeout {
            Some(timeout) => {
                check_timeout("timeout", timeout)?;
                Ok(timeout)
            }
            None => Ok(self.default_timeout),
        }
    }

    async fn resolve(&self, destination: &Destination, timeout: Duration) -> Result<NodeAddress> {
        match destination {
            Destination::NodeId(id) => self.lookup(id, Some(timeout)).await,
            Destination::Address64(address) => Ok(NodeAddress::from_64(*address)),
            Destination::Address16(address) => Ok(NodeAddress::from_16(*address)),
        }
    }
}

impl Drop for XBee {
    fn drop(&mut self) {
        self.io.cancel.cancel();
    }
}
