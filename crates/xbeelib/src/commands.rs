//! XBee command builders, response classification, and response parsers.
//!
//! The request types ([`LocalCommand`], [`RemoteCommand`],
//! [`RemoteTransmit`]) describe what a caller wants; the `cmd_*` functions
//! turn a validated request into an [`ApiFrame`] with a zero frame ID,
//! ready for the IO task to stamp with an allocated identifier.
//!
//! [`classify_response`] is the correlator's classifier: it decides
//! whether a matched response frame means success or failure.
//!
//! Nothing here performs I/O.

use std::fmt;
use std::time::Duration;

use xbeelib_api::frame::{
    REMOTE_APPLY_CHANGES, UNKNOWN_16, delivery_status_description, tx_status_description,
};
use xbeelib_api::{ApiFrame, AtCommand, AtStatus};
use xbeelib_core::{Error, Result};

use crate::options::ModuleType;

/// 64-bit address meaning "unknown, address by the 16-bit one".
pub const UNKNOWN_64: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Largest payload accepted by [`RemoteTransmit`].
pub const MAX_TRANSMIT_DATA: usize = 255;

/// Longest node identifier (`NI`) a module stores.
pub const MAX_NODE_IDENTIFIER: usize = 20;

/// Node discover command, used to resolve a node identifier.
const CMD_NODE_DISCOVER: &str = "DN";

/// Broadcast radius for transmit requests; 0 selects the network maximum.
const BROADCAST_RADIUS_MAX_HOPS: u8 = 0x00;

/// Transmit options: none.
const TX_OPTIONS_NONE: u8 = 0x00;

// ---------------------------------------------------------------
// Request types
// ---------------------------------------------------------------

/// Where a remote command or transmit goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A node identifier (`NI` string), resolved with a `DN` lookup.
    NodeId(String),
    /// A 64-bit serial number address.
    Address64(u64),
    /// A 16-bit network address.
    Address16(u16),
}

impl Destination {
    /// Check the destination is well-formed.
    pub fn validate(&self) -> Result<()> {
        match self {
            Destination::NodeId(id) => validate_node_identifier(id),
            Destination::Address64(_) | Destination::Address16(_) => Ok(()),
        }
    }
}

impl From<u64> for Destination {
    fn from(address: u64) -> Self {
        Destination::Address64(address)
    }
}

impl From<u16> for Destination {
    fn from(address: u16) -> Self {
        Destination::Address16(address)
    }
}

impl From<&str> for Destination {
    fn from(node_identifier: &str) -> Self {
        Destination::NodeId(node_identifier.to_string())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::NodeId(id) => write!(f, "node '{}'", id),
            Destination::Address64(a) => write!(f, "0x{:016X}", a),
            Destination::Address16(a) => write!(f, "0x{:04X}", a),
        }
    }
}

/// A resolved node address pair.
///
/// Unknown halves hold [`UNKNOWN_64`] or [`UNKNOWN_16`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub address64: u64,
    pub address16: u16,
}

impl NodeAddress {
    /// Address a node by its 64-bit address only.
    pub fn from_64(address64: u64) -> Self {
        NodeAddress {
            address64,
            address16: UNKNOWN_16,
        }
    }

    /// Address a node by its 16-bit address only.
    pub fn from_16(address16: u16) -> Self {
        NodeAddress {
            address64: UNKNOWN_64,
            address16,
        }
    }
}

/// An AT command for the locally attached module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCommand {
    /// Two-character command name, e.g. `"NI"`.
    pub command: String,
    /// Parameter bytes; empty to query.
    pub parameter: Vec<u8>,
    /// Response timeout; `None` uses the session default.
    pub timeout: Option<Duration>,
}

impl LocalCommand {
    /// Query (no parameter) with the session default timeout.
    pub fn new(command: &str) -> Self {
        LocalCommand {
            command: command.to_string(),
            parameter: Vec::new(),
            timeout: None,
        }
    }

    /// Set the parameter bytes.
    pub fn parameter(mut self, parameter: impl Into<Vec<u8>>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Override the response timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An AT command executed on a remote module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub destination: Destination,
    /// Two-character command name.
    pub command: String,
    /// Parameter bytes; empty to query.
    pub parameter: Vec<u8>,
    /// Response timeout; `None` uses the session default.
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    /// Query `command` on `destination`.
    pub fn new(destination: impl Into<Destination>, command: &str) -> Self {
        RemoteCommand {
            destination: destination.into(),
            command: command.to_string(),
            parameter: Vec::new(),
            timeout: None,
        }
    }

    /// Set the parameter bytes.
    pub fn parameter(mut self, parameter: impl Into<Vec<u8>>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Override the response timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Data sent to a remote module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTransmit {
    pub destination: Destination,
    /// Payload, 1 to [`MAX_TRANSMIT_DATA`] bytes.
    pub data: Vec<u8>,
    /// Timeout for the transmit status; `None` uses the session default.
    pub timeout: Option<Duration>,
}

impl RemoteTransmit {
    /// Send `data` to `destination`.
    pub fn new(destination: impl Into<Destination>, data: impl Into<Vec<u8>>) -> Self {
        RemoteTransmit {
            destination: destination.into(),
            data: data.into(),
            timeout: None,
        }
    }

    /// Override the status timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the payload size.
    pub fn validate_data(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::Validation("transmit data must not be empty".into()));
        }
        if self.data.len() > MAX_TRANSMIT_DATA {
            return Err(Error::Validation(format!(
                "transmit data is {} bytes, maximum is {}",
                self.data.len(),
                MAX_TRANSMIT_DATA
            )));
        }
        Ok(())
    }
}

/// A node identifier must be 1 to 20 printable ASCII characters.
pub fn validate_node_identifier(id: &str) -> Result<()> {
    let printable = id.bytes().all(|b| (b' '..=b'~').contains(&b));
    if id.is_empty() || id.len() > MAX_NODE_IDENTIFIER || !printable {
        return Err(Error::Validation(format!(
            "node identifier must be 1 to {} printable ASCII characters, got {:?}",
            MAX_NODE_IDENTIFIER, id
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------

/// Local AT command frame.
pub fn cmd_local_at(command: AtCommand, parameter: &[u8]) -> ApiFrame {
    ApiFrame::AtCommand {
        frame_id: 0,
        command,
        parameter: parameter.to_vec(),
    }
}

/// Remote AT command frame. Changes are applied immediately.
pub fn cmd_remote_at(address: NodeAddress, command: AtCommand, parameter: &[u8]) -> ApiFrame {
    ApiFrame::RemoteAtCommand {
        frame_id: 0,
        destination64: address.address64,
        destination16: address.address16,
        options: REMOTE_APPLY_CHANGES,
        command,
        parameter: parameter.to_vec(),
    }
}

/// Data transmit frame for the given radio family.
///
/// 802.15.4 modules get a 64-bit TX request unless only the 16-bit address
/// is known; ZNet and ZigBee modules get a transmit request carrying both.
pub fn cmd_transmit(module: ModuleType, address: NodeAddress, data: &[u8]) -> ApiFrame {
    if module.uses_transmit_request() {
        return ApiFrame::TransmitRequest {
            frame_id: 0,
            destination64: address.address64,
            destination16: address.address16,
            broadcast_radius: BROADCAST_RADIUS_MAX_HOPS,
            options: TX_OPTIONS_NONE,
            data: data.to_vec(),
        };
    }

    if address.address64 == UNKNOWN_64 {
        ApiFrame::TxRequest16 {
            frame_id: 0,
            destination16: address.address16,
            options: TX_OPTIONS_NONE,
            data: data.to_vec(),
        }
    } else {
        ApiFrame::TxRequest64 {
            frame_id: 0,
            destination64: address.address64,
            options: TX_OPTIONS_NONE,
            data: data.to_vec(),
        }
    }
}

/// Node discover (`DN`) for a node identifier.
pub fn cmd_node_discover(node_identifier: &str) -> Result<ApiFrame> {
    validate_node_identifier(node_identifier)?;
    Ok(cmd_local_at(
        AtCommand::new(CMD_NODE_DISCOVER)?,
        node_identifier.as_bytes(),
    ))
}

// ---------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------

/// Decide whether a correlated response frame reports success.
///
/// - AT and remote AT responses: status `OK` succeeds; a remote
///   transmission failure is [`Error::DeliveryFailed`]; any other status
///   is [`Error::CommandFailed`].
/// - 802.15.4 TX status: zero succeeds, anything else is `DeliveryFailed`.
/// - ZigBee transmit status: delivery status zero succeeds, anything else
///   is `DeliveryFailed`.
///
/// Other frames pass through unchanged.
pub fn classify_response(frame: ApiFrame) -> Result<ApiFrame> {
    match &frame {
        ApiFrame::AtCommandResponse {
            frame_id,
            command,
            status,
            ..
        }
        | ApiFrame::RemoteAtCommandResponse {
            frame_id,
            command,
            status,
            ..
        } => match status {
            AtStatus::Ok => Ok(frame),
            AtStatus::TransmissionFailed => Err(Error::DeliveryFailed {
                frame_id: *frame_id,
                status: u8::from(*status),
                reason: status.to_string(),
            }),
            _ => Err(Error::CommandFailed {
                command: command.to_string(),
                status: status.to_string(),
            }),
        },
        ApiFrame::TxStatus { frame_id, status } if *status != 0 => Err(Error::DeliveryFailed {
            frame_id: *frame_id,
            status: *status,
            reason: tx_status_description(*status).to_string(),
        }),
        ApiFrame::TransmitStatus {
            frame_id,
            delivery_status,
            ..
        } if *delivery_status != 0 => Err(Error::DeliveryFailed {
            frame_id: *frame_id,
            status: *delivery_status,
            reason: delivery_status_description(*delivery_status).to_string(),
        }),
        _ => Ok(frame),
    }
}

/// Extract the command data from a successful AT or remote AT response.
pub fn parse_command_data(frame: ApiFrame) -> Result<Vec<u8>> {
    match frame {
        ApiFrame::AtCommandResponse { data, .. }
        | ApiFrame::RemoteAtCommandResponse { data, .. } => Ok(data),
        other => Err(Error::Protocol(format!(
            "expected an AT command response, got frame type 0x{:02X}",
            other.frame_type()
        ))),
    }
}

/// Confirm a transmit status frame reports delivery.
///
/// The frame has already passed [`classify_response`], so a status frame
/// here means success.
pub fn parse_transmit_status(frame: ApiFrame) -> Result<bool> {
    match frame {
        ApiFrame::TxStatus { .. } | ApiFrame::TransmitStatus { .. } => Ok(true),
        other => Err(Error::Protocol(format!(
            "expected a transmit status, got frame type 0x{:02X}",
            other.frame_type()
        ))),
    }
}

/// Parse the data of a `DN` response.
///
/// Layout: `MY` (2 bytes), `SH` (4 bytes), `SL` (4 bytes), big-endian.
/// Some firmware appends further fields, which are ignored.
pub fn parse_node_discover_response(data: &[u8]) -> Result<NodeAddress> {
    if data.len() < 10 {
        return Err(Error::Protocol(format!(
            "node discover response too short: {} bytes, need 10",
            data.len()
        )));
    }
    let address16 = u16::from_be_bytes([data[0], data[1]]);
    let mut high = [0u8; 8];
    high.copy_from_slice(&data[2..10]);
    Ok(NodeAddress {
        address64: u64::from_be_bytes(high),
        address16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(name: &str) -> AtCommand {
        AtCommand::new(name).unwrap()
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    #[test]
    fn node_identifier_bounds() {
        assert!(validate_node_identifier("ROUTER 1").is_ok());
        assert!(validate_node_identifier(&"N".repeat(20)).is_ok());
        assert!(validate_node_identifier("").is_err());
        assert!(validate_node_identifier(&"N".repeat(21)).is_err());
        assert!(validate_node_identifier("tab\there").is_err());
        assert!(validate_node_identifier("caf\u{e9}").is_err());
    }

    #[test]
    fn destination_validation() {
        assert!(Destination::from("NODE").validate().is_ok());
        assert!(Destination::NodeId(String::new()).validate().is_err());
        assert!(Destination::from(0x0013_A200_4000_0001u64).validate().is_ok());
        assert!(Destination::from(0x1234u16).validate().is_ok());
    }

    #[test]
    fn transmit_data_bounds() {
        assert!(RemoteTransmit::new(1u64, vec![0u8; 1]).validate_data().is_ok());
        assert!(RemoteTransmit::new(1u64, vec![0u8; 255]).validate_data().is_ok());
        assert!(matches!(
            RemoteTransmit::new(1u64, Vec::new()).validate_data(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            RemoteTransmit::new(1u64, vec![0u8; 256]).validate_data(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn request_builders() {
        let cmd = LocalCommand::new("NI")
            .parameter(b"KITCHEN".to_vec())
            .timeout(Duration::from_secs(2));
        assert_eq!(cmd.command, "NI");
        assert_eq!(cmd.parameter, b"KITCHEN");
        assert_eq!(cmd.timeout, Some(Duration::from_secs(2)));

        let cmd = RemoteCommand::new("ROUTER", "D0").parameter([0x05]);
        assert_eq!(cmd.destination, Destination::NodeId("ROUTER".into()));
        assert_eq!(cmd.parameter, vec![0x05]);
        assert_eq!(cmd.timeout, None);
    }

    #[test]
    fn destination_display() {
        assert_eq!(Destination::from("A").to_string(), "node 'A'");
        assert_eq!(Destination::from(0x1234u16).to_string(), "0x1234");
        assert_eq!(
            Destination::from(0x0013_A200_4000_0001u64).to_string(),
            "0x0013A20040000001"
        );
    }

    // ---------------------------------------------------------------
    // Frame builders
    // ---------------------------------------------------------------

    #[test]
    fn local_at_frame() {
        let frame = cmd_local_at(at("NI"), b"X");
        assert_eq!(frame.to_bytes(), vec![0x08, 0x00, b'N', b'I', b'X']);
    }

    #[test]
    fn remote_at_frame_applies_changes() {
        let frame = cmd_remote_at(NodeAddress::from_64(0x0013_A200_4000_0001), at("D0"), &[0x04]);
        match frame {
            ApiFrame::RemoteAtCommand {
                destination64,
                destination16,
                options,
                ..
            } => {
                assert_eq!(destination64, 0x0013_A200_4000_0001);
                assert_eq!(destination16, UNKNOWN_16);
                assert_eq!(options, REMOTE_APPLY_CHANGES);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn transmit_frame_per_module() {
        let address = NodeAddress {
            address64: 0x0013_A200_4000_0001,
            address16: 0x1234,
        };
        assert!(matches!(
            cmd_transmit(ModuleType::ZigBee, address, b"hi"),
            ApiFrame::TransmitRequest { destination16: 0x1234, .. }
        ));
        assert!(matches!(
            cmd_transmit(ModuleType::ZNet, address, b"hi"),
            ApiFrame::TransmitRequest { .. }
        ));
        assert!(matches!(
            cmd_transmit(ModuleType::Series1, address, b"hi"),
            ApiFrame::TxRequest64 { destination64: 0x0013_A200_4000_0001, .. }
        ));
        assert!(matches!(
            cmd_transmit(ModuleType::Series1, NodeAddress::from_16(0x0001), b"hi"),
            ApiFrame::TxRequest16 { destination16: 0x0001, .. }
        ));
    }

    #[test]
    fn node_discover_frame() {
        let frame = cmd_node_discover("ROUTER").unwrap();
        assert_eq!(frame, cmd_local_at(at("DN"), b"ROUTER"));
        assert!(cmd_node_discover("").is_err());
    }

    // ---------------------------------------------------------------
    // Classification
    // ---------------------------------------------------------------

    fn at_response(status: AtStatus) -> ApiFrame {
        ApiFrame::AtCommandResponse {
            frame_id: 7,
            command: at("NI"),
            status,
            data: b"NODE".to_vec(),
        }
    }

    #[test]
    fn at_ok_passes() {
        let frame = classify_response(at_response(AtStatus::Ok)).unwrap();
        assert_eq!(parse_command_data(frame).unwrap(), b"NODE");
    }

    #[test]
    fn at_error_is_command_failed() {
        match classify_response(at_response(AtStatus::InvalidParameter)) {
            Err(Error::CommandFailed { command, status }) => {
                assert_eq!(command, "NI");
                assert_eq!(status, "invalid parameter");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn remote_transmission_failure_is_delivery_failed() {
        let frame = ApiFrame::RemoteAtCommandResponse {
            frame_id: 3,
            source64: 1,
            source16: 2,
            command: at("D0"),
            status: AtStatus::TransmissionFailed,
            data: Vec::new(),
        };
        assert!(matches!(
            classify_response(frame),
            Err(Error::DeliveryFailed { frame_id: 3, status: 4, .. })
        ));
    }

    #[test]
    fn tx_status_classification() {
        let ok = ApiFrame::TxStatus { frame_id: 1, status: 0 };
        assert!(parse_transmit_status(classify_response(ok).unwrap()).unwrap());

        let no_ack = ApiFrame::TxStatus { frame_id: 1, status: 1 };
        match classify_response(no_ack) {
            Err(Error::DeliveryFailed { status, reason, .. }) => {
                assert_eq!(status, 1);
                assert_eq!(reason, "no ACK received");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn transmit_status_classification() {
        let status = |delivery_status| ApiFrame::TransmitStatus {
            frame_id: 9,
            destination16: 0xFFFE,
            retry_count: 0,
            delivery_status,
            discovery_status: 0,
        };
        assert!(classify_response(status(0x00)).is_ok());
        match classify_response(status(0x24)) {
            Err(Error::DeliveryFailed { frame_id, reason, .. }) => {
                assert_eq!(frame_id, 9);
                assert_eq!(reason, "address not found");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn wrong_frame_kind_is_protocol_error() {
        let modem = ApiFrame::ModemStatus { status: 0 };
        assert!(matches!(parse_command_data(modem.clone()), Err(Error::Protocol(_))));
        assert!(matches!(parse_transmit_status(modem), Err(Error::Protocol(_))));
    }

    #[test]
    fn node_discover_response() {
        let data = [
            0x12, 0x34, 0x00, 0x13, 0xA2, 0x00, 0x40, 0x0A, 0x0B, 0x0C, b'R',
        ];
        let address = parse_node_discover_response(&data).unwrap();
        assert_eq!(address.address16, 0x1234);
        assert_eq!(address.address64, 0x0013_A200_400A_0B0C);

        assert!(matches!(
            parse_node_discover_response(&data[..9]),
            Err(Error::Protocol(_))
        ));
    }
}
