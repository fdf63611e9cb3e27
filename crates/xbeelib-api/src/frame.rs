//! XBee API frame model.
//!
//! Each variant of [`ApiFrame`] is one frame type of the XBee API. The
//! frame data (type byte plus body) is produced by [`ApiFrame::to_bytes`]
//! and parsed by [`ApiFrame::parse`]; the envelope (start delimiter,
//! length, checksum, escaping) lives in [`codec`](crate::codec).
//!
//! All multi-byte fields are big-endian on the wire.

use std::fmt;

use bytes::{BufMut, BytesMut};
use xbeelib_core::{Correlated, Error, FrameId, Result};

/// Frame type bytes.
pub mod frame_type {
    pub const TX_REQUEST_64: u8 = 0x00;
    pub const TX_REQUEST_16: u8 = 0x01;
    pub const AT_COMMAND: u8 = 0x08;
    pub const AT_COMMAND_QUEUE: u8 = 0x09;
    pub const TRANSMIT_REQUEST: u8 = 0x10;
    pub const REMOTE_AT_COMMAND: u8 = 0x17;
    pub const RX_64: u8 = 0x80;
    pub const RX_16: u8 = 0x81;
    pub const AT_COMMAND_RESPONSE: u8 = 0x88;
    pub const TX_STATUS: u8 = 0x89;
    pub const MODEM_STATUS: u8 = 0x8A;
    pub const TRANSMIT_STATUS: u8 = 0x8B;
    pub const RECEIVE_PACKET: u8 = 0x90;
    pub const NODE_IDENTIFICATION: u8 = 0x95;
    pub const REMOTE_AT_COMMAND_RESPONSE: u8 = 0x97;
}

/// 64-bit broadcast address.
pub const BROADCAST_64: u64 = 0x0000_0000_0000_FFFF;

/// 16-bit address meaning "unknown, use the 64-bit address".
pub const UNKNOWN_16: u16 = 0xFFFE;

/// Remote AT option: apply changes immediately.
pub const REMOTE_APPLY_CHANGES: u8 = 0x02;

/// A two-character AT command name such as `NI` or `DN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtCommand([u8; 2]);

impl AtCommand {
    /// Parse an AT command name. Must be exactly two printable ASCII
    /// characters.
    pub fn new(name: &str) -> Result<Self> {
        match name.as_bytes() {
            [a, b] if a.is_ascii_graphic() && b.is_ascii_graphic() => Ok(AtCommand([*a, *b])),
            _ => Err(Error::Validation(format!(
                "AT command must be two ASCII characters, got {:?}",
                name
            ))),
        }
    }

    /// The raw two bytes.
    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

/// Status byte of an AT command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtStatus {
    Ok,
    Error,
    InvalidCommand,
    InvalidParameter,
    /// The remote module never received the command (remote AT only).
    TransmissionFailed,
    Unknown(u8),
}

impl From<u8> for AtStatus {
    fn from(b: u8) -> Self {
        match b {
            0 => AtStatus::Ok,
            1 => AtStatus::Error,
            2 => AtStatus::InvalidCommand,
            3 => AtStatus::InvalidParameter,
            4 => AtStatus::TransmissionFailed,
            other => AtStatus::Unknown(other),
        }
    }
}

impl From<AtStatus> for u8 {
    fn from(s: AtStatus) -> Self {
        match s {
            AtStatus::Ok => 0,
            AtStatus::Error => 1,
            AtStatus::InvalidCommand => 2,
            AtStatus::InvalidParameter => 3,
            AtStatus::TransmissionFailed => 4,
            AtStatus::Unknown(other) => other,
        }
    }
}

impl fmt::Display for AtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtStatus::Ok => write!(f, "OK"),
            AtStatus::Error => write!(f, "ERROR"),
            AtStatus::InvalidCommand => write!(f, "invalid command"),
            AtStatus::InvalidParameter => write!(f, "invalid parameter"),
            AtStatus::TransmissionFailed => write!(f, "remote command transmission failed"),
            AtStatus::Unknown(b) => write!(f, "unknown status 0x{:02X}", b),
        }
    }
}

/// Describe an 802.15.4 TX status (frame 0x89) byte.
pub fn tx_status_description(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0x01 => "no ACK received",
        0x02 => "CCA failure",
        0x03 => "purged",
        _ => "unknown TX status",
    }
}

/// Describe a ZigBee/ZNet delivery status (frame 0x8B) byte.
pub fn delivery_status_description(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0x01 => "MAC ACK failure",
        0x02 => "CCA failure",
        0x15 => "invalid destination endpoint",
        0x21 => "network ACK failure",
        0x22 => "not joined to network",
        0x23 => "self-addressed",
        0x24 => "address not found",
        0x25 => "route not found",
        0x26 => "broadcast source failed to hear a neighbor relay the message",
        0x2B => "invalid binding table index",
        0x2C => "resource error: lack of free buffers, timers, etc.",
        0x2D => "attempted broadcast with APS transmission",
        0x2E => "attempted unicast with APS transmission, but EE=0",
        0x32 => "resource error: lack of free buffers, timers, etc.",
        0x74 => "data payload too large",
        _ => "unknown delivery status",
    }
}

/// One XBee API frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFrame {
    /// 802.15.4 transmit to a 64-bit address.
    TxRequest64 {
        frame_id: u8,
        destination64: u64,
        options: u8,
        data: Vec<u8>,
    },
    /// 802.15.4 transmit to a 16-bit address.
    TxRequest16 {
        frame_id: u8,
        destination16: u16,
        options: u8,
        data: Vec<u8>,
    },
    /// Local AT command, applied immediately.
    AtCommand {
        frame_id: u8,
        command: AtCommand,
        parameter: Vec<u8>,
    },
    /// Local AT command, queued until `AC` or a non-queued command.
    AtCommandQueue {
        frame_id: u8,
        command: AtCommand,
        parameter: Vec<u8>,
    },
    /// ZigBee/ZNet transmit request.
    TransmitRequest {
        frame_id: u8,
        destination64: u64,
        destination16: u16,
        broadcast_radius: u8,
        options: u8,
        data: Vec<u8>,
    },
    /// AT command executed on a remote module.
    RemoteAtCommand {
        frame_id: u8,
        destination64: u64,
        destination16: u16,
        options: u8,
        command: AtCommand,
        parameter: Vec<u8>,
    },
    /// 802.15.4 data received from a 64-bit source.
    Rx64 {
        source64: u64,
        rssi: u8,
        options: u8,
        data: Vec<u8>,
    },
    /// 802.15.4 data received from a 16-bit source.
    Rx16 {
        source16: u16,
        rssi: u8,
        options: u8,
        data: Vec<u8>,
    },
    /// Response to a local AT command.
    AtCommandResponse {
        frame_id: u8,
        command: AtCommand,
        status: AtStatus,
        data: Vec<u8>,
    },
    /// 802.15.4 transmit status.
    TxStatus { frame_id: u8, status: u8 },
    /// Modem status (reset, joined, etc.).
    ModemStatus { status: u8 },
    /// ZigBee/ZNet transmit status.
    TransmitStatus {
        frame_id: u8,
        destination16: u16,
        retry_count: u8,
        delivery_status: u8,
        discovery_status: u8,
    },
    /// ZigBee/ZNet data received.
    ReceivePacket {
        source64: u64,
        source16: u16,
        options: u8,
        data: Vec<u8>,
    },
    /// A node announced itself (commissioning button, join).
    NodeIdentification {
        source64: u64,
        source16: u16,
        options: u8,
        remote16: u16,
        remote64: u64,
        node_identifier: String,
        /// Parent address, device type, event, profile and manufacturer IDs.
        trailer: Vec<u8>,
    },
    /// Response to a remote AT command.
    RemoteAtCommandResponse {
        frame_id: u8,
        source64: u64,
        source16: u16,
        command: AtCommand,
        status: AtStatus,
        data: Vec<u8>,
    },
    /// A frame type this crate does not model.
    Unknown { frame_type: u8, data: Vec<u8> },
}

impl ApiFrame {
    /// The frame type byte.
    pub fn frame_type(&self) -> u8 {
        use frame_type::*;
        match self {
            ApiFrame::TxRequest64 { .. } => TX_REQUEST_64,
            ApiFrame::TxRequest16 { .. } => TX_REQUEST_16,
            ApiFrame::AtCommand { .. } => AT_COMMAND,
            ApiFrame::AtCommandQueue { .. } => AT_COMMAND_QUEUE,
            ApiFrame::TransmitRequest { .. } => TRANSMIT_REQUEST,
            ApiFrame::RemoteAtCommand { .. } => REMOTE_AT_COMMAND,
            ApiFrame::Rx64 { .. } => RX_64,
            ApiFrame::Rx16 { .. } => RX_16,
            ApiFrame::AtCommandResponse { .. } => AT_COMMAND_RESPONSE,
            ApiFrame::TxStatus { .. } => TX_STATUS,
            ApiFrame::ModemStatus { .. } => MODEM_STATUS,
            ApiFrame::TransmitStatus { .. } => TRANSMIT_STATUS,
            ApiFrame::ReceivePacket { .. } => RECEIVE_PACKET,
            ApiFrame::NodeIdentification { .. } => NODE_IDENTIFICATION,
            ApiFrame::RemoteAtCommandResponse { .. } => REMOTE_AT_COMMAND_RESPONSE,
            ApiFrame::Unknown { frame_type, .. } => *frame_type,
        }
    }

    /// Return a copy of an outgoing request with its frame ID replaced.
    ///
    /// Frames without a frame ID field are returned unchanged.
    pub fn with_frame_id(mut self, id: FrameId) -> Self {
        match &mut self {
            ApiFrame::TxRequest64 { frame_id, .. }
            | ApiFrame::TxRequest16 { frame_id, .. }
            | ApiFrame::AtCommand { frame_id, .. }
            | ApiFrame::AtCommandQueue { frame_id, .. }
            | ApiFrame::TransmitRequest { frame_id, .. }
            | ApiFrame::RemoteAtCommand { frame_id, .. }
            | ApiFrame::AtCommandResponse { frame_id, .. }
            | ApiFrame::TxStatus { frame_id, .. }
            | ApiFrame::TransmitStatus { frame_id, .. }
            | ApiFrame::RemoteAtCommandResponse { frame_id, .. } => *frame_id = id.get(),
            _ => {}
        }
        self
    }

    /// Serialize the frame data (type byte followed by the body).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(self.frame_type());
        match self {
            ApiFrame::TxRequest64 {
                frame_id,
                destination64,
                options,
                data,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u64(*destination64);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::TxRequest16 {
                frame_id,
                destination16,
                options,
                data,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u16(*destination16);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::AtCommand {
                frame_id,
                command,
                parameter,
            }
            | ApiFrame::AtCommandQueue {
                frame_id,
                command,
                parameter,
            } => {
                buf.put_u8(*frame_id);
                buf.put_slice(&command.as_bytes());
                buf.put_slice(parameter);
            }
            ApiFrame::TransmitRequest {
                frame_id,
                destination64,
                destination16,
                broadcast_radius,
                options,
                data,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u64(*destination64);
                buf.put_u16(*destination16);
                buf.put_u8(*broadcast_radius);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::RemoteAtCommand {
                frame_id,
                destination64,
                destination16,
                options,
                command,
                parameter,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u64(*destination64);
                buf.put_u16(*destination16);
                buf.put_u8(*options);
                buf.put_slice(&command.as_bytes());
                buf.put_slice(parameter);
            }
            ApiFrame::Rx64 {
                source64,
                rssi,
                options,
                data,
            } => {
                buf.put_u64(*source64);
                buf.put_u8(*rssi);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::Rx16 {
                source16,
                rssi,
                options,
                data,
            } => {
                buf.put_u16(*source16);
                buf.put_u8(*rssi);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::AtCommandResponse {
                frame_id,
                command,
                status,
                data,
            } => {
                buf.put_u8(*frame_id);
                buf.put_slice(&command.as_bytes());
                buf.put_u8((*status).into());
                buf.put_slice(data);
            }
            ApiFrame::TxStatus { frame_id, status } => {
                buf.put_u8(*frame_id);
                buf.put_u8(*status);
            }
            ApiFrame::ModemStatus { status } => buf.put_u8(*status),
            ApiFrame::TransmitStatus {
                frame_id,
                destination16,
                retry_count,
                delivery_status,
                discovery_status,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u16(*destination16);
                buf.put_u8(*retry_count);
                buf.put_u8(*delivery_status);
                buf.put_u8(*discovery_status);
            }
            ApiFrame::ReceivePacket {
                source64,
                source16,
                options,
                data,
            } => {
                buf.put_u64(*source64);
                buf.put_u16(*source16);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            ApiFrame::NodeIdentification {
                source64,
                source16,
                options,
                remote16,
                remote64,
                node_identifier,
                trailer,
            } => {
                buf.put_u64(*source64);
                buf.put_u16(*source16);
                buf.put_u8(*options);
                buf.put_u16(*remote16);
                buf.put_u64(*remote64);
                buf.put_slice(node_identifier.as_bytes());
                buf.put_u8(0);
                buf.put_slice(trailer);
            }
            ApiFrame::RemoteAtCommandResponse {
                frame_id,
                source64,
                source16,
                command,
                status,
                data,
            } => {
                buf.put_u8(*frame_id);
                buf.put_u64(*source64);
                buf.put_u16(*source16);
                buf.put_slice(&command.as_bytes());
                buf.put_u8((*status).into());
                buf.put_slice(data);
            }
            ApiFrame::Unknown { data, .. } => buf.put_slice(data),
        }
        buf.to_vec()
    }

    /// Parse frame data (type byte followed by the body).
    ///
    /// Unrecognised frame types become [`ApiFrame::Unknown`]; a body too
    /// short for its type is a protocol error.
    pub fn parse(frame_data: &[u8]) -> Result<ApiFrame> {
        use frame_type::*;

        let (&frame_type, body) = frame_data
            .split_first()
            .ok_or_else(|| Error::Protocol("empty frame data".into()))?;
        let mut r = Reader::new(body, frame_type);

        let frame = match frame_type {
            TX_REQUEST_64 => ApiFrame::TxRequest64 {
                frame_id: r.u8()?,
                destination64: r.u64()?,
                options: r.u8()?,
                data: r.rest(),
            },
            TX_REQUEST_16 => ApiFrame::TxRequest16 {
                frame_id: r.u8()?,
                destination16: r.u16()?,
                options: r.u8()?,
                data: r.rest(),
            },
            AT_COMMAND => ApiFrame::AtCommand {
                frame_id: r.u8()?,
                command: r.command()?,
                parameter: r.rest(),
            },
            AT_COMMAND_QUEUE => ApiFrame::AtCommandQueue {
                frame_id: r.u8()?,
                command: r.command()?,
                parameter: r.rest(),
            },
            TRANSMIT_REQUEST => ApiFrame::TransmitRequest {
                frame_id: r.u8()?,
                destination64: r.u64()?,
                destination16: r.u16()?,
                broadcast_radius: r.u8()?,
                options: r.u8()?,
                data: r.rest(),
            },
            REMOTE_AT_COMMAND => ApiFrame::RemoteAtCommand {
                frame_id: r.u8()?,
                destination64: r.u64()?,
                destination16: r.u16()?,
                options: r.u8()?,
                command: r.command()?,
                parameter: r.rest(),
            },
            RX_64 => ApiFrame::Rx64 {
                source64: r.u64()?,
                rssi: r.u8()?,
                options: r.u8()?,
                data: r.rest(),
            },
            RX_16 => ApiFrame::Rx16 {
                source16: r.u16()?,
                rssi: r.u8()?,
                options: r.u8()?,
                data: r.rest(),
            },
            AT_COMMAND_RESPONSE => ApiFrame::AtCommandResponse {
                frame_id: r.u8()?,
                command: r.command()?,
                status: r.u8()?.into(),
                data: r.rest(),
            },
            TX_STATUS => ApiFrame::TxStatus {
                frame_id: r.u8()?,
                status: r.u8()?,
            },
            MODEM_STATUS => ApiFrame::ModemStatus { status: r.u8()? },
            TRANSMIT_STATUS => ApiFrame::TransmitStatus {
                frame_id: r.u8()?,
                destination16: r.u16()?,
                retry_count: r.u8()?,
                delivery_status: r.u8()?,
                discovery_status: r.u8()?,
            },
            RECEIVE_PACKET => ApiFrame::ReceivePacket {
                source64: r.u64()?,
                source16: r.u16()?,
                options: r.u8()?,
                data: r.rest(),
            },
            NODE_IDENTIFICATION => ApiFrame::NodeIdentification {
                source64: r.u64()?,
                source16: r.u16()?,
                options: r.u8()?,
                remote16: r.u16()?,
                remote64: r.u64()?,
                node_identifier: r.c_string(),
                trailer: r.rest(),
            },
            REMOTE_AT_COMMAND_RESPONSE => ApiFrame::RemoteAtCommandResponse {
                frame_id: r.u8()?,
                source64: r.u64()?,
                source16: r.u16()?,
                command: r.command()?,
                status: r.u8()?.into(),
                data: r.rest(),
            },
            other => ApiFrame::Unknown {
                frame_type: other,
                data: body.to_vec(),
            },
        };
        Ok(frame)
    }
}

impl Correlated for ApiFrame {
    /// Only response frames answer a request; requests and received data
    /// carry no correlation token.
    fn frame_id(&self) -> Option<FrameId> {
        match self {
            ApiFrame::AtCommandResponse { frame_id, .. }
            | ApiFrame::TxStatus { frame_id, .. }
            | ApiFrame::TransmitStatus { frame_id, .. }
            | ApiFrame::RemoteAtCommandResponse { frame_id, .. } => Some(FrameId(*frame_id)),
            _ => None,
        }
    }
}

/// Bounds-checked big-endian reader over a frame body.
struct Reader<'a> {
    buf: &'a [u8],
    frame_type: u8,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], frame_type: u8) -> Self {
        Reader { buf, frame_type }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::Protocol(format!(
                "frame 0x{:02X} truncated: needed {} more bytes, have {}",
                self.frame_type,
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    fn command(&mut self) -> Result<AtCommand> {
        let b = self.take(2)?;
        Ok(AtCommand([b[0], b[1]]))
    }

    /// Null-terminated string; consumes the terminator if present.
    fn c_string(&mut self) -> String {
        let end = self.buf.iter().position(|&b| b == 0).unwrap_or(self.buf.len());
        let s = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf = &self.buf[(end + 1).min(self.buf.len())..];
        s
    }

    fn rest(&mut self) -> Vec<u8> {
        let rest = self.buf.to_vec();
        self.buf = &[];
        rest
    }
}
