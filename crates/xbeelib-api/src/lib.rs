//! XBee API protocol support for xbeelib.
//!
//! This crate is the pure protocol layer: it turns logical frames into
//! bytes and bytes back into frames, with no knowledge of which request
//! a response belongs to.
//!
//! - **Frame model** ([`frame`]) -- [`ApiFrame`] with one variant per API
//!   frame type, AT command names, and status tables.
//! - **Envelope codec** ([`codec`]) -- start delimiter, length, checksum,
//!   API mode 2 escaping, and an incremental [`FrameDecoder`].
//!
//! # Example
//!
//! ```
//! use xbeelib_api::codec::{decode_frame, encode_frame, ApiMode, DecodeResult};
//! use xbeelib_api::frame::{ApiFrame, AtCommand};
//!
//! let request = ApiFrame::AtCommand {
//!     frame_id: 1,
//!     command: AtCommand::new("NI").unwrap(),
//!     parameter: vec![],
//! };
//! let bytes = encode_frame(&request, ApiMode::Escaped);
//!
//! if let DecodeResult::Frame(frame, _) = decode_frame(&bytes, ApiMode::Escaped) {
//!     assert_eq!(frame, request);
//! }
//! ```

pub mod codec;
pub mod frame;

pub use codec::{ApiMode, DecodeResult, FrameDecoder, decode_frame, encode_frame};
pub use frame::{ApiFrame, AtCommand, AtStatus};
