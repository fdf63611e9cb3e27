//! xbeelib-core: Core traits, types, errors, and the frame correlation
//! engine for xbeelib.
//!
//! An XBee module answers commands asynchronously on the same serial link
//! that carries everything else. Each request carries a one-byte frame ID
//! and the module echoes it in the response. This crate holds the
//! protocol-agnostic machinery that matches the two up.
//!
//! # Key types
//!
//! - [`Correlator`] -- allocates frame IDs, tracks pending requests, and
//!   resolves them from inbound frames, timeouts, and transport failures
//! - [`FrameIdAllocator`], [`Registry`], [`TimeoutScheduler`] -- its parts
//! - [`Transport`] -- byte-level communication channel
//! - [`Error`] / [`Result`] -- error handling

pub mod allocator;
pub mod completion;
pub mod correlator;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use allocator::FrameIdAllocator;
pub use completion::{Completion, Reply, ResponseFuture};
pub use correlator::{Begun, Classifier, Correlator, Dispatch};
pub use error::{Error, Result};
pub use registry::{PendingRequest, Registry};
pub use scheduler::{TimeoutScheduler, TimerHandle};
pub use transport::Transport;
pub use types::{Correlated, FrameId};
