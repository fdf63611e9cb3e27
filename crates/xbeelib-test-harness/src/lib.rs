//! xbeelib-test-harness: Test utilities and mock transports for xbeelib.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! IO task and command façade without a radio attached, plus
//! [`MockHandle`] for driving it from the test side.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
