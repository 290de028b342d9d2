//! avctl-test-harness: Test utilities and mock transports for avctl.
//!
//! This crate provides [`MockTransport`] / [`MockDialer`] for deterministic
//! unit testing of the Kramer adapters without real hardware, and
//! [`MockTcpServer`] for testing the VIA client and monitor over real
//! loopback sockets.

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::{MockSession, MockTcpServer};
pub use mock_transport::{MockDialer, MockProbe, MockTransport};
