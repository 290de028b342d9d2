//! Transport traits for device communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a device. The
//! TCP implementation lives in `avctl-transport`; `avctl-test-harness`
//! provides a scripted mock so the command codecs and device adapters can be
//! tested without hardware.
//!
//! A [`Dialer`] opens fresh transports on demand. Connection pools hold a
//! dialer rather than an address so that tests can hand out mock transports
//! through the same path production code uses for TCP.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
///
/// Implementations handle buffering and error mapping at the socket layer.
/// Framing (line terminators, XML records) is handled by the codecs that
/// consume this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Opens new [`Transport`]s to one device endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a new connection.
    async fn dial(&self) -> Result<Box<dyn Transport>>;

    /// A label for logging, typically `host:port`.
    fn target(&self) -> &str;
}
