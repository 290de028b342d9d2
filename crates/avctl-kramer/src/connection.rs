//! Pooled command execution against one Kramer device.
//!
//! [`KramerConnection`] pairs a [`ConnectionPool`] with the exchange timing
//! and applies the rules every Kramer reply shares: the `ERR` token check,
//! and dropping the socket whenever an exchange fails mid-stream.

use std::sync::Arc;

use tracing::{debug, warn};

use avctl_core::error::{Error, Result};
use avctl_core::transport::Dialer;
use avctl_core::types::Endpoint;
use avctl_text_io::exchange::{ExchangeConfig, exchange};
use avctl_text_io::protocol::check_error;
use avctl_transport::{ConnectionPool, PoolConfig, PoolGuard};

/// Serialized command channel to one Kramer endpoint.
pub struct KramerConnection {
    endpoint: Endpoint,
    pool: ConnectionPool,
    exchange: ExchangeConfig,
}

impl KramerConnection {
    pub fn new(
        endpoint: Endpoint,
        dialer: Arc<dyn Dialer>,
        pool: PoolConfig,
        exchange: ExchangeConfig,
    ) -> Self {
        KramerConnection {
            endpoint,
            pool: ConnectionPool::new(dialer, pool),
            exchange,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one command and return its (error-checked) single-frame reply.
    pub async fn command(&self, cmd: &[u8]) -> Result<String> {
        self.session().await?.command(cmd, 1).await
    }

    /// Take the connection for a sequence of exchanges that must not be
    /// interleaved with other callers, such as read-compare-write.
    pub async fn session(&self) -> Result<KramerSession<'_>> {
        let guard = self.pool.acquire().await?;
        Ok(KramerSession {
            guard: Some(guard),
            exchange: &self.exchange,
            address: self.endpoint.address(),
        })
    }

    /// Close the pooled socket, if one is open.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Bytes received but not yet consumed as a frame.
    #[cfg(test)]
    pub(crate) async fn buffered(&self) -> usize {
        match self.pool.acquire().await {
            Ok(mut guard) => guard.read_buf().len(),
            Err(_) => 0,
        }
    }
}

/// Exclusive use of a Kramer connection for one or more exchanges.
///
/// A transport failure closes the socket; later commands on the same
/// session fail with [`Error::NotConnected`].
pub struct KramerSession<'a> {
    guard: Option<PoolGuard<'a>>,
    exchange: &'a ExchangeConfig,
    address: &'a str,
}

impl KramerSession<'_> {
    /// Send `cmd`, read `frames` reply frames and check the first for `ERR`.
    pub async fn command(&mut self, cmd: &[u8], frames: usize) -> Result<String> {
        let guard = self.guard.as_mut().ok_or(Error::NotConnected)?;
        let (transport, pending) = guard.parts();

        match exchange(transport, pending, cmd, frames, self.exchange).await {
            Ok(reply) => {
                check_error(cmd, &reply)?;
                Ok(reply)
            }
            Err(e) => {
                if e.is_transport() || matches!(e, Error::Malformed(_)) {
                    warn!(addr = %self.address, error = %e, "exchange failed, dropping connection");
                    if let Some(guard) = self.guard.take() {
                        guard.invalidate().await;
                    }
                } else {
                    debug!(addr = %self.address, error = %e, "exchange failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avctl_core::types::Family;
    use avctl_test_harness::{MockDialer, MockTransport};
    use std::time::Duration;

    fn connection(transports: Vec<MockTransport>) -> (KramerConnection, Arc<MockDialer>) {
        let dialer = Arc::new(MockDialer::new(transports));
        let conn = KramerConnection::new(
            Endpoint::new("10.0.0.5", Family::MatrixSwitcher),
            dialer.clone(),
            PoolConfig {
                ttl: Duration::from_secs(30),
                settle_delay: Duration::ZERO,
            },
            ExchangeConfig {
                read_timeout: Duration::from_millis(100),
            },
        );
        (conn, dialer)
    }

    #[tokio::test]
    async fn command_returns_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"#MODEL?\r\n", b"~01@MODEL VS-44DT\r\n");
        let (conn, _) = connection(vec![mock]);

        assert_eq!(conn.command(b"#MODEL?\r\n").await.unwrap(), "~01@MODEL VS-44DT");
    }

    #[tokio::test]
    async fn err_token_is_protocol_error_and_keeps_connection() {
        let mut mock = MockTransport::new();
        mock.expect(b"#VID? 9\r\n", b"~01@VID ERR 003\r\n");
        mock.expect(b"#MODEL?\r\n", b"~01@MODEL VS-44DT\r\n");
        let (conn, dialer) = connection(vec![mock]);

        let err = conn.command(b"#VID? 9\r\n").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        conn.command(b"#MODEL?\r\n").await.unwrap();
        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test]
    async fn timeout_drops_connection() {
        let mut first = MockTransport::new();
        first.expect(b"#SN?\r\n", b"");
        let first_probe = first.probe();
        let mut second = MockTransport::new();
        second.expect(b"#SN?\r\n", b"~01@SN 1234\r\n");
        let (conn, dialer) = connection(vec![first, second]);

        assert!(matches!(conn.command(b"#SN?\r\n").await, Err(Error::Timeout)));
        assert!(!first_probe.is_connected());

        assert_eq!(conn.command(b"#SN?\r\n").await.unwrap(), "~01@SN 1234");
        assert_eq!(dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn session_after_failure_is_not_connected() {
        let mut mock = MockTransport::new();
        mock.expect(b"#SN?\r\n", b"");
        let (conn, _) = connection(vec![mock]);

        let mut session = conn.session().await.unwrap();
        assert!(session.command(b"#SN?\r\n", 1).await.is_err());
        assert!(matches!(
            session.command(b"#SN?\r\n", 1).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn dial_failure_surfaces_as_transport_error() {
        let (conn, _) = connection(vec![]);
        assert!(matches!(
            conn.command(b"#SN?\r\n").await,
            Err(Error::Transport(_))
        ));
    }
}
