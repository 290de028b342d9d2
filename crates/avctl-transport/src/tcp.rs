//! TCP links to Kramer and VIA devices.
//!
//! [`TcpDialer`] is what the connection pool holds: it knows one
//! `host:port` and the two deadlines, and hands back a fresh
//! [`TcpTransport`] on every [`dial`](Dialer::dial). Kramer units answer
//! on 5000 with CR/LF text; the VIA answers on 9982.
//!
//! ```no_run
//! use std::time::Duration;
//! use avctl_core::transport::Dialer;
//! use avctl_transport::TcpDialer;
//!
//! # async fn example() -> avctl_core::Result<()> {
//! let dialer = TcpDialer::new("10.5.34.12:5000").connect_timeout(Duration::from_secs(2));
//! let mut link = dialer.dial().await?;
//! link.send(b"#MODEL?\r\n").await?;
//!
//! let mut reply = [0u8; 128];
//! let n = link.receive(&mut reply, Duration::from_secs(3)).await?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use avctl_core::error::{Error, Result};
use avctl_core::transport::{Dialer, Transport};

/// Connect deadline used when none is configured (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-send deadline used when none is configured (5 seconds).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One open socket to a device. Closed for good after
/// [`close`](Transport::close).
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
    write_timeout: Duration,
}

impl TcpTransport {
    /// Dial `peer` (`host:port`), giving up after `connect_timeout`.
    pub async fn open(
        peer: &str,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self> {
        debug!(peer, ?connect_timeout, "dialing device");

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(peer)).await {
            Err(_) => {
                warn!(peer, "connect deadline exceeded");
                return Err(Error::Timeout);
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                warn!(peer, "connection refused");
                return Err(Error::Transport(format!("connection refused: {peer}")));
            }
            Ok(Err(e)) => {
                warn!(peer, error = %e, "connect failed");
                return Err(Error::Io(e));
            }
            Ok(Ok(stream)) => stream,
        };

        // Protocol 3000 commands are tiny; send them as soon as they are written.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer, error = %e, "TCP_NODELAY not applied");
        }
        info!(peer, "device link open");

        Ok(TcpTransport {
            stream: Some(stream),
            peer: peer.to_string(),
            write_timeout,
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.write_timeout;
        let peer = self.peer.clone();
        let stream = self.stream()?;
        trace!(peer = %peer, out = %String::from_utf8_lossy(data).trim_end(), "send");

        let written = tokio::time::timeout(deadline, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;
        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(peer = %peer, error = %e, "send failed");
                Err(lost_or_io(e))
            }
            Err(_) => {
                warn!(peer = %peer, ?deadline, "send deadline exceeded");
                Err(Error::Timeout)
            }
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let peer = self.peer.clone();
        let stream = self.stream()?;
        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(lost_or_io)?;
        if n == 0 {
            debug!(peer = %peer, "device hung up");
            return Err(Error::ConnectionLost);
        }
        trace!(peer = %peer, bytes = n, "recv");
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "shutdown on close failed");
        }
        debug!(peer = %self.peer, "device link closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Hands out [`TcpTransport`]s for one device address.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        TcpDialer {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> Result<Box<dyn Transport>> {
        let link = TcpTransport::open(&self.addr, self.connect_timeout, self.write_timeout).await?;
        Ok(Box::new(link))
    }

    fn target(&self) -> &str {
        &self.addr
    }
}

/// A reset or broken pipe means the device dropped us; anything else stays
/// an I/O error.
fn lost_or_io(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avctl_test_harness::{MockSession, MockTcpServer};

    async fn dial(server: &MockTcpServer) -> Box<dyn Transport> {
        TcpDialer::new(server.addr())
            .connect_timeout(Duration::from_secs(1))
            .dial()
            .await
            .unwrap()
    }

    /// Read until `want` bytes have arrived; replies may be split across reads.
    async fn read_exact(link: &mut Box<dyn Transport>, want: usize) -> Vec<u8> {
        let mut got = Vec::new();
        let mut buf = [0u8; 64];
        while got.len() < want {
            let n = link.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        got
    }

    #[tokio::test]
    async fn kramer_query_round_trip() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            MockSession::new()
                .expect(b"#VID? 1\r\n", b"~01@VID 3>1\r\n")
                .hold(),
        );
        server.start();

        let mut link = dial(&server).await;
        assert!(link.is_connected());
        link.send(b"#VID? 1\r\n").await.unwrap();
        let reply = read_exact(&mut link, b"~01@VID 3>1\r\n".len()).await;
        assert_eq!(reply, b"~01@VID 3>1\r\n");

        link.close().await.unwrap();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reply_split_over_reads_is_reassembled() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            MockSession::new()
                .send(b"~01@AUD-")
                .pause(Duration::from_millis(50))
                .send(b"LVL 1,2,40\r\n"),
        );
        server.start();

        let mut link = dial(&server).await;
        let reply = read_exact(&mut link, b"~01@AUD-LVL 1,2,40\r\n".len()).await;
        assert_eq!(reply, b"~01@AUD-LVL 1,2,40\r\n");
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn refused_port_is_transport_error() {
        let server = MockTcpServer::new().await.unwrap();
        let addr = server.addr().to_string();
        drop(server);

        let err = TcpDialer::new(addr.clone()).dial().await.err().expect("dial should fail");
        let Error::Transport(msg) = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(msg, format!("connection refused: {addr}"));
    }

    #[tokio::test]
    async fn silent_device_times_out() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().hold());
        server.start();

        let mut link = dial(&server).await;
        let mut buf = [0u8; 16];
        let err = link.receive(&mut buf, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        // A timeout leaves the link usable.
        assert!(link.is_connected());

        link.close().await.unwrap();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn hangup_is_connection_lost() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new());
        server.start();

        let mut link = dial(&server).await;
        server.wait().await.unwrap();

        let mut buf = [0u8; 16];
        let err = link.receive(&mut buf, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost | Error::Io(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn closed_link_rejects_io_and_closes_once() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().hold());
        server.start();

        let mut link = dial(&server).await;
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(!link.is_connected());
        assert!(matches!(link.send(b"#MODEL?\r\n").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 4];
        assert!(matches!(
            link.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        server.wait().await.unwrap();
    }

    #[test]
    fn dialer_defaults_and_target() {
        let dialer = TcpDialer::new("10.0.0.20:5000");
        assert_eq!(dialer.target(), "10.0.0.20:5000");
        assert_eq!(dialer.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(dialer.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn dropped_peer_errors_map_to_connection_lost() {
        for kind in [ErrorKind::ConnectionReset, ErrorKind::BrokenPipe] {
            assert!(matches!(
                lost_or_io(std::io::Error::new(kind, "gone")),
                Error::ConnectionLost
            ));
        }
        assert!(matches!(lost_or_io(std::io::Error::other("odd")), Error::Io(_)));
    }
}
