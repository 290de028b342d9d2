//! An authenticated VIA connection.
//!
//! The appliance greets every new connection with a welcome line, then
//! expects a `Login` record before anything else. [`ViaSession`] walks
//! those steps one at a time so the monitor can report each state, and
//! [`ViaSession::open`] runs them all for one-shot commands.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use avctl_core::error::{Error, Result};
use avctl_core::types::Credentials;

use crate::codec::{self, ViaCommand};

/// Default deadline for each line read (7 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(7);

/// Default deadline for each write (5 seconds).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for the TCP connect (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket deadlines for a VIA session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// One TCP connection to a VIA, split into a buffered reader and a writer.
pub struct ViaSession {
    addr: String,
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
    config: SessionConfig,
}

impl ViaSession {
    /// Dial `addr` (`host:port`). The welcome line is still unread.
    pub async fn connect(addr: &str, config: SessionConfig) -> Result<Self> {
        debug!(addr = %addr, "connecting to VIA");
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Transport(format!("TCP connect to {addr} failed: {e}")))?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = tokio::io::split(stream);
        Ok(ViaSession {
            addr: addr.to_string(),
            reader: BufReader::new(read_half),
            writer: write_half,
            config,
        })
    }

    /// Read and discard the welcome banner.
    pub async fn read_welcome(&mut self) -> Result<()> {
        let banner = self.read_line().await?;
        trace!(addr = %self.addr, banner = %banner, "welcome received");
        Ok(())
    }

    /// Send `Login` and check the verdict.
    ///
    /// A reply containing `Error`, or one without `Successful`, fails with
    /// [`Error::Login`].
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        debug!(addr = %self.addr, username = %credentials.username, "logging in");
        let record = ViaCommand::login().encode(&credentials.username, Some(&credentials.password))?;
        self.write_raw(record.as_bytes()).await?;

        let reply = self.read_line().await?;
        if codec::login_succeeded(&reply) {
            info!(addr = %self.addr, "logged in");
            Ok(())
        } else {
            warn!(addr = %self.addr, reply = %reply, "login rejected");
            Err(Error::Login(reply))
        }
    }

    /// Connect, consume the welcome line and log in.
    pub async fn open(addr: &str, credentials: &Credentials, config: SessionConfig) -> Result<Self> {
        let mut session = Self::connect(addr, config).await?;
        session.read_welcome().await?;
        session.login(credentials).await?;
        Ok(session)
    }

    /// Send `cmd` under `username` (no password) without waiting for a reply.
    pub async fn send(&mut self, cmd: &ViaCommand, username: &str) -> Result<()> {
        let record = cmd.encode(username, None)?;
        debug!(addr = %self.addr, command = %record, "sending command");
        self.write_raw(record.as_bytes()).await
    }

    /// Send `cmd` and return the next reply line.
    pub async fn command(&mut self, cmd: &ViaCommand, username: &str) -> Result<String> {
        self.send(cmd, username).await?;
        let reply = self.read_line().await?;
        debug!(addr = %self.addr, reply = %reply, "response from device");
        Ok(reply)
    }

    /// Read one newline-terminated line within the read deadline, without
    /// its line ending.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        match tokio::time::timeout(self.config.read_timeout, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(Error::ConnectionLost),
            Ok(Ok(_)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            Ok(Err(e)) => Err(Error::Transport(format!("read from {} failed: {e}", self.addr))),
            Err(_) => Err(Error::Timeout),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Hand the halves to separate reader and writer tasks.
    pub fn into_parts(self) -> (BufReader<ReadHalf<TcpStream>>, WriteHalf<TcpStream>) {
        (self.reader, self.writer)
    }

    /// Shut the write side down, signalling the device to close.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        write_with_deadline(&mut self.writer, data, self.config.write_timeout).await
    }
}

/// Write and flush `data` within `deadline`.
pub(crate) async fn write_with_deadline(
    writer: &mut WriteHalf<TcpStream>,
    data: &[u8],
    deadline: Duration,
) -> Result<()> {
    let write = async {
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    };
    match tokio::time::timeout(deadline, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Transport(format!("write failed: {e}"))),
        Err(_) => Err(Error::Timeout),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use avctl_test_harness::{MockSession, MockTcpServer};

    pub(crate) const WELCOME: &[u8] = b"Welcome to VIA Connect PRO\r\n";
    pub(crate) const LOGIN: &[u8] = b"<P><UN>admin</UN><Pwd>secret</Pwd><Cmd>Login</Cmd></P>";
    pub(crate) const LOGIN_OK: &[u8] = b"Login|Successful\r\n";

    pub(crate) fn credentials() -> Credentials {
        Credentials::new("admin", "secret")
    }

    pub(crate) fn fast_config() -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
        }
    }

    /// A session script that greets and accepts the login.
    pub(crate) fn logged_in() -> MockSession {
        MockSession::new().send(WELCOME).expect(LOGIN, LOGIN_OK)
    }

    #[tokio::test]
    async fn open_reads_welcome_then_logs_in() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(logged_in().expect(
            b"<P><UN>admin</UN><Pwd></Pwd><Cmd>Vol</Cmd><P1>Get</P1></P>",
            b"Vol|Get|42\r\n",
        ));
        server.start();

        let mut session = ViaSession::open(server.addr(), &credentials(), fast_config())
            .await
            .unwrap();
        let reply = session
            .command(&ViaCommand::new("Vol").param("Get"), "admin")
            .await
            .unwrap();
        assert_eq!(reply, "Vol|Get|42");

        session.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn login_error_is_rejected() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            MockSession::new()
                .send(WELCOME)
                .expect(LOGIN, b"Login|Error: invalid credentials\r\n"),
        );
        server.start();

        let err = ViaSession::open(server.addr(), &credentials(), fast_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Login(_)));
    }

    #[tokio::test]
    async fn login_without_success_marker_is_rejected() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().send(WELCOME).expect(LOGIN, b"Login|0\r\n"));
        server.start();

        let result = ViaSession::open(server.addr(), &credentials(), fast_config()).await;
        assert!(matches!(result, Err(Error::Login(_))));
    }

    #[tokio::test]
    async fn missing_welcome_times_out() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().pause(Duration::from_secs(2)));
        server.start();

        let result = ViaSession::open(server.addr(), &credentials(), fast_config()).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn closed_socket_is_connection_lost() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new());
        server.start();

        let mut session = ViaSession::connect(server.addr(), fast_config()).await.unwrap();
        assert!(matches!(session.read_welcome().await, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn refused_connect_is_transport_error() {
        let addr = {
            let server = MockTcpServer::new().await.unwrap();
            server.addr().to_string()
        };
        let result = ViaSession::connect(&addr, fast_config()).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
