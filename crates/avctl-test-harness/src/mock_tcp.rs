//! Mock TCP server for protocol-level testing.
//!
//! [`MockTcpServer`] provides a loopback TCP listener that plays back one
//! scripted [`MockSession`] per accepted connection. It is used to test the
//! VIA client, whose every command opens a fresh connection, and the VIA
//! monitor, which reconnects after failures.
//!
//! # Example
//!
//! ```
//! use avctl_test_harness::{MockSession, MockTcpServer};
//!
//! # async fn example() -> avctl_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.session(
//!     MockSession::new()
//!         .send(b"Welcome to VIA\r\n")
//!         .expect(b"<P><UN>admin</UN>...</P>", b"Login|Successful\r\n"),
//! );
//! server.start();
//!
//! let addr = server.addr().to_string();
//! // ... connect and test ...
//! # Ok(())
//! # }
//! ```

use avctl_core::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Step {
    /// Write bytes to the client.
    Send(Vec<u8>),
    /// Read exactly `request.len()` bytes, check them, then reply.
    Expect { request: Vec<u8>, response: Vec<u8> },
    /// Sleep before the next step.
    Pause(Duration),
    /// Keep the socket open until the client closes it.
    Hold,
}

/// The script for one accepted connection.
///
/// Steps run in order. When the script ends the server closes the socket,
/// unless the last step is [`hold`](MockSession::hold).
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    steps: Vec<Step>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `data` to the client (a banner, an event line).
    pub fn send(mut self, data: &[u8]) -> Self {
        self.steps.push(Step::Send(data.to_vec()));
        self
    }

    /// Expect the client to send exactly `request`, then reply with `response`.
    pub fn expect(mut self, request: &[u8], response: &[u8]) -> Self {
        self.steps.push(Step::Expect {
            request: request.to_vec(),
            response: response.to_vec(),
        });
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Pause(duration));
        self
    }

    /// Keep the connection open until the client hangs up.
    pub fn hold(mut self) -> Self {
        self.steps.push(Step::Hold);
        self
    }
}

/// A scripted TCP server listening on `127.0.0.1`.
///
/// Each accepted connection consumes the next queued [`MockSession`]; the
/// server stops accepting once all sessions have been handed out. Sessions
/// run concurrently, so a held session does not block the next accept.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    sessions: Vec<MockSession>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server to a random loopback port.
    ///
    /// The server does not accept connections until [`start`](MockTcpServer::start)
    /// is called, allowing sessions to be loaded first. Clients that connect
    /// before then wait in the listen backlog.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            sessions: Vec::new(),
            server_handle: None,
        })
    }

    /// Queue the script for the next accepted connection.
    pub fn session(&mut self, session: MockSession) {
        self.sessions.push(session);
    }

    /// The `host:port` the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    /// Start accepting connections in a background task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let sessions: Vec<MockSession> = self.sessions.drain(..).collect();

        let handle = tokio::spawn(async move {
            let mut running = Vec::new();
            for (i, session) in sessions.into_iter().enumerate() {
                let (stream, _) = listener
                    .accept()
                    .await
                    .map_err(|e| format!("session {}: accept failed: {}", i, e))?;
                running.push(tokio::spawn(run_session(i, stream, session)));
            }

            for task in running {
                task.await
                    .map_err(|e| format!("session task panicked: {}", e))??;
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for every session to finish and return the first script error.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

async fn run_session(
    index: usize,
    mut stream: TcpStream,
    session: MockSession,
) -> std::result::Result<(), String> {
    for (i, step) in session.steps.into_iter().enumerate() {
        match step {
            Step::Send(data) => write_all(&mut stream, &data)
                .await
                .map_err(|e| format!("session {} step {}: {}", index, i, e))?,
            Step::Expect { request, response } => {
                let mut buf = vec![0u8; request.len()];
                let mut total_read = 0;
                while total_read < request.len() {
                    let n = stream
                        .read(&mut buf[total_read..])
                        .await
                        .map_err(|e| format!("session {} step {}: read error: {}", index, i, e))?;
                    if n == 0 {
                        return Err(format!(
                            "session {} step {}: client disconnected after {} bytes (expected {})",
                            index,
                            i,
                            total_read,
                            request.len()
                        ));
                    }
                    total_read += n;
                }

                if buf != request {
                    return Err(format!(
                        "session {} step {}: request mismatch: expected {:?}, got {:?}",
                        index,
                        i,
                        String::from_utf8_lossy(&request),
                        String::from_utf8_lossy(&buf)
                    ));
                }

                write_all(&mut stream, &response)
                    .await
                    .map_err(|e| format!("session {} step {}: {}", index, i, e))?;
            }
            Step::Pause(duration) => tokio::time::sleep(duration).await,
            Step::Hold => {
                let mut sink = [0u8; 256];
                loop {
                    match stream.read(&mut sink).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            }
        }
    }
    Ok(())
}

async fn write_all(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_one_session() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            MockSession::new()
                .send(b"hello\r\n")
                .expect(b"ping", b"pong\n"),
        );
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\r\n");

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong\n");

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn each_connection_gets_next_session() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().send(b"one\n"));
        server.session(MockSession::new().send(b"two\n"));
        server.start();

        for expected in [b"one\n", b"two\n"] {
            let mut client = TcpStream::connect(server.addr()).await.unwrap();
            let mut buf = [0u8; 4];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, expected);
        }

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_is_reported() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().expect(b"abc", b"ok"));
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"xyz").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "{}", err);
    }

    #[tokio::test]
    async fn hold_ends_when_client_hangs_up() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(MockSession::new().send(b"x\n").hold());
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        drop(client);

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn port_matches_addr() {
        let server = MockTcpServer::new().await.unwrap();
        assert!(server.addr().ends_with(&format!(":{}", server.port())));
    }
}
