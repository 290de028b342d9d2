//! Persistent VIA event monitor.
//!
//! [`ViaMonitor`] keeps one authenticated connection open to a VIA and
//! turns its unsolicited event lines into [`MonitorEvent`]s. Two tasks
//! share the connection:
//!
//! - the **supervisor** dials, logs in, reads event lines and owns the
//!   session state; it is the only task that reconnects;
//! - the **pinger** writes a keep-alive `IpInfo` record on a fixed period
//!   while the state is `Connected`, and wakes the supervisor if a write
//!   fails.
//!
//! A connection that stays silent for the idle timeout is treated as dead.
//! Any read, write or login failure moves the session to `Reconnecting`;
//! after the reconnect interval the supervisor dials again, forever.
//! Cancelling the monitor's token stops both tasks and shuts the
//! connection once.
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingWelcome -> LoggingIn -> Connected
//!                     ^                                 |           |
//!                     +--------- Reconnecting <---------+-----------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use avctl_core::error::{Error, Result};
use avctl_core::events::{MonitorEvent, SessionState};
use avctl_core::types::Credentials;

use crate::codec::{PING_USERNAME, ViaCommand};
use crate::events::classify_line;
use crate::session::{SessionConfig, ViaSession, write_with_deadline};

/// Delay between a failure and the next connection attempt (10 seconds).
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Keep-alive period (60 seconds).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Longest silence tolerated on a connected session (5 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Broadcast channel capacity for monitor subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type SharedWriter = Arc<Mutex<Option<WriteHalf<TcpStream>>>>;

/// Timing for a [`ViaMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub reconnect_interval: Duration,
    pub ping_interval: Duration,
    /// No line for this long while connected forces a reconnect.
    pub idle_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            session: SessionConfig::default(),
        }
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle cancels the background tasks.
pub struct ViaMonitor {
    state_rx: watch::Receiver<SessionState>,
    event_tx: broadcast::Sender<MonitorEvent>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    #[cfg(test)]
    live_writer: LiveWriter,
}

/// The writer of the current connection, visible to tests.
#[cfg(test)]
type LiveWriter = Arc<std::sync::Mutex<Option<SharedWriter>>>;

impl ViaMonitor {
    /// Start monitoring `addr` (`host:port`). Must be called inside a Tokio
    /// runtime.
    pub fn start(addr: impl Into<String>, credentials: Credentials, config: MonitorConfig) -> Self {
        Self::start_with_cancel(addr, credentials, config, CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping when `cancel` is cancelled.
    pub fn start_with_cancel(
        addr: impl Into<String>,
        credentials: Credentials,
        config: MonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        #[cfg(test)]
        let live_writer = LiveWriter::default();

        let supervisor = Supervisor {
            addr: addr.into(),
            credentials,
            config,
            state_tx,
            event_tx: event_tx.clone(),
            cancel: cancel.clone(),
            #[cfg(test)]
            live_writer: Arc::clone(&live_writer),
        };
        let task = tokio::spawn(supervisor.run());

        ViaMonitor {
            state_rx,
            event_tx,
            cancel,
            task: Mutex::new(Some(task)),
            #[cfg(test)]
            live_writer,
        }
    }

    /// Receive lifecycle and VIA events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Cancel the monitor and wait for its tasks to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ViaMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Supervisor {
    addr: String,
    credentials: Credentials,
    config: MonitorConfig,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<MonitorEvent>,
    cancel: CancellationToken,
    #[cfg(test)]
    live_writer: LiveWriter,
}

impl Supervisor {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            let established = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.establish() => result,
            };

            match established {
                Ok(session) => {
                    attempt = 0;
                    self.publish(SessionState::Connected);
                    info!(addr = %self.addr, "VIA monitor connected");
                    match self.run_connected(session).await {
                        Ok(()) => break,
                        Err(e) => warn!(addr = %self.addr, error = %e, "VIA monitor connection lost"),
                    }
                }
                Err(e) => warn!(addr = %self.addr, error = %e, "VIA monitor could not connect"),
            }

            if self.cancel.is_cancelled() {
                break;
            }

            attempt = attempt.saturating_add(1);
            self.publish(SessionState::Reconnecting);
            let _ = self.event_tx.send(MonitorEvent::Reconnecting { attempt });
            info!(
                addr = %self.addr,
                attempt,
                delay = ?self.config.reconnect_interval,
                "reconnecting to VIA"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
            }
        }

        self.publish(SessionState::Disconnected);
        debug!(addr = %self.addr, "VIA monitor stopped");
    }

    fn publish(&self, state: SessionState) {
        self.state_tx.send_replace(state);
        let _ = self.event_tx.send(MonitorEvent::StateChanged(state));
    }

    async fn establish(&self) -> Result<ViaSession> {
        self.publish(SessionState::Connecting);
        let mut session = ViaSession::connect(&self.addr, self.config.session).await?;
        self.publish(SessionState::AwaitingWelcome);
        session.read_welcome().await?;
        self.publish(SessionState::LoggingIn);
        session.login(&self.credentials).await?;
        Ok(session)
    }

    /// Read events until the connection fails (`Err`) or the monitor is
    /// cancelled (`Ok`). The pinger is stopped and the socket shut before
    /// returning.
    async fn run_connected(&self, session: ViaSession) -> Result<()> {
        let (mut reader, writer) = session.into_parts();
        let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));
        #[cfg(test)]
        if let Ok(mut slot) = self.live_writer.lock() {
            *slot = Some(Arc::clone(&writer));
        }
        let ping_failed = Arc::new(Notify::new());
        let connection = self.cancel.child_token();

        let pinger = Pinger {
            addr: self.addr.clone(),
            writer: Arc::clone(&writer),
            state: self.state_tx.subscribe(),
            failed: Arc::clone(&ping_failed),
            cancel: connection.clone(),
            period: self.config.ping_interval,
            write_timeout: self.config.session.write_timeout,
        };
        let ping_task = tokio::spawn(pinger.run());

        let result = self.read_events(&mut reader, &ping_failed).await;

        connection.cancel();
        let _ = ping_task.await;
        if let Some(mut w) = writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
        result
    }

    async fn read_events(
        &self,
        reader: &mut BufReader<ReadHalf<TcpStream>>,
        ping_failed: &Notify,
    ) -> Result<()> {
        let idle = self.config.idle_timeout;
        let mut line = String::new();
        loop {
            line.clear();
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ping_failed.notified() => {
                    return Err(Error::Transport("keep-alive write failed".into()));
                }
                read = tokio::time::timeout(idle, reader.read_line(&mut line)) => {
                    match read {
                        Err(_) => {
                            warn!(addr = %self.addr, ?idle, "no traffic from VIA");
                            return Err(Error::Timeout);
                        }
                        Ok(Ok(0)) => return Err(Error::ConnectionLost),
                        Ok(Ok(_)) => self.dispatch(&line),
                        Ok(Err(e)) => {
                            return Err(Error::Transport(format!("event read failed: {e}")));
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, line: &str) {
        match classify_line(line) {
            Ok(Some(event)) => {
                debug!(
                    addr = %self.addr,
                    event_type = event.kind.as_str(),
                    action = %event.action,
                    user = ?event.user,
                    "VIA event"
                );
                let _ = self.event_tx.send(MonitorEvent::Via(event));
            }
            Ok(None) => trace!(addr = %self.addr, line = %line.trim_end(), "not an event"),
            Err(e) => warn!(addr = %self.addr, error = %e, "skipping malformed event line"),
        }
    }
}

struct Pinger {
    addr: String,
    writer: SharedWriter,
    state: watch::Receiver<SessionState>,
    failed: Arc<Notify>,
    cancel: CancellationToken,
    period: Duration,
    write_timeout: Duration,
}

impl Pinger {
    async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if *self.state.borrow() != SessionState::Connected {
                        continue;
                    }
                    if let Err(e) = self.ping().await {
                        warn!(addr = %self.addr, error = %e, "VIA ping failed");
                        self.failed.notify_one();
                        break;
                    }
                    debug!(addr = %self.addr, "VIA ping sent");
                }
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let record = ViaCommand::ping().encode(PING_USERNAME, None)?;
        let mut writer = self.writer.lock().await;
        let w = writer.as_mut().ok_or(Error::NotConnected)?;
        write_with_deadline(w, record.as_bytes(), self.write_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avctl_core::events::{ViaAction, ViaEventKind};
    use avctl_test_harness::{MockSession, MockTcpServer};

    use crate::session::tests::{LOGIN, WELCOME, credentials, fast_config, logged_in};

    const PING: &[u8] = b"<P><UN>su</UN><Pwd></Pwd><Cmd>IpInfo</Cmd></P>";

    fn config(reconnect: Duration, ping: Duration) -> MonitorConfig {
        MonitorConfig {
            reconnect_interval: reconnect,
            ping_interval: ping,
            idle_timeout: Duration::from_secs(60),
            session: fast_config(),
        }
    }

    /// Receive events until `pred` matches, collecting everything seen.
    async fn until(
        rx: &mut broadcast::Receiver<MonitorEvent>,
        pred: impl Fn(&MonitorEvent) -> bool,
    ) -> Vec<MonitorEvent> {
        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                let done = pred(&event);
                seen.push(event);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for monitor event");
        seen
    }

    fn is_via(event: &MonitorEvent) -> bool {
        matches!(event, MonitorEvent::Via(_))
    }

    #[tokio::test]
    async fn publishes_classified_events() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(logged_in().send(b"PList|Get|1|_jdoe\r\n").hold());
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_secs(10), Duration::from_secs(60)),
        );
        let mut rx = monitor.subscribe();

        let seen = until(&mut rx, is_via).await;
        let states: Vec<SessionState> = seen
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::AwaitingWelcome,
                SessionState::LoggingIn,
                SessionState::Connected,
            ]
        );
        let Some(MonitorEvent::Via(event)) = seen.last() else {
            panic!("expected a VIA event");
        };
        assert_eq!(event.kind, ViaEventKind::UserLoginLogout);
        assert_eq!(event.action, ViaAction::Login);
        assert_eq!(monitor.state(), SessionState::Connected);

        monitor.stop().await;
        assert_eq!(monitor.state(), SessionState::Disconnected);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn login_error_never_connects() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            MockSession::new()
                .send(WELCOME)
                .expect(LOGIN, b"Login|Error: bad password\r\n"),
        );
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_secs(10), Duration::from_secs(60)),
        );
        let mut rx = monitor.subscribe();

        let seen = until(&mut rx, |e| matches!(e, MonitorEvent::Reconnecting { .. })).await;
        assert!(
            !seen
                .iter()
                .any(|e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected)))
        );
        assert!(seen.iter().any(|e| matches!(
            e,
            MonitorEvent::StateChanged(SessionState::Reconnecting)
        )));
        assert!(matches!(seen.last(), Some(MonitorEvent::Reconnecting { attempt: 1 })));
        assert_eq!(monitor.state(), SessionState::Reconnecting);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn sends_keep_alive_ping() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            logged_in()
                .expect(PING, b"IpInfo|IP:10.0.0.9|Host:via\r\n")
                .send(b"MediaStatus|Get|1\r\n")
                .hold(),
        );
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_secs(10), Duration::from_millis(100)),
        );
        let mut rx = monitor.subscribe();

        // The media line is only sent once the ping has arrived; the ping
        // reply itself is not an event.
        let seen = until(&mut rx, is_via).await;
        let Some(MonitorEvent::Via(event)) = seen.last() else {
            panic!("expected a VIA event");
        };
        assert_eq!(event.action, ViaAction::MediaStarted);

        monitor.stop().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_connection_drop() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(logged_in());
        server.session(logged_in().send(b"DisplayStatus|Get|bob|1\r\n").hold());
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_millis(50), Duration::from_secs(60)),
        );
        let mut rx = monitor.subscribe();

        let seen = until(&mut rx, is_via).await;
        let connected = seen
            .iter()
            .filter(|e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected)))
            .count();
        assert_eq!(connected, 2);
        assert!(seen
            .iter()
            .any(|e| matches!(e, MonitorEvent::Reconnecting { attempt: 1 })));
        let Some(MonitorEvent::Via(event)) = seen.last() else {
            panic!("expected a VIA event");
        };
        assert_eq!(event.kind, ViaEventKind::Presenting);
        assert_eq!(event.user.as_deref(), Some("bob"));

        monitor.stop().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_line_does_not_drop_connection() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(
            logged_in()
                .send(b"PList|Get\r\n")
                .send(b"MediaStatus|Get|0\r\n")
                .hold(),
        );
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_secs(10), Duration::from_secs(60)),
        );
        let mut rx = monitor.subscribe();

        let seen = until(&mut rx, is_via).await;
        assert!(!seen.iter().any(|e| matches!(e, MonitorEvent::Reconnecting { .. })));
        let Some(MonitorEvent::Via(event)) = seen.last() else {
            panic!("expected a VIA event");
        };
        assert_eq!(event.action, ViaAction::MediaStopped);

        monitor.stop().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_after_idle_timeout() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(logged_in().hold());
        server.start();

        let mut cfg = config(Duration::from_secs(10), Duration::from_secs(60));
        cfg.idle_timeout = Duration::from_millis(200);
        let monitor = ViaMonitor::start(server.addr(), credentials(), cfg);
        let mut rx = monitor.subscribe();

        let seen = until(&mut rx, |e| matches!(e, MonitorEvent::Reconnecting { .. })).await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected))));
        assert!(!seen.iter().any(is_via));
        assert!(matches!(seen.last(), Some(MonitorEvent::Reconnecting { attempt: 1 })));
        assert_eq!(monitor.state(), SessionState::Reconnecting);

        monitor.stop().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn failed_ping_triggers_reconnect() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.session(logged_in().hold());
        server.session(logged_in().hold());
        server.start();

        let monitor = ViaMonitor::start(
            server.addr(),
            credentials(),
            config(Duration::from_millis(50), Duration::from_millis(100)),
        );
        let mut rx = monitor.subscribe();
        until(&mut rx, |e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected))).await;

        // Pull the write half out from under the pinger so its next write
        // finds no socket.
        let writer = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(w) = monitor.live_writer.lock().unwrap().clone() {
                    break w;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        drop(writer.lock().await.take());

        let seen = until(&mut rx, |e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected))).await;
        let reconnect = seen
            .iter()
            .position(|e| matches!(e, MonitorEvent::Reconnecting { attempt: 1 }))
            .expect("no reconnect after failed ping");
        assert!(!seen[..reconnect]
            .iter()
            .any(|e| matches!(e, MonitorEvent::StateChanged(SessionState::Connected))));
        assert!(matches!(
            seen.last(),
            Some(MonitorEvent::StateChanged(SessionState::Connected))
        ));
        assert_eq!(monitor.state(), SessionState::Connected);

        monitor.stop().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_interrupts_reconnect_delay() {
        let server = MockTcpServer::new().await.unwrap();
        let addr = server.addr().to_string();
        drop(server);

        let cancel = CancellationToken::new();
        let monitor = ViaMonitor::start_with_cancel(
            addr,
            credentials(),
            config(Duration::from_secs(30), Duration::from_secs(60)),
            cancel.clone(),
        );
        let mut state = monitor.watch_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == SessionState::Reconnecting),
        )
        .await
        .unwrap()
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), monitor.stop())
            .await
            .unwrap();
        assert_eq!(monitor.state(), SessionState::Disconnected);
    }
}
