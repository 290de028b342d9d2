//! Pooled, serialized connections to a single device endpoint.
//!
//! Kramer devices answer commands in arrival order with no request id, so
//! two commands must never be in flight on one socket at the same time.
//! [`ConnectionPool`] keeps at most one open connection per endpoint and
//! hands it out through an exclusive [`PoolGuard`]:
//!
//! - the first [`acquire`](ConnectionPool::acquire) dials through the
//!   configured [`Dialer`] and then waits out a settle delay so the device
//!   can print its welcome banner before the first command;
//! - the connection is reused until it has been idle for the TTL, at which
//!   point a background reaper closes it;
//! - a caller that hits a transport error calls
//!   [`PoolGuard::invalidate`] so the next caller starts from a fresh
//!   socket instead of a half-read stream.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use avctl_core::error::Result;
use avctl_core::transport::{Dialer, Transport};
use bytes::BytesMut;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default idle time after which a pooled connection is closed.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default wait after dialing before the first command is written.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Timing parameters for a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle time after which the connection is torn down.
    pub ttl: Duration,
    /// Delay between a successful dial and handing the connection out.
    pub settle_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            ttl: DEFAULT_TTL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// An open connection owned by a pool.
///
/// Carries a read buffer alongside the transport so bytes received past
/// the end of one reply stay with the socket they arrived on.
pub struct PooledConnection {
    id: u64,
    transport: Box<dyn Transport>,
    read_buf: BytesMut,
    last_used: Instant,
}

impl PooledConnection {
    pub fn transport(&mut self) -> &mut dyn Transport {
        &mut *self.transport
    }

    pub fn read_buf(&mut self) -> &mut BytesMut {
        &mut self.read_buf
    }

    /// Borrow the transport and the read buffer together.
    pub fn parts(&mut self) -> (&mut dyn Transport, &mut BytesMut) {
        (&mut *self.transport, &mut self.read_buf)
    }

    /// Pool-unique id of this connection; changes on every redial.
    pub fn id(&self) -> u64 {
        self.id
    }
}

type Slot = Arc<Mutex<Option<PooledConnection>>>;

/// A single-connection pool for one device endpoint.
pub struct ConnectionPool {
    dialer: Arc<dyn Dialer>,
    config: PoolConfig,
    slot: Slot,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl ConnectionPool {
    pub fn new(dialer: Arc<dyn Dialer>, config: PoolConfig) -> Self {
        ConnectionPool {
            dialer,
            config,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// The dial target, for logging.
    pub fn target(&self) -> &str {
        self.dialer.target()
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Take exclusive use of the endpoint's connection, dialing if needed.
    ///
    /// Waits for any in-flight exchange to finish first.
    pub async fn acquire(&self) -> Result<PoolGuard<'_>> {
        let mut slot = self.slot.lock().await;

        let expired = slot
            .as_ref()
            .is_some_and(|conn| conn.last_used.elapsed() >= self.config.ttl);
        let dead = slot
            .as_ref()
            .is_some_and(|conn| !conn.transport.is_connected());
        if expired || dead {
            if let Some(mut conn) = slot.take() {
                debug!(target_addr = %self.target(), id = conn.id, expired, "dropping stale connection");
                let _ = conn.transport.close().await;
            }
        }

        if slot.is_none() {
            let conn = self.dial().await?;
            let id = conn.id;
            *slot = Some(conn);
            tokio::spawn(reap_idle(
                Arc::clone(&self.slot),
                id,
                self.config.ttl,
                self.cancel.child_token(),
            ));
        }

        Ok(PoolGuard { slot })
    }

    /// Whether a connection is currently open.
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Close the pooled connection, if any.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut conn) = slot.take() {
            debug!(target_addr = %self.target(), id = conn.id, "closing pooled connection");
            let _ = conn.transport.close().await;
        }
    }

    async fn dial(&self) -> Result<PooledConnection> {
        debug!(target_addr = %self.target(), "dialing");
        let transport = self.dialer.dial().await?;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(target_addr = %self.target(), id, "connection ready");
        Ok(PooledConnection {
            id,
            transport,
            read_buf: BytesMut::with_capacity(256),
            last_used: Instant::now(),
        })
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Exclusive handle to a pool's open connection.
///
/// Dropping the guard returns the connection to the pool and restarts its
/// idle timer.
pub struct PoolGuard<'a> {
    slot: MutexGuard<'a, Option<PooledConnection>>,
}

impl PoolGuard<'_> {
    /// Close the connection and remove it from the pool.
    pub async fn invalidate(mut self) {
        if let Some(mut conn) = self.slot.take() {
            debug!(id = conn.id, "invalidating pooled connection");
            let _ = conn.transport.close().await;
        }
    }
}

impl Deref for PoolGuard<'_> {
    type Target = PooledConnection;

    fn deref(&self) -> &PooledConnection {
        match self.slot.as_ref() {
            Some(conn) => conn,
            None => unreachable!("pool guard without a connection"),
        }
    }
}

impl DerefMut for PoolGuard<'_> {
    fn deref_mut(&mut self) -> &mut PooledConnection {
        match self.slot.as_mut() {
            Some(conn) => conn,
            None => unreachable!("pool guard without a connection"),
        }
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.slot.as_mut() {
            conn.last_used = Instant::now();
        }
    }
}

/// Close connection `id` once it has sat idle for `ttl`.
///
/// Exits as soon as the slot holds a different connection (or none), so at
/// most one reaper is ever active per live connection.
async fn reap_idle(slot: Slot, id: u64, ttl: Duration, cancel: CancellationToken) {
    loop {
        let wait = {
            let guard = slot.lock().await;
            match guard.as_ref() {
                Some(conn) if conn.id == id => ttl.saturating_sub(conn.last_used.elapsed()),
                _ => return,
            }
        };

        if !wait.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => continue,
            }
        }

        let mut guard = slot.lock().await;
        let idle = guard
            .as_ref()
            .is_some_and(|conn| conn.id == id && conn.last_used.elapsed() >= ttl);
        if idle {
            if let Some(mut conn) = guard.take() {
                debug!(id, ttl_ms = ttl.as_millis(), "closing idle connection");
                let _ = conn.transport.close().await;
            }
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
