//! One request/response exchange over an open Kramer connection.
//!
//! The caller owns the connection (normally through a pool guard) and a
//! read buffer that lives as long as the connection. [`exchange`] discards
//! anything stale in that buffer, writes the command, and reads one or two
//! LF-terminated frames under a single deadline.
//!
//! Frame count matters: a VP558 set that changes device state answers with
//! two frames. Reading only one leaves the second in the stream where it
//! would be taken as the reply to the next command.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use avctl_core::error::{Error, Result};
use avctl_core::transport::Transport;

use crate::protocol::{self, DecodeResult};

/// Default deadline for reading a reply.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum buffer size before reset to prevent unbounded growth.
/// Kramer replies are well under 100 bytes; 8192 is generous headroom.
const MAX_BUF: usize = 8192;

/// Timing for [`exchange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Deadline covering every frame of one exchange.
    pub read_timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Write `cmd` and read `frames` reply frames, returning the first.
///
/// `frames` below one is treated as one. Extra frames are read and dropped.
/// The reply is returned unchecked; callers apply
/// [`check_error`](protocol::check_error) and their own parsing.
pub async fn exchange(
    transport: &mut dyn Transport,
    pending: &mut BytesMut,
    cmd: &[u8],
    frames: usize,
    config: &ExchangeConfig,
) -> Result<String> {
    discard_stale(transport, pending).await?;

    debug!(
        cmd = %String::from_utf8_lossy(cmd).trim_end(),
        frames,
        "sending command"
    );
    transport.send(cmd).await?;

    let deadline = Instant::now() + config.read_timeout;
    let reply = read_frame(transport, pending, deadline).await?;
    trace!(reply = %reply, "received reply");

    for n in 1..frames.max(1) {
        let extra = read_frame(transport, pending, deadline).await?;
        trace!(frame = n + 1, reply = %extra, "consumed additional frame");
    }

    Ok(reply)
}

/// Read one LF-terminated frame, buffering partial data in `pending`.
///
/// Bytes received past the terminator stay in `pending` for the next call.
pub async fn read_frame(
    transport: &mut dyn Transport,
    pending: &mut BytesMut,
    deadline: Instant,
) -> Result<String> {
    let mut recv_buf = [0u8; 256];

    loop {
        if let DecodeResult::Response { text, consumed } = protocol::decode_response(&pending[..]) {
            pending.advance(consumed);
            return Ok(text);
        }

        if pending.len() > MAX_BUF {
            warn!(len = pending.len(), "reply buffer overflow, clearing");
            pending.clear();
            return Err(Error::Malformed(format!(
                "no line terminator within {} bytes",
                MAX_BUF
            )));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }

        let n = transport.receive(&mut recv_buf, remaining).await?;
        if n == 0 {
            return Err(Error::ConnectionLost);
        }
        pending.extend_from_slice(&recv_buf[..n]);
    }
}

/// Drop buffered bytes and anything already waiting on the socket, such as
/// a welcome banner or a late frame from an earlier command.
async fn discard_stale(transport: &mut dyn Transport, pending: &mut BytesMut) -> Result<()> {
    let mut dropped = pending.len();
    pending.clear();

    let mut buf = [0u8; 256];
    while dropped <= MAX_BUF {
        match transport.receive(&mut buf, Duration::ZERO).await {
            Ok(0) => return Err(Error::ConnectionLost),
            Ok(n) => dropped += n,
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    if dropped > 0 {
        debug!(bytes = dropped, "discarded stale bytes before command");
    }
    Ok(())
}
