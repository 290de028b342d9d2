//! Mock transport for deterministic testing of device adapters.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test Kramer command encoding and
//! reply parsing without real hardware.
//!
//! Unlike a plain request/response stub, bytes that the adapter does not
//! read stay queued on the transport. That is what makes the VP558
//! double-response quirk observable: a set that reads one frame when the
//! device sent two leaves the second frame behind, and
//! [`MockProbe::unread_len`] reports it.
//!
//! # Example
//!
//! ```
//! use avctl_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the adapter sends this request, make this reply readable.
//! mock.expect(b"#VID? 1\r\n", b"~01@VID 2>1\r\n");
//! let probe = mock.probe();
//! assert_eq!(probe.remaining_expectations(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use avctl_core::error::{Error, Result};
use avctl_core::transport::{Dialer, Transport};

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Bytes the device has "sent" that the adapter has not read yet.
    unread: VecDeque<u8>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

impl MockState {
    fn new() -> Self {
        MockState {
            expectations: VecDeque::new(),
            unread: VecDeque::new(),
            connected: true,
            sent_log: Vec::new(),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] for testing device adapters without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the paired
/// response is appended to the unread queue for subsequent `receive()`
/// calls. A mismatch or an exhausted queue fails the send.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// `response` may hold several LF-terminated frames, or none at all.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Make bytes readable without a preceding request (e.g. a banner).
    pub fn push_unsolicited(&mut self, data: &[u8]) {
        lock(&self.state).unread.extend(data.iter().copied());
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    /// A handle for inspecting this transport after it has been moved into
    /// an adapter or a pool.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        match state.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                state.unread.extend(expectation.response);
                Ok(())
            }
            Some(expectation) => Err(Error::Transport(format!(
                "mock: unexpected send {:?}, expected {:?}",
                String::from_utf8_lossy(data),
                String::from_utf8_lossy(&expectation.request)
            ))),
            None => Err(Error::Transport(format!(
                "mock: no expectation left for {:?}",
                String::from_utf8_lossy(data)
            ))),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.unread.is_empty() {
            return Err(Error::Timeout);
        }

        let n = state.unread.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.unread.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.unread.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Read-only view of a [`MockTransport`]'s state.
#[derive(Debug, Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    /// Everything sent through the transport, one entry per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Sent data decoded as text, for readable assertions.
    pub fn sent_text(&self) -> Vec<String> {
        lock(&self.state)
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// Number of bytes queued for reading that nobody has read.
    pub fn unread_len(&self) -> usize {
        lock(&self.state).unread.len()
    }

    /// Number of expectations that have not been consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// A [`Dialer`] that hands out pre-built [`MockTransport`]s in order.
///
/// Dialing after the supply is exhausted fails with [`Error::Transport`].
#[derive(Debug)]
pub struct MockDialer {
    transports: Mutex<VecDeque<MockTransport>>,
    dials: AtomicUsize,
}

impl MockDialer {
    pub fn new(transports: Vec<MockTransport>) -> Self {
        MockDialer {
            transports: Mutex::new(transports.into()),
            dials: AtomicUsize::new(0),
        }
    }

    /// How many times `dial()` has been called.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self) -> Result<Box<dyn Transport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = self
            .transports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::Transport("mock: connection refused".into())),
        }
    }

    fn target(&self) -> &str {
        "mock"
    }
}
