//! Mock transport for deterministic testing of the framing and session layers.
//!
//! [`MockTransport`] implements the [`Transport`] trait against in-memory
//! scripts. Two scripting styles compose freely:
//!
//! - **Expectations** ([`expect`](MockController::expect)): when a `send()`
//!   matches the front of the expectation queue, its canned reply is queued
//!   as inbound data. This drives request/response exchanges.
//! - **Unsolicited inbound** ([`push_inbound`](MockController::push_inbound)):
//!   chunks handed out by successive `receive()` calls with no send required.
//!   This drives telemetry streams, which the node emits on its own schedule.
//!
//! Sends that match no pending expectation are recorded but not rejected,
//! because sessions interleave fire-and-forget writes (state changes,
//! transmissions) that a test often does not care about.
//!
//! # Example
//!
//! ```
//! use loralink_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let ctl = mock.controller();
//! ctl.push_inbound(b"<START>partial-frame");
//! ctl.close_when_drained();
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use loralink_core::error::{Error, Result};
use loralink_core::transport::Transport;

/// A pre-loaded request/reply pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    reply: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockInner {
    expectations: VecDeque<Expectation>,
    /// Chunks pending for `receive()`, one chunk per call (split on short reads).
    inbound: VecDeque<Vec<u8>>,
    /// When set, an empty inbound queue reads as link loss instead of silence.
    close_when_drained: bool,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

fn lock(inner: &Arc<Mutex<MockInner>>) -> std::sync::MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock [`Transport`] for testing without node hardware.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

/// Cloneable scripting/inspection handle to a [`MockTransport`].
///
/// Obtain via [`MockTransport::controller`] before moving the transport into
/// a session; the handle stays valid for the transport's whole life.
#[derive(Debug, Clone)]
pub struct MockController {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockInner {
                connected: true,
                ..Default::default()
            })),
        }
    }

    /// A handle for scripting and inspecting this transport.
    pub fn controller(&self) -> MockController {
        MockController {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    /// Queue a request/reply pair.
    ///
    /// When `send()` is called with bytes equal to `request`, `reply` is
    /// appended to the inbound queue for subsequent `receive()` calls.
    pub fn expect(&self, request: &[u8], reply: &[u8]) {
        lock(&self.inner).expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: reply.to_vec(),
        });
    }

    /// Queue an unsolicited inbound chunk.
    ///
    /// Chunk boundaries are preserved: each `receive()` call returns at most
    /// one queued chunk, so tests control exactly how a byte stream is
    /// fragmented across reads.
    pub fn push_inbound(&self, chunk: &[u8]) {
        lock(&self.inner).inbound.push_back(chunk.to_vec());
    }

    /// After the inbound queue drains, report link loss instead of silence.
    pub fn close_when_drained(&self) {
        lock(&self.inner).close_when_drained = true;
    }

    /// All byte slices passed to `send()`, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.inner).sent_log.clone()
    }

    /// Number of queued expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.inner).expectations.len()
    }

    /// Force the connected state.
    pub fn set_connected(&self, connected: bool) {
        lock(&self.inner).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(Error::NotConnected);
        }

        inner.sent_log.push(data.to_vec());

        // Consume the front expectation only when it matches; other sends
        // are fire-and-forget traffic.
        if inner
            .expectations
            .front()
            .is_some_and(|e| e.request == data)
        {
            let expectation = inner.expectations.pop_front();
            if let Some(e) = expectation {
                inner.inbound.push_back(e.reply);
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(Error::NotConnected);
        }

        match inner.inbound.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Short read: requeue the remainder at the front.
                    inner.inbound.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None if inner.close_when_drained => {
                inner.connected = false;
                Err(Error::ConnectionLost)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn reset_input_buffer(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        inner.inbound.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }
}
