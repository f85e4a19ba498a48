//! Transport trait for node communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a transceiver
//! node. Implementations exist for USB serial ports (`loralink-transport`)
//! and for deterministic testing (`MockTransport` in
//! `loralink-test-harness`).
//!
//! The session engine operates on a `Transport` rather than directly on a
//! serial port, so the same request/response and monitoring logic runs
//! against real hardware and against scripted byte streams.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level duplex link to a transceiver node.
///
/// Implementations handle the physical layer only. Framing, message decoding,
/// and session state are layered on top by `loralink-session`.
///
/// # Reading semantics
///
/// The link is persistent: "no data right now" and "the link is gone" are
/// distinct conditions. `receive` returning `Ok(0)` or
/// [`Error::Timeout`](crate::error::Error::Timeout) means no bytes arrived
/// within the poll window and the caller should try again;
/// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) and
/// [`Error::NotConnected`](crate::error::Error::NotConnected) mean the link
/// is closed and further polling is pointless.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the node.
    ///
    /// Implementations should block until all bytes have been handed to the
    /// underlying link (serial TX buffer, in-memory script, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout` for
    /// data; a timeout is not an error condition of the link, only of this
    /// particular poll.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard any bytes received but not yet read.
    ///
    /// Used before request/response exchanges so stale telemetry queued while
    /// nobody was listening cannot be mistaken for the reply.
    async fn reset_input_buffer(&mut self) -> Result<()>;

    /// Close the link.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the link is currently open.
    fn is_connected(&self) -> bool;
}
