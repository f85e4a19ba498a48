//! Error types for loralink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, schema-layer, and
//! session-layer errors are all captured here.

/// The error type for all loralink operations.
///
/// Variants cover the failure modes of a serial link to a transceiver node:
/// physical transport failures, schema decode errors, timeouts waiting for a
/// reply, and rejected parameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/configure failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame's payload failed schema decoding.
    ///
    /// During dispatch this is recovered locally: the frame is skipped and a
    /// [`LinkEvent::DecodeFailed`](crate::events::LinkEvent) is emitted
    /// instead of aborting the run.
    #[error("decode error: {0}")]
    Decode(String),

    /// Timed out waiting for a reply from the node.
    ///
    /// This typically indicates the node is powered off, the wrong port was
    /// selected, or the firmware is not answering requests.
    #[error("timeout waiting for reply")]
    Timeout,

    /// An out-of-range or malformed parameter was rejected before any write.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the node has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the node was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
