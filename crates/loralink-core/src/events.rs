//! Out-of-band link event types.
//!
//! Events are emitted by the session engine through a
//! `tokio::sync::broadcast` channel while a dispatch loop is running.
//! They carry conditions that must not interrupt message consumption --
//! most importantly frames that failed schema decoding, which are skipped
//! rather than aborting a monitoring run.

/// An event emitted by the session engine outside the normal message flow.
///
/// Delivered on a best-effort basis through a bounded broadcast channel;
/// slow consumers may miss events under load.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A complete frame was extracted but its payload failed schema decoding.
    ///
    /// The frame was skipped and parsing continued with the next frame.
    DecodeFailed {
        /// Length in bytes of the undecodable payload.
        frame_len: usize,
    },

    /// The receive accumulator exceeded its cap and was reset.
    ///
    /// This only happens when the link delivers sustained garbage with no
    /// valid frame boundaries.
    AccumulatorOverflow {
        /// Number of buffered bytes that were dropped.
        dropped: usize,
    },

    /// The byte link signalled closure while a dispatch loop was running.
    LinkClosed,
}
