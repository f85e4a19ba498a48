//! Incremental packet extraction from a fragmented byte stream.
//!
//! The serial link delivers bytes in arbitrary chunks: a frame can be split
//! across reads, several frames can arrive in one read, and noise can appear
//! between frames. [`PacketDemux`] owns the accumulator that absorbs those
//! chunks and yields decoded packets one at a time, in stream order.
//!
//! A frame whose payload fails schema decoding is skipped -- a
//! [`LinkEvent::DecodeFailed`] is broadcast and extraction continues with the
//! residual buffer, so one corrupt frame never poisons the frames around it.

use bytes::{Buf, BytesMut};
use tokio::sync::broadcast;

use loralink_core::events::LinkEvent;
use loralink_proto::Packet;

use crate::frame;

/// Cap on buffered bytes awaiting a frame boundary.
///
/// Only sustained garbage with no valid markers can grow the accumulator
/// this far; a reset then re-synchronizes on the next start marker.
const MAX_ACCUMULATED: usize = 64 * 1024;

/// Accumulates link bytes and yields decoded packets.
///
/// One demux instance is meant to live as long as its connection: the
/// residual buffer (a trailing partial frame) carries over between
/// operations on the same instance. Dropping the demux intentionally
/// discards that partial frame.
#[derive(Debug)]
pub struct PacketDemux {
    buf: BytesMut,
    events: broadcast::Sender<LinkEvent>,
}

impl PacketDemux {
    /// Create an empty demux reporting side-channel events to `events`.
    pub fn new(events: broadcast::Sender<LinkEvent>) -> Self {
        PacketDemux {
            buf: BytesMut::with_capacity(1024),
            events,
        }
    }

    /// Append a chunk read from the link.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > MAX_ACCUMULATED {
            let dropped = self.buf.len();
            tracing::warn!(dropped, "accumulator overflow, resetting");
            let _ = self
                .events
                .send(LinkEvent::AccumulatorOverflow { dropped });
            self.buf.clear();
        }
    }

    /// Extract and decode the next complete packet, if one is buffered.
    ///
    /// Malformed frames are skipped with a [`LinkEvent::DecodeFailed`]; the
    /// scan then continues, so `None` always means "no complete frame left",
    /// never "gave up mid-buffer".
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            match frame::scan_frame(&self.buf) {
                Some((payload, consumed)) => {
                    self.buf.advance(consumed);
                    match loralink_proto::decode_packet(&payload) {
                        Ok(packet) => return Some(packet),
                        Err(e) => {
                            tracing::warn!(
                                frame_len = payload.len(),
                                error = %e,
                                "skipping undecodable frame"
                            );
                            let _ = self.events.send(LinkEvent::DecodeFailed {
                                frame_len: payload.len(),
                            });
                        }
                    }
                }
                None => {
                    // Shed leading noise so silence on the link cannot pin
                    // garbage in memory.
                    let noise = frame::noise_prefix_len(&self.buf);
                    if noise > 0 {
                        self.buf.advance(noise);
                    }
                    return None;
                }
            }
        }
    }

    /// Discard everything buffered, including any trailing partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
