//! Frame encoder/scanner for the serial link.
//!
//! Packets travel inside marker-delimited frames:
//!
//! ```text
//! <START> <payload bytes...> <END>
//! ```
//!
//! The markers are literal ASCII byte sequences fixed for the life of the
//! link. No escaping or stuffing is performed: the node firmware and this
//! codec share the assumption that an encoded packet never contains the end
//! marker. A payload that does contain it is mis-split at the first
//! occurrence -- a known limitation of the wire format, not of this module.
//!
//! Everything here is a pure function over byte slices; buffering and I/O
//! live in [`crate::demux`].

/// Start-of-frame marker.
pub const START_MARKER: &[u8] = b"<START>";

/// End-of-frame marker.
pub const END_MARKER: &[u8] = b"<END>";

/// Encode a payload into a complete frame ready for transmission.
///
/// # Example
///
/// ```
/// use loralink_session::frame::encode_frame;
///
/// assert_eq!(encode_frame(b"hi"), b"<START>hi<END>");
/// ```
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(START_MARKER.len() + payload.len() + END_MARKER.len());
    framed.extend_from_slice(START_MARKER);
    framed.extend_from_slice(payload);
    framed.extend_from_slice(END_MARKER);
    framed
}

/// Scan a buffer for the first complete frame.
///
/// Returns the payload between the first start marker and the first end
/// marker strictly after it, plus the total number of bytes to discard from
/// the front of the buffer (leading noise and both markers included).
/// Returns `None` when no complete frame is present yet; the buffer is left
/// for the caller to extend with more bytes.
///
/// Bytes preceding the start marker are treated as inter-frame noise and are
/// never surfaced as a payload.
///
/// # Example
///
/// ```
/// use loralink_session::frame::scan_frame;
///
/// let buf = b"junk<START>payload<END>trailing";
/// let (payload, consumed) = scan_frame(buf).unwrap();
/// assert_eq!(payload, b"payload");
/// assert_eq!(&buf[consumed..], b"trailing");
/// ```
pub fn scan_frame(buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    let start = find_marker(buf, START_MARKER)?;
    let payload_from = start + START_MARKER.len();
    let end = find_marker(&buf[payload_from..], END_MARKER)?;
    let payload = buf[payload_from..payload_from + end].to_vec();
    let consumed = payload_from + end + END_MARKER.len();
    Some((payload, consumed))
}

/// Number of leading bytes that cannot be part of any future frame.
///
/// When a buffer holds no complete frame, everything before the first start
/// marker is dead weight; with no start marker at all, everything but a
/// possible partial marker at the tail is. Callers drop this prefix to keep
/// memory bounded while waiting for more bytes.
pub fn noise_prefix_len(buf: &[u8]) -> usize {
    match find_marker(buf, START_MARKER) {
        Some(pos) => pos,
        None => buf.len().saturating_sub(START_MARKER.len() - 1),
    }
}

/// Find the position of the first occurrence of `marker` in `buf`.
fn find_marker(buf: &[u8], marker: &[u8]) -> Option<usize> {
    if buf.len() < marker.len() {
        return None;
    }
    buf.windows(marker.len()).position(|w| w == marker)
}
