//! The read-decode-handle loop driving packet consumption.
//!
//! [`run_dispatch`] pulls bytes from a [`Transport`], feeds them through a
//! [`PacketDemux`], and invokes a caller-supplied handler for every decoded
//! packet, strictly in arrival order. The handler's return value is the only
//! early-exit mechanism: [`DispatchSignal::Stop`] ends the loop as a normal
//! result, never as an unwound exception.
//!
//! Long-running dispatch is the normal mode for monitoring operations, so
//! every call is paired with an external [`CancellationToken`]. Blocking
//! request/response verbs layer a deadline on top with
//! `tokio::time::timeout`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use loralink_core::error::{Error, Result};
use loralink_core::transport::Transport;
use loralink_proto::Packet;

use crate::demux::PacketDemux;

/// Read chunk size per transport poll.
const READ_CHUNK: usize = 256;

/// Pause after an empty poll so a silent link is not busy-spun.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// A handler's verdict after processing one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSignal {
    /// Keep dispatching.
    Continue,
    /// End the loop; the handler has what it came for.
    Stop,
}

/// Why a dispatch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler returned [`DispatchSignal::Stop`].
    HandlerStopped,
    /// The cancellation token fired.
    Cancelled,
    /// The transport reported closure.
    ///
    /// Reported as an outcome rather than an `Err` so monitoring callers can
    /// keep the partial results accumulated before the link went away.
    LinkClosed,
}

/// Run the dispatch loop until the handler stops it, the token cancels it,
/// or the link closes.
///
/// Packets already buffered in the demux are drained before the transport is
/// polled again, and the handler runs synchronously between packets -- state
/// it mutates is settled before the next packet is dispatched. There is no
/// implicit timeout.
pub async fn run_dispatch<F>(
    transport: &mut dyn Transport,
    demux: &mut PacketDemux,
    cancel: &CancellationToken,
    poll_interval: Duration,
    mut handler: F,
) -> Result<DispatchOutcome>
where
    F: FnMut(Packet) -> DispatchSignal,
{
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        while let Some(packet) = demux.next_packet() {
            if handler(packet) == DispatchSignal::Stop {
                return Ok(DispatchOutcome::HandlerStopped);
            }
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("dispatch cancelled");
                return Ok(DispatchOutcome::Cancelled);
            }

            read = poll_once(transport, &mut chunk, poll_interval) => match read? {
                Poll::Data(n) => demux.extend(&chunk[..n]),
                Poll::Quiet => {}
                Poll::Closed => {
                    debug!("link closed during dispatch");
                    return Ok(DispatchOutcome::LinkClosed);
                }
            }
        }
    }
}

enum Poll {
    Data(usize),
    Quiet,
    Closed,
}

/// One transport poll, folding "no data yet" conditions into a bounded wait
/// so the select above stays responsive to cancellation.
async fn poll_once(
    transport: &mut dyn Transport,
    chunk: &mut [u8],
    poll_interval: Duration,
) -> Result<Poll> {
    match transport.receive(chunk, poll_interval).await {
        Ok(0) | Err(Error::Timeout) => {
            tokio::time::sleep(IDLE_BACKOFF).await;
            Ok(Poll::Quiet)
        }
        Ok(n) => Ok(Poll::Data(n)),
        Err(Error::ConnectionLost) | Err(Error::NotConnected) => Ok(Poll::Closed),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loralink_proto::{Message, PacketKind};
    use loralink_test_harness::MockTransport;
    use tokio::sync::broadcast;

    use crate::frame;

    fn demux() -> PacketDemux {
        let (tx, _) = broadcast::channel(16);
        PacketDemux::new(tx)
    }

    fn framed(packet: &Packet) -> Vec<u8> {
        frame::encode_frame(&packet.encode_to_vec())
    }

    const POLL: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn handler_stop_ends_loop() {
        let mut mock = MockTransport::new();
        mock.controller().push_inbound(&framed(&Packet::gps_request()));

        let mut d = demux();
        let cancel = CancellationToken::new();
        let mut seen = 0;
        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |_| {
            seen += 1;
            DispatchSignal::Stop
        })
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::HandlerStopped);
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn packets_dispatched_in_arrival_order() {
        let mut mock = MockTransport::new();
        let ctl = mock.controller();
        let mut stream = framed(&Packet::settings_request());
        stream.extend_from_slice(&framed(&Packet::gps_request()));
        stream.extend_from_slice(&framed(&Packet::transmission(vec![1])));
        // One read delivers all three frames.
        ctl.push_inbound(&stream);

        let mut d = demux();
        let cancel = CancellationToken::new();
        let mut kinds = Vec::new();
        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |p| {
            kinds.push(p.kind());
            if kinds.len() == 3 {
                DispatchSignal::Stop
            } else {
                DispatchSignal::Continue
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::HandlerStopped);
        assert_eq!(
            kinds,
            vec![
                PacketKind::Request,
                PacketKind::Request,
                PacketKind::Transmission
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_ends_quiet_loop() {
        let mut mock = MockTransport::new();
        let mut d = demux();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |_| {
            DispatchSignal::Continue
        })
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Cancelled);
    }

    #[tokio::test]
    async fn link_closure_is_an_outcome_not_an_error() {
        let mut mock = MockTransport::new();
        let ctl = mock.controller();
        ctl.push_inbound(&framed(&Packet::gps_request()));
        ctl.close_when_drained();

        let mut d = demux();
        let cancel = CancellationToken::new();
        let mut seen = 0;
        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |_| {
            seen += 1;
            DispatchSignal::Continue
        })
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::LinkClosed);
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn buffered_packets_drain_before_next_read() {
        // Pre-buffered packets must be handled even if the transport is
        // already dead -- the demux is drained first.
        let mut mock = MockTransport::new();
        mock.controller().close_when_drained();

        let mut d = demux();
        d.extend(&framed(&Packet::gps_request()));

        let cancel = CancellationToken::new();
        let mut seen = 0;
        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |_| {
            seen += 1;
            DispatchSignal::Continue
        })
        .await
        .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(outcome, DispatchOutcome::LinkClosed);
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_immediately() {
        let mut mock = MockTransport::new();
        mock.controller().push_inbound(&framed(&Packet::gps_request()));

        let mut d = demux();
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Cancellation wins before the transport is ever polled.
        let mut seen = 0;
        let outcome = run_dispatch(&mut mock, &mut d, &cancel, POLL, |_| {
            seen += 1;
            DispatchSignal::Continue
        })
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Cancelled);
        assert_eq!(seen, 0);
    }
}
