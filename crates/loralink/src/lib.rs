//! # loralink -- console library for LoRa field-test nodes
//!
//! `loralink` drives a LoRa transceiver node over its USB serial link:
//! configure radio parameters, trigger transmissions, and harvest reception
//! telemetry (signal quality, GPS fix, payloads, error flags). It is the
//! engine a range-testing console builds on; the menus, port pickers, and
//! storage formats stay in the embedding application.
//!
//! ## Quick start
//!
//! ```no_run
//! use loralink::{DeviceSession, SerialTransport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> loralink::Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyACM0").await?;
//!     let mut session = DeviceSession::new(Box::new(transport));
//!
//!     let (settings, gps) = session.await_status(Some(Duration::from_secs(2))).await?;
//!     println!(
//!         "node at {} MHz, {} satellites in view",
//!         settings.frequency, gps.satellites
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                       |
//! |-------------------------|-----------------------------------------------|
//! | `loralink-core`         | [`Transport`] trait, [`LinkEvent`], errors    |
//! | `loralink-proto`        | Wire schema (prost packets)                   |
//! | `loralink-transport`    | Serial port transport                         |
//! | `loralink-session`      | Frame codec, demux, dispatch, [`DeviceSession`] |
//! | `loralink-test-harness` | Mock transport for deterministic tests        |
//! | **`loralink`**          | This facade crate -- re-exports everything    |
//!
//! ## Monitoring and cancellation
//!
//! The monitoring verbs ([`DeviceSession::monitor_receptions`],
//! [`DeviceSession::monitor_transmit_echo`]) run until an external
//! `CancellationToken` fires or the link closes, and always return the
//! records accumulated so far. Share a [`StateHandle`] with a display task
//! to render live counters while a run is in progress.

pub use loralink_core::{
    format_frequency_mhz, format_success_rate, format_sync_word, Error, LinkEvent, Result,
    Transport,
};
pub use loralink_proto::{GpsFix, LogEntry, Packet, PacketKind, RadioState, Settings};
pub use loralink_session::frame;
pub use loralink_session::{
    CounterReset, Counters, DeviceSession, DispatchSignal, JsonLinesSink, MonitorReport,
    PacketDemux, ReceptionLogBook, ReceptionRecord, RecordSink, SessionConfig, StateHandle,
    StopReason,
};
pub use loralink_transport::SerialTransport;

/// The wire schema crate, for callers that need to build raw packets.
pub use loralink_proto as proto;
