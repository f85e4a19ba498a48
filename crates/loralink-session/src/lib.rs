//! loralink-session: framed packet transport and device session engine.
//!
//! This crate turns the raw byte stream of a [`Transport`] into typed
//! packets and coordinates one console's conversation with one node:
//!
//! - [`frame`] -- marker-delimited frame codec (pure functions, no I/O)
//! - [`demux`] -- accumulator that extracts and decodes packets from
//!   arbitrarily fragmented reads
//! - [`dispatch`] -- the cancellable read-decode-handle loop
//! - [`session`] -- [`DeviceSession`], the stateful facade exposing the
//!   operator verbs (status requests, transmissions, monitoring runs)
//! - [`records`] -- reception records, the in-memory log book, and the
//!   persistence seam
//!
//! [`Transport`]: loralink_core::Transport

pub mod demux;
pub mod dispatch;
pub mod frame;
pub mod records;
pub mod session;

pub use demux::PacketDemux;
pub use dispatch::{run_dispatch, DispatchOutcome, DispatchSignal};
pub use records::{JsonLinesSink, ReceptionLogBook, ReceptionRecord, RecordSink};
pub use session::{
    CounterReset, Counters, DeviceSession, MonitorReport, SessionConfig, StateHandle, StopReason,
};
