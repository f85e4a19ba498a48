//! loralink-core: Core traits, types, and error definitions for loralink.
//!
//! This crate defines the link-agnostic abstractions the rest of the
//! workspace builds on. Operator consoles and test harnesses depend on these
//! types without pulling in a concrete transport or the session engine.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level duplex channel to the transceiver node
//! - [`LinkEvent`] -- out-of-band notifications (decode failures, link loss)
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;

// Re-export key types at crate root for ergonomic `use loralink_core::*`.
pub use error::{Error, Result};
pub use events::LinkEvent;
pub use helpers::{format_frequency_mhz, format_success_rate, format_sync_word};
pub use transport::Transport;
