//! loralink-transport: serial transport implementation for loralink.
//!
//! Provides [`SerialTransport`], the [`Transport`](loralink_core::Transport)
//! implementation for the USB virtual COM port a LoRa node enumerates as.
//! Port discovery/selection is the embedding application's concern; this
//! crate only opens a path it is given.

pub mod serial;

pub use serial::SerialTransport;
