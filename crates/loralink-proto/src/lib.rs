//! loralink-proto: wire schema for console <-> node packets.
//!
//! Every message on the serial link is one [`Packet`]: a kind tag plus
//! exactly one populated sub-message. The message definitions are written
//! out as hand-annotated prost structs so the crate builds without `protoc`;
//! the field numbers are the wire contract and must not be reassigned.
//!
//! This crate knows nothing about framing or transport -- it maps payload
//! bytes to typed packets and back, and that is all.

pub mod packet;

pub use packet::{
    decode_packet, unpack_rssi, GpsFix, LogEntry, Packet, PacketKind, RadioState, Request,
    Settings, Transmission,
};

// Re-export so callers can use `Packet::encode_to_vec` without naming prost.
pub use prost::Message;
