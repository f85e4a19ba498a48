//! Packet message definitions and constructors.
//!
//! # Schema
//!
//! ```text
//! Packet {
//!   kind: PacketKind           // which sub-message is populated
//!   transmission: Transmission // kind == Transmission
//!   settings:     Settings     // kind == Settings (node echo or console update)
//!   request:      Request      // kind == Request
//!   gps:          GpsFix       // kind == Gps
//!   log:          LogEntry     // kind == Log (reception telemetry)
//! }
//! ```
//!
//! Sub-message presence is explicit (`Option`), so a field left at its zero
//! value is distinguishable from a field that was never set -- receivers
//! check presence, not magic values.

use prost::Message;

/// Discriminator for the active sub-message of a [`Packet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PacketKind {
    Transmission = 0,
    Settings = 1,
    Request = 2,
    Gps = 3,
    Log = 4,
}

/// Functional state of the node's radio.
///
/// The console commands transitions; the node is the authority for the
/// actual state. Consoles cache the last *commanded* value only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RadioState {
    Standby = 0,
    Transmitter = 1,
    Receiver = 2,
}

impl std::fmt::Display for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioState::Standby => write!(f, "standby"),
            RadioState::Transmitter => write!(f, "transmitter"),
            RadioState::Receiver => write!(f, "receiver"),
        }
    }
}

/// One message on the link, in either direction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    #[prost(enumeration = "PacketKind", tag = "1")]
    pub kind: i32,
    #[prost(message, optional, tag = "2")]
    pub transmission: Option<Transmission>,
    #[prost(message, optional, tag = "3")]
    pub settings: Option<Settings>,
    #[prost(message, optional, tag = "4")]
    pub request: Option<Request>,
    #[prost(message, optional, tag = "5")]
    pub gps: Option<GpsFix>,
    #[prost(message, optional, tag = "6")]
    pub log: Option<LogEntry>,
}

/// An over-the-air payload for the node to transmit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transmission {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,
}

/// Radio configuration, as reported by the node or pushed by the console.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Settings {
    /// Carrier frequency in MHz (e.g. 915.0).
    #[prost(float, tag = "1")]
    pub frequency: f32,
    /// Transmit power in dBm.
    #[prost(uint32, tag = "2")]
    pub power: u32,
    /// Signal bandwidth in kHz (e.g. 125.0, 250.0, 500.0).
    #[prost(float, tag = "3")]
    pub bandwidth: f32,
    #[prost(uint32, tag = "4")]
    pub spreading_factor: u32,
    /// Coding rate denominator: 5..=8 for 4/5..4/8.
    #[prost(uint32, tag = "5")]
    pub coding_rate: u32,
    /// Preamble length in symbols.
    #[prost(uint32, tag = "6")]
    pub preamble: u32,
    #[prost(bool, tag = "7")]
    pub crc_enabled: bool,
    #[prost(uint32, tag = "8")]
    pub sync_word: u32,
    /// Functional state the radio reported alongside its settings.
    #[prost(enumeration = "RadioState", tag = "9")]
    pub state: i32,
}

/// A console request for node status and/or a state transition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(bool, tag = "1")]
    pub want_settings: bool,
    #[prost(bool, tag = "2")]
    pub want_gps: bool,
    /// Commanded state transition, when present.
    #[prost(enumeration = "RadioState", optional, tag = "3")]
    pub state_change: Option<i32>,
}

/// A GPS position fix from the node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpsFix {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
    #[prost(uint32, tag = "3")]
    pub satellites: u32,
}

/// Reception telemetry for one received (or echoed) transmission.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogEntry {
    #[prost(bool, tag = "1")]
    pub crc_error: bool,
    #[prost(bool, tag = "2")]
    pub general_error: bool,
    #[prost(message, optional, tag = "3")]
    pub gps: Option<GpsFix>,
    /// RSSI samples taken during reception, packed little-endian i32.
    #[prost(bytes = "vec", tag = "4")]
    pub rssi_log: Vec<u8>,
    #[prost(float, tag = "5")]
    pub rssi_avg: f32,
    #[prost(float, tag = "6")]
    pub snr: f32,
    #[prost(bytes = "vec", tag = "7")]
    pub payload: Vec<u8>,
}

impl Packet {
    /// The typed kind tag. Unknown wire values fall back to `Transmission`.
    pub fn kind(&self) -> PacketKind {
        PacketKind::try_from(self.kind).unwrap_or(PacketKind::Transmission)
    }

    /// A request asking the node to report its current settings.
    pub fn settings_request() -> Self {
        Packet {
            kind: PacketKind::Request as i32,
            request: Some(Request {
                want_settings: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A request asking the node to report its GPS fix.
    pub fn gps_request() -> Self {
        Packet {
            kind: PacketKind::Request as i32,
            request: Some(Request {
                want_gps: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A request commanding a radio state transition.
    pub fn state_change(state: RadioState) -> Self {
        Packet {
            kind: PacketKind::Request as i32,
            request: Some(Request {
                state_change: Some(state as i32),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A transmission carrying `payload` over the air.
    pub fn transmission(payload: impl Into<Vec<u8>>) -> Self {
        Packet {
            kind: PacketKind::Transmission as i32,
            transmission: Some(Transmission {
                payload: payload.into(),
            }),
            ..Default::default()
        }
    }

    /// A settings update pushed from the console to the node.
    pub fn settings_update(settings: Settings) -> Self {
        Packet {
            kind: PacketKind::Settings as i32,
            settings: Some(settings),
            ..Default::default()
        }
    }
}

impl Request {
    /// The commanded state transition, if one was set.
    pub fn state_change(&self) -> Option<RadioState> {
        self.state_change.and_then(|v| RadioState::try_from(v).ok())
    }
}

impl Settings {
    /// The typed functional state. Unknown wire values read as `Standby`.
    pub fn state(&self) -> RadioState {
        RadioState::try_from(self.state).unwrap_or(RadioState::Standby)
    }
}

/// Decode one packet from a frame payload.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, prost::DecodeError> {
    Packet::decode(bytes)
}

/// Unpack the packed RSSI sample field into signed samples.
///
/// The node appends each sample as a little-endian i32; a trailing partial
/// sample (which a well-formed node never produces) is ignored.
pub fn unpack_rssi(raw: &[u8]) -> Vec<i32> {
    raw.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
