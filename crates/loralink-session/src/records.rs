//! Reception records, the in-memory log book, and the persistence seam.
//!
//! During a monitoring run the session appends one [`ReceptionRecord`] per
//! inbound telemetry packet to a [`ReceptionLogBook`]. When the run ends the
//! accumulated records are handed -- whole -- to a [`RecordSink`]; the book
//! itself never touches storage, keeping the session engine decoupled from
//! any on-disk format.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use loralink_core::error::{Error, Result};
use loralink_proto::{unpack_rssi, LogEntry};

/// A timestamped snapshot of one reception telemetry packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceptionRecord {
    /// When the console dispatched the telemetry packet.
    pub timestamp: DateTime<Utc>,
    pub crc_error: bool,
    pub general_error: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub satellites: u32,
    /// RSSI samples taken during reception, in dBm.
    pub rssi: Vec<i32>,
    pub rssi_avg: f32,
    pub snr: f32,
    pub payload: Vec<u8>,
}

impl ReceptionRecord {
    /// Build a record from a decoded telemetry entry, stamped now.
    pub fn from_log(log: &LogEntry) -> Self {
        let gps = log.gps.clone().unwrap_or_default();
        ReceptionRecord {
            timestamp: Utc::now(),
            crc_error: log.crc_error,
            general_error: log.general_error,
            latitude: gps.latitude,
            longitude: gps.longitude,
            satellites: gps.satellites,
            rssi: unpack_rssi(&log.rssi_log),
            rssi_avg: log.rssi_avg,
            snr: log.snr,
            payload: log.payload.clone(),
        }
    }
}

/// In-memory ordered accumulation of reception records.
#[derive(Debug, Default)]
pub struct ReceptionLogBook {
    records: Vec<ReceptionRecord>,
}

impl ReceptionLogBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the end of the book.
    pub fn append(&mut self, record: ReceptionRecord) {
        self.records.push(record);
    }

    /// Return all accumulated records and clear the book.
    pub fn drain(&mut self) -> Vec<ReceptionRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Durable storage for a completed monitoring run's records.
///
/// Implementations own the format and location; the session only hands over
/// an ordered, non-empty set and a caller-supplied label.
pub trait RecordSink {
    /// Store `records` under `label`.
    ///
    /// An empty set is rejected with
    /// [`Error::InvalidParameter`](loralink_core::Error::InvalidParameter)
    /// rather than producing an empty artifact.
    fn store(&mut self, label: &str, records: &[ReceptionRecord]) -> Result<()>;
}

/// A [`RecordSink`] writing one JSON object per record.
///
/// Files land in the sink's directory as `<label>_<Y-m-d_H-M-S>.jsonl`,
/// so repeated runs under the same label never clobber each other.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    directory: PathBuf,
}

impl JsonLinesSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        JsonLinesSink {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn target_path(&self, label: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
        self.directory.join(format!("{label}_{stamp}.jsonl"))
    }
}

impl RecordSink for JsonLinesSink {
    fn store(&mut self, label: &str, records: &[ReceptionRecord]) -> Result<()> {
        if records.is_empty() {
            return Err(Error::InvalidParameter(
                "refusing to store an empty record set".into(),
            ));
        }

        std::fs::create_dir_all(&self.directory)?;
        let path = self.target_path(label);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| Error::InvalidParameter(format!("unserializable record: {e}")))?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;

        tracing::info!(path = %path.display(), count = records.len(), "stored reception records");
        Ok(())
    }
}
