//! Serial port transport for the console <-> node link.
//!
//! LoRa test nodes enumerate as USB virtual COM ports and speak 8N1 at
//! 115200 baud, so unlike general-purpose rig control there is no
//! data-bits/parity/flow-control surface to configure -- just the path and,
//! rarely, a non-default baud rate.
//!
//! # Example
//!
//! ```no_run
//! use loralink_transport::SerialTransport;
//! use loralink_core::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> loralink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyACM0").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use loralink_core::error::{Error, Result};
use loralink_core::transport::Transport;

/// Default baud rate of the node's USB serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port transport to a LoRa node.
pub struct SerialTransport {
    /// The underlying serial stream; `None` after close.
    port: Option<SerialStream>,
    /// Port path kept for logging.
    port_name: String,
}

impl SerialTransport {
    /// Open a node's serial port at the default 115200 baud.
    pub async fn open(port: &str) -> Result<Self> {
        Self::open_with_baud(port, DEFAULT_BAUD_RATE).await
    }

    /// Open a node's serial port at a non-default baud rate.
    pub async fn open_with_baud(port: &str, baud_rate: u32) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate, "opening serial port");

        let stream = tokio_serial::new(port, baud_rate)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        tracing::info!(port = %port, baud_rate, "serial port opened");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    /// The path this transport was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn classify_io_error(port_name: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected {
        tracing::warn!(port = %port_name, "serial link lost");
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), "sending");

        if let Err(e) = port.write_all(data).await {
            return Err(classify_io_error(&self.port_name, e));
        }
        if let Err(e) = port.flush().await {
            return Err(classify_io_error(&self.port_name, e));
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "received");
                Ok(n)
            }
            Ok(Err(e)) => Err(classify_io_error(&self.port_name, e)),
            // No data within the poll window; the link itself is fine.
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn reset_input_buffer(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::debug!(port = %self.port_name, "discarding unread input");
        port.clear(ClearBuffer::Input)
            .map_err(|e| Error::Transport(format!("failed to clear input buffer: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
