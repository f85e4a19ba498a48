//! Query a node's settings and GPS fix and print them.
//!
//! Usage: `cargo run --example link_status -- /dev/ttyACM0`

use std::time::Duration;

use loralink::{
    format_frequency_mhz, format_sync_word, DeviceSession, SerialTransport,
};

#[tokio::main]
async fn main() -> loralink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());

    let transport = SerialTransport::open(&port).await?;
    let mut session = DeviceSession::new(Box::new(transport));

    let (settings, gps) = session.await_status(Some(Duration::from_secs(3))).await?;

    println!("node on {port}");
    println!("  frequency:        {}", format_frequency_mhz(settings.frequency));
    println!("  power:            {} dBm", settings.power);
    println!("  bandwidth:        {} kHz", settings.bandwidth);
    println!("  spreading factor: SF{}", settings.spreading_factor);
    println!("  coding rate:      4/{}", settings.coding_rate);
    println!("  preamble:         {} symbols", settings.preamble);
    println!("  crc:              {}", settings.crc_enabled);
    println!("  sync word:        {}", format_sync_word(settings.sync_word));
    println!(
        "  gps:              {:.5}, {:.5} ({} satellites)",
        gps.latitude, gps.longitude, gps.satellites
    );

    session.close().await
}
