//! Log receptions until Ctrl-C, then store them as JSON lines.
//!
//! Usage: `cargo run --example monitor -- /dev/ttyACM0 range-test`

use loralink::{
    format_success_rate, DeviceSession, JsonLinesSink, RecordSink, SerialTransport, StopReason,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> loralink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let label = args.next().unwrap_or_else(|| "receptions".to_string());

    let transport = SerialTransport::open(&port).await?;
    let mut session = DeviceSession::new(Box::new(transport));
    let handle = session.handle();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.cancel();
        }
    });

    println!("monitoring receptions on {port}, Ctrl-C to stop");
    let report = session.monitor_receptions(&cancel).await?;

    let counters = handle.counters();
    println!(
        "\ntotal: {} | ok: {} | errors: {} | success rate: {}",
        counters.received_total,
        counters.received_ok,
        counters.received_error,
        format_success_rate(counters.received_ok, counters.received_total)
    );
    if report.stop == StopReason::LinkClosed {
        println!("link closed by the node side");
    }

    if !report.records.is_empty() {
        let mut sink = JsonLinesSink::new("receiver_tests");
        sink.store(&label, &report.records)?;
        println!("stored {} records under label {label:?}", report.records.len());
    }

    session.close().await
}
