//! End-to-end console flow against a scripted link: query settings through
//! line noise, run a cancelled reception monitor, and persist the harvest.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use loralink::proto::Message;
use loralink::{
    frame, DeviceSession, GpsFix, JsonLinesSink, LogEntry, Packet, PacketKind, RadioState,
    RecordSink, Settings, StateHandle, StopReason,
};
use loralink_test_harness::MockTransport;

fn framed(packet: &Packet) -> Vec<u8> {
    frame::encode_frame(&packet.encode_to_vec())
}

fn node_settings() -> Settings {
    Settings {
        frequency: 915.0,
        power: 17,
        bandwidth: 125.0,
        spreading_factor: 8,
        coding_rate: 5,
        preamble: 8,
        crc_enabled: true,
        sync_word: 0x34,
        state: RadioState::Standby as i32,
    }
}

fn log_frame(crc_error: bool) -> Vec<u8> {
    framed(&Packet {
        kind: PacketKind::Log as i32,
        log: Some(LogEntry {
            crc_error,
            general_error: false,
            gps: Some(GpsFix {
                latitude: 63.43,
                longitude: 10.39,
                satellites: 8,
            }),
            rssi_log: (-97i32).to_le_bytes().to_vec(),
            rssi_avg: -97.0,
            snr: 6.5,
            payload: b"probe".to_vec(),
        }),
        ..Default::default()
    })
}

fn cancel_at_total(handle: StateHandle, cancel: CancellationToken, target: u64) {
    tokio::spawn(async move {
        loop {
            if handle.counters().received_total >= target {
                cancel.cancel();
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
}

#[tokio::test]
async fn noisy_settings_query_then_monitored_run_then_persist() {
    let mock = MockTransport::new();
    let ctl = mock.controller();
    let mut session = DeviceSession::new(Box::new(mock));

    // The node's settings reply arrives behind leftover line noise.
    let mut reply = b"garbage".to_vec();
    reply.extend_from_slice(&framed(&Packet {
        kind: PacketKind::Settings as i32,
        settings: Some(node_settings()),
        ..Default::default()
    }));
    ctl.expect(&framed(&Packet::settings_request()), &reply);

    let settings = session
        .await_settings(Some(Duration::from_secs(1)))
        .await
        .expect("settings through noise");
    assert_eq!(settings, node_settings());

    // One clean reception and one CRC failure, then a cancelled run.
    let mut telemetry = log_frame(false);
    telemetry.extend_from_slice(&log_frame(true));
    ctl.expect(
        &framed(&Packet::state_change(RadioState::Receiver)),
        &telemetry,
    );

    let cancel = CancellationToken::new();
    cancel_at_total(session.handle(), cancel.clone(), 2);
    let report = session
        .monitor_receptions(&cancel)
        .await
        .expect("monitoring run");

    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(report.records.len(), 2);
    assert!(!report.records[0].crc_error);
    assert!(report.records[1].crc_error);

    let counters = session.handle().counters();
    assert_eq!(counters.received_ok, 1);
    assert_eq!(counters.received_error, 1);
    assert_eq!(counters.received_total, 2);

    // Hand the harvest to the persistence sink.
    let dir = std::env::temp_dir().join(format!("loralink-flow-test-{}", std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    let mut sink = JsonLinesSink::new(&dir);
    sink.store("range-test", &report.records)
        .expect("records stored");

    let stored: Vec<_> = std::fs::read_dir(&dir)
        .expect("sink directory")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(stored.len(), 1);
    let name = stored[0].file_name().into_string().expect("utf8 name");
    assert!(name.starts_with("range-test_"));
    assert!(name.ends_with(".jsonl"));

    std::fs::remove_dir_all(&dir).ok();
    session.close().await.expect("clean close");
}
