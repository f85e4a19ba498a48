//! DeviceSession -- the stateful facade for one console <-> node connection.
//!
//! A session owns the byte link exclusively, keeps the last-known settings,
//! GPS fix, and traffic counters behind a single lock, and composes the
//! frame codec, demultiplexer, and dispatcher into the operator-facing
//! verbs: status requests, transmissions, and the two monitoring runs.
//!
//! Exactly one session drives a given connection at a time. A display or
//! reporting thread observes the session through a cloneable [`StateHandle`]
//! that takes read-only snapshots and never blocks dispatch for long.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::RngCore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use loralink_core::error::{Error, Result};
use loralink_core::events::LinkEvent;
use loralink_core::transport::Transport;
use loralink_proto::{GpsFix, Message, Packet, PacketKind, RadioState, Settings};

use crate::demux::PacketDemux;
use crate::dispatch::{run_dispatch, DispatchOutcome, DispatchSignal};
use crate::frame;
use crate::records::{ReceptionLogBook, ReceptionRecord};

/// Maximum over-the-air payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Capacity of the side-channel event broadcast.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// When reception counters are zeroed relative to monitoring runs.
///
/// The deployed console generations disagreed on this; both behaviors are
/// preserved as named options instead of silently picking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterReset {
    /// Zero the reception counters at the start of every monitoring run.
    EveryMonitor,
    /// Zero them only for the session's first monitoring run; later runs
    /// accumulate on top.
    FirstMonitorOnly,
}

/// Tunables for a [`DeviceSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long one transport poll waits for bytes before yielding.
    pub poll_interval: Duration,
    /// Whether a settings update blocks until the node echoes the new
    /// settings back.
    pub verify_settings: bool,
    /// Deadline for that echo when verification is on.
    pub verify_timeout: Duration,
    /// Reception counter reset policy across monitoring runs.
    pub counter_reset: CounterReset,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            poll_interval: Duration::from_millis(100),
            verify_settings: false,
            verify_timeout: Duration::from_secs(2),
            counter_reset: CounterReset::EveryMonitor,
        }
    }
}

/// Session traffic counters.
///
/// `received_total == received_ok + received_error` holds at every
/// observation point: all three are updated under one lock acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub transmitted: u64,
    pub received_ok: u64,
    pub received_error: u64,
    pub received_total: u64,
}

impl Counters {
    /// Fraction of receptions that were error-free, in `0.0..=1.0`.
    ///
    /// Always derived from the counters, never stored, so it cannot drift.
    pub fn success_rate(&self) -> f64 {
        if self.received_total == 0 {
            0.0
        } else {
            self.received_ok as f64 / self.received_total as f64
        }
    }
}

/// Why a monitoring run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's cancellation token fired. Not a failure.
    Cancelled,
    /// The byte link closed mid-run.
    LinkClosed,
}

/// The outcome of a monitoring run: everything accumulated before it ended,
/// plus why it ended. Partial results are always preserved.
#[derive(Debug)]
pub struct MonitorReport {
    pub records: Vec<ReceptionRecord>,
    pub stop: StopReason,
}

/// State shared between the dispatching task and observers.
#[derive(Debug)]
struct SessionShared {
    settings: Option<Settings>,
    gps: Option<GpsFix>,
    /// Last *commanded* radio state; the node is the authority for the
    /// actual state.
    commanded_state: RadioState,
    counters: Counters,
    monitor_runs: u64,
}

fn lock(shared: &Arc<Mutex<SessionShared>>) -> MutexGuard<'_, SessionShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read-only view of a session's cached state and counters.
///
/// Cloneable and cheap; hand one to whatever renders status. Every accessor
/// takes a consistent snapshot under the session's single state lock.
#[derive(Debug, Clone)]
pub struct StateHandle {
    shared: Arc<Mutex<SessionShared>>,
}

impl StateHandle {
    pub fn counters(&self) -> Counters {
        lock(&self.shared).counters
    }

    pub fn settings(&self) -> Option<Settings> {
        lock(&self.shared).settings.clone()
    }

    pub fn gps(&self) -> Option<GpsFix> {
        lock(&self.shared).gps.clone()
    }

    pub fn commanded_state(&self) -> RadioState {
        lock(&self.shared).commanded_state
    }
}

/// A live conversation with one LoRa node over one byte link.
pub struct DeviceSession {
    transport: Box<dyn Transport>,
    demux: PacketDemux,
    shared: Arc<Mutex<SessionShared>>,
    event_tx: broadcast::Sender<LinkEvent>,
    config: SessionConfig,
}

impl DeviceSession {
    /// Create a session over `transport` with default configuration.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        DeviceSession {
            transport,
            demux: PacketDemux::new(event_tx.clone()),
            shared: Arc::new(Mutex::new(SessionShared {
                settings: None,
                gps: None,
                commanded_state: RadioState::Standby,
                counters: Counters::default(),
                monitor_runs: 0,
            })),
            event_tx,
            config,
        }
    }

    /// A read-only handle for display/reporting threads.
    pub fn handle(&self) -> StateHandle {
        StateHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Subscribe to side-channel link events (decode failures, link loss).
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Close the underlying link and consume the session.
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Encode a packet into a frame and write it out.
    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let framed = frame::encode_frame(&packet.encode_to_vec());
        self.transport.send(&framed).await
    }

    // -----------------------------------------------------------------
    // Fire-and-forget requests
    // -----------------------------------------------------------------

    /// Ask the node to report its settings. Does not wait for the reply.
    pub async fn request_settings(&mut self) -> Result<()> {
        self.write_packet(&Packet::settings_request()).await
    }

    /// Ask the node to report its GPS fix. Does not wait for the reply.
    pub async fn request_gps(&mut self) -> Result<()> {
        self.write_packet(&Packet::gps_request()).await
    }

    /// Command a radio state transition.
    ///
    /// Advisory bookkeeping only: the commanded value is cached, but the
    /// session never blocks on the node confirming the transition.
    pub async fn request_state_change(&mut self, state: RadioState) -> Result<()> {
        self.write_packet(&Packet::state_change(state)).await?;
        lock(&self.shared).commanded_state = state;
        debug!(state = %state, "commanded radio state");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Blocking request/response verbs
    // -----------------------------------------------------------------

    /// Request settings and block until the node replies with them.
    ///
    /// With a timeout, fails with [`Error::Timeout`] if it elapses first and
    /// leaves the cached settings unchanged; without one, blocks until the
    /// reply or link closure.
    pub async fn await_settings(&mut self, timeout: Option<Duration>) -> Result<Settings> {
        self.transport.reset_input_buffer().await?;
        self.demux.clear();
        self.request_settings().await?;

        let shared = Arc::clone(&self.shared);
        let mut found: Option<Settings> = None;
        let cancel = CancellationToken::new();
        let dispatch = run_dispatch(
            self.transport.as_mut(),
            &mut self.demux,
            &cancel,
            self.config.poll_interval,
            |packet| {
                if packet.kind() == PacketKind::Settings {
                    if let Some(settings) = packet.settings {
                        lock(&shared).settings = Some(settings.clone());
                        found = Some(settings);
                        return DispatchSignal::Stop;
                    }
                }
                DispatchSignal::Continue
            },
        );

        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, dispatch).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::Timeout),
            },
            None => dispatch.await?,
        };

        match outcome {
            DispatchOutcome::HandlerStopped => {
                found.ok_or_else(|| Error::Decode("settings reply carried no body".into()))
            }
            _ => Err(Error::ConnectionLost),
        }
    }

    /// Request settings and GPS together and block until both have arrived.
    ///
    /// A kind arriving twice before the other shows up is counted once; the
    /// first reply of each kind wins.
    pub async fn await_status(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Settings, GpsFix)> {
        self.transport.reset_input_buffer().await?;
        self.demux.clear();
        self.request_settings().await?;
        self.request_gps().await?;

        let shared = Arc::clone(&self.shared);
        let mut got_settings: Option<Settings> = None;
        let mut got_gps: Option<GpsFix> = None;
        let cancel = CancellationToken::new();
        let dispatch = run_dispatch(
            self.transport.as_mut(),
            &mut self.demux,
            &cancel,
            self.config.poll_interval,
            |packet| {
                match packet.kind() {
                    PacketKind::Settings if got_settings.is_none() => {
                        if let Some(settings) = packet.settings {
                            lock(&shared).settings = Some(settings.clone());
                            got_settings = Some(settings);
                        }
                    }
                    PacketKind::Gps if got_gps.is_none() => {
                        if let Some(fix) = packet.gps {
                            lock(&shared).gps = Some(fix.clone());
                            got_gps = Some(fix);
                        }
                    }
                    _ => {}
                }
                if got_settings.is_some() && got_gps.is_some() {
                    DispatchSignal::Stop
                } else {
                    DispatchSignal::Continue
                }
            },
        );

        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, dispatch).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::Timeout),
            },
            None => dispatch.await?,
        };

        match outcome {
            DispatchOutcome::HandlerStopped => match (got_settings, got_gps) {
                (Some(settings), Some(gps)) => Ok((settings, gps)),
                _ => Err(Error::Decode("status reply carried no body".into())),
            },
            _ => Err(Error::ConnectionLost),
        }
    }

    // -----------------------------------------------------------------
    // Transmission
    // -----------------------------------------------------------------

    /// Hand the node a payload to transmit over the air.
    pub async fn transmit(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidParameter(format!(
                "payload is {} bytes, limit is {MAX_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        self.write_packet(&Packet::transmission(payload.to_vec()))
            .await?;
        lock(&self.shared).counters.transmitted += 1;
        Ok(())
    }

    /// Push new radio settings to the node.
    ///
    /// Values are validated before anything is written. When
    /// [`SessionConfig::verify_settings`] is on, blocks until the node
    /// echoes its settings back and returns the echo; otherwise returns
    /// `None` immediately after the write.
    pub async fn update_settings(&mut self, settings: Settings) -> Result<Option<Settings>> {
        validate_settings(&settings)?;
        self.write_packet(&Packet::settings_update(settings)).await?;

        if self.config.verify_settings {
            let echoed = self.await_settings(Some(self.config.verify_timeout)).await?;
            Ok(Some(echoed))
        } else {
            Ok(None)
        }
    }

    // -----------------------------------------------------------------
    // Monitoring runs
    // -----------------------------------------------------------------

    /// Receive telemetry until cancelled, collecting one record per
    /// reception.
    ///
    /// Commands the node into `Receiver` for the duration and back to
    /// `Standby` afterwards. Every telemetry packet bumps `received_total`
    /// and one of `received_ok` / `received_error` (by CRC result) before
    /// its record is appended. Cancellation returns whatever was
    /// accumulated; so does link closure, flagged in the report.
    pub async fn monitor_receptions(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<MonitorReport> {
        self.transport.reset_input_buffer().await?;
        self.demux.clear();
        self.begin_monitor_run(false);
        self.request_state_change(RadioState::Receiver).await?;

        let shared = Arc::clone(&self.shared);
        let mut book = ReceptionLogBook::new();
        let outcome = run_dispatch(
            self.transport.as_mut(),
            &mut self.demux,
            cancel,
            self.config.poll_interval,
            |packet| {
                if packet.kind() == PacketKind::Log {
                    if let Some(log) = packet.log {
                        let record = ReceptionRecord::from_log(&log);
                        {
                            let mut state = lock(&shared);
                            state.counters.received_total += 1;
                            if log.crc_error {
                                state.counters.received_error += 1;
                            } else {
                                state.counters.received_ok += 1;
                            }
                        }
                        book.append(record);
                    }
                }
                DispatchSignal::Continue
            },
        )
        .await?;

        let stop = self.finish_monitor_run(outcome).await;
        Ok(MonitorReport {
            records: book.drain(),
            stop,
        })
    }

    /// Transmit random probes and log each echo until cancelled.
    ///
    /// Sends one `payload_size`-byte random payload up front, then lets the
    /// echo drive the cadence: each inbound telemetry packet is recorded
    /// (carrying the payload that was last sent), counted by its
    /// `general_error` flag, and answered with a fresh random payload after
    /// `inter_delay`. No fixed transmit timer exists.
    pub async fn monitor_transmit_echo(
        &mut self,
        payload_size: usize,
        inter_delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<MonitorReport> {
        if payload_size > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidParameter(format!(
                "payload size {payload_size} exceeds limit of {MAX_PAYLOAD_LEN}"
            )));
        }

        self.begin_monitor_run(true);
        self.request_state_change(RadioState::Transmitter).await?;

        let mut book = ReceptionLogBook::new();
        let mut payload = random_payload(payload_size);
        self.transmit(&payload).await?;

        let final_outcome = loop {
            // Pace after every send, preempted by cancellation.
            if !inter_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break DispatchOutcome::Cancelled,
                    _ = tokio::time::sleep(inter_delay) => {}
                }
            }

            let shared = Arc::clone(&self.shared);
            let sent = payload.clone();
            let outcome = run_dispatch(
                self.transport.as_mut(),
                &mut self.demux,
                cancel,
                self.config.poll_interval,
                |packet| {
                    if packet.kind() == PacketKind::Log {
                        if let Some(log) = packet.log {
                            let mut record = ReceptionRecord::from_log(&log);
                            // The echo acknowledges our probe; record what
                            // actually went over the air.
                            record.payload = sent.clone();
                            {
                                let mut state = lock(&shared);
                                state.counters.received_total += 1;
                                if log.general_error {
                                    state.counters.received_error += 1;
                                } else {
                                    state.counters.received_ok += 1;
                                }
                            }
                            book.append(record);
                            return DispatchSignal::Stop;
                        }
                    }
                    DispatchSignal::Continue
                },
            )
            .await?;

            match outcome {
                DispatchOutcome::HandlerStopped => {
                    payload = random_payload(payload_size);
                    match self.transmit(&payload).await {
                        Ok(()) => {}
                        Err(Error::ConnectionLost) | Err(Error::NotConnected) => {
                            break DispatchOutcome::LinkClosed;
                        }
                        Err(e) => return Err(e),
                    }
                }
                other => break other,
            }
        };

        let stop = self.finish_monitor_run(final_outcome).await;
        Ok(MonitorReport {
            records: book.drain(),
            stop,
        })
    }

    /// Zero the reception counters per the configured policy.
    fn begin_monitor_run(&self, include_transmitted: bool) {
        let mut state = lock(&self.shared);
        let reset = match self.config.counter_reset {
            CounterReset::EveryMonitor => true,
            CounterReset::FirstMonitorOnly => state.monitor_runs == 0,
        };
        if reset {
            state.counters.received_ok = 0;
            state.counters.received_error = 0;
            state.counters.received_total = 0;
            if include_transmitted {
                state.counters.transmitted = 0;
            }
        }
        state.monitor_runs += 1;
    }

    /// Wind a monitoring run down: report closure, or command standby on a
    /// still-open link (best effort; the transition is advisory).
    async fn finish_monitor_run(&mut self, outcome: DispatchOutcome) -> StopReason {
        match outcome {
            DispatchOutcome::LinkClosed => {
                let _ = self.event_tx.send(LinkEvent::LinkClosed);
                StopReason::LinkClosed
            }
            _ => {
                if let Err(e) = self.request_state_change(RadioState::Standby).await {
                    warn!(error = %e, "failed to command standby after monitoring");
                }
                StopReason::Cancelled
            }
        }
    }
}

/// Reject out-of-range radio parameters before anything is written.
fn validate_settings(settings: &Settings) -> Result<()> {
    if !(150.0..=960.0).contains(&settings.frequency) {
        return Err(Error::InvalidParameter(format!(
            "frequency {} MHz outside 150-960 MHz",
            settings.frequency
        )));
    }
    if settings.power > 22 {
        return Err(Error::InvalidParameter(format!(
            "power {} dBm exceeds 22 dBm",
            settings.power
        )));
    }
    if !(settings.bandwidth > 0.0 && settings.bandwidth <= 500.0) {
        return Err(Error::InvalidParameter(format!(
            "bandwidth {} kHz outside 0-500 kHz",
            settings.bandwidth
        )));
    }
    if !(5..=12).contains(&settings.spreading_factor) {
        return Err(Error::InvalidParameter(format!(
            "spreading factor {} outside 5-12",
            settings.spreading_factor
        )));
    }
    if !(5..=8).contains(&settings.coding_rate) {
        return Err(Error::InvalidParameter(format!(
            "coding rate 4/{} outside 4/5-4/8",
            settings.coding_rate
        )));
    }
    Ok(())
}

fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use loralink_proto::LogEntry;
    use loralink_test_harness::{MockController, MockTransport};

    fn framed(packet: &Packet) -> Vec<u8> {
        frame::encode_frame(&packet.encode_to_vec())
    }

    fn sample_settings() -> Settings {
        Settings {
            frequency: 868.0,
            power: 14,
            bandwidth: 125.0,
            spreading_factor: 9,
            coding_rate: 5,
            preamble: 8,
            crc_enabled: true,
            sync_word: 0x34,
            state: RadioState::Standby as i32,
        }
    }

    fn settings_reply(settings: Settings) -> Vec<u8> {
        framed(&Packet {
            kind: PacketKind::Settings as i32,
            settings: Some(settings),
            ..Default::default()
        })
    }

    fn gps_reply(fix: GpsFix) -> Vec<u8> {
        framed(&Packet {
            kind: PacketKind::Gps as i32,
            gps: Some(fix),
            ..Default::default()
        })
    }

    fn log_reply(crc_error: bool, general_error: bool) -> Vec<u8> {
        framed(&Packet {
            kind: PacketKind::Log as i32,
            log: Some(LogEntry {
                crc_error,
                general_error,
                gps: Some(GpsFix {
                    latitude: 45.0,
                    longitude: 9.0,
                    satellites: 6,
                }),
                rssi_log: (-88i32).to_le_bytes().to_vec(),
                rssi_avg: -88.0,
                snr: 8.0,
                payload: vec![0x55; 4],
            }),
            ..Default::default()
        })
    }

    fn session() -> (DeviceSession, MockController) {
        let mock = MockTransport::new();
        let ctl = mock.controller();
        (DeviceSession::new(Box::new(mock)), ctl)
    }

    /// Cancel `cancel` once the session has counted `target` receptions.
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

    // -----------------------------------------------------------------
    // Transmission
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn transmit_writes_framed_packet_and_counts() {
        let (mut session, ctl) = session();
        session.transmit(&[1, 2, 3]).await.unwrap();

        let sent = ctl.sent_data();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], framed(&Packet::transmission(vec![1, 2, 3])));
        assert_eq!(session.handle().counters().transmitted, 1);
    }

    #[tokio::test]
    async fn transmit_accepts_boundary_sizes() {
        let (mut session, _ctl) = session();
        session.transmit(&[]).await.unwrap();
        session.transmit(&vec![0u8; MAX_PAYLOAD_LEN]).await.unwrap();
        assert_eq!(session.handle().counters().transmitted, 2);
    }

    #[tokio::test]
    async fn transmit_rejects_oversize_before_writing() {
        let (mut session, ctl) = session();
        let result = session.transmit(&vec![0u8; MAX_PAYLOAD_LEN + 1]).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(ctl.sent_data().is_empty());
        assert_eq!(session.handle().counters().transmitted, 0);
    }

    // -----------------------------------------------------------------
    // Blocking verbs
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn await_settings_skips_noise_and_caches() {
        let (mut session, ctl) = session();
        let mut reply = b"garbage".to_vec();
        reply.extend_from_slice(&settings_reply(sample_settings()));
        ctl.expect(&framed(&Packet::settings_request()), &reply);

        let settings = session
            .await_settings(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(settings, sample_settings());
        assert_eq!(session.handle().settings(), Some(sample_settings()));
    }

    #[tokio::test]
    async fn await_settings_times_out_without_reply() {
        let (mut session, _ctl) = session();
        let result = session.await_settings(Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(session.handle().settings(), None);
    }

    #[tokio::test]
    async fn await_settings_reports_link_closure() {
        let (mut session, ctl) = session();
        ctl.close_when_drained();
        let result = session.await_settings(Some(Duration::from_secs(1))).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn await_status_collects_both_kinds() {
        let (mut session, ctl) = session();
        let fix = GpsFix {
            latitude: 52.52,
            longitude: 13.4,
            satellites: 11,
        };
        ctl.expect(
            &framed(&Packet::settings_request()),
            &settings_reply(sample_settings()),
        );
        ctl.expect(&framed(&Packet::gps_request()), &gps_reply(fix.clone()));

        let (settings, gps) = session
            .await_status(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(settings, sample_settings());
        assert_eq!(gps, fix);
        assert_eq!(session.handle().gps(), Some(fix));
    }

    #[tokio::test]
    async fn await_status_first_of_each_kind_wins() {
        let (mut session, ctl) = session();
        let mut second = sample_settings();
        second.power = 2;

        // Two settings replies arrive before the GPS fix; only the first
        // must be kept.
        let mut reply = settings_reply(sample_settings());
        reply.extend_from_slice(&settings_reply(second));
        reply.extend_from_slice(&gps_reply(GpsFix::default()));
        ctl.expect(&framed(&Packet::settings_request()), &reply);

        let (settings, _gps) = session
            .await_status(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(settings, sample_settings());
        assert_eq!(session.handle().settings(), Some(sample_settings()));
    }

    // -----------------------------------------------------------------
    // Settings updates
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn update_settings_rejects_bad_values_before_writing() {
        let (mut session, ctl) = session();

        let mut bad = sample_settings();
        bad.frequency = 1200.0;
        assert!(matches!(
            session.update_settings(bad).await,
            Err(Error::InvalidParameter(_))
        ));

        let mut bad = sample_settings();
        bad.spreading_factor = 13;
        assert!(matches!(
            session.update_settings(bad).await,
            Err(Error::InvalidParameter(_))
        ));

        assert!(ctl.sent_data().is_empty());
    }

    #[tokio::test]
    async fn update_settings_fire_and_forget_by_default() {
        let (mut session, ctl) = session();
        let result = session.update_settings(sample_settings()).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(
            ctl.sent_data(),
            vec![framed(&Packet::settings_update(sample_settings()))]
        );
    }

    #[tokio::test]
    async fn update_settings_verified_returns_echo() {
        let mock = MockTransport::new();
        let ctl = mock.controller();
        let config = SessionConfig {
            verify_settings: true,
            ..Default::default()
        };
        let mut session = DeviceSession::with_config(Box::new(mock), config);

        // The verification pass re-requests settings; the node echoes them.
        ctl.expect(
            &framed(&Packet::settings_request()),
            &settings_reply(sample_settings()),
        );

        let echoed = session.update_settings(sample_settings()).await.unwrap();
        assert_eq!(echoed, Some(sample_settings()));
        assert_eq!(session.handle().settings(), Some(sample_settings()));
    }

    // -----------------------------------------------------------------
    // Reception monitoring
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn monitor_receptions_counts_and_preserves_partial_results() {
        let (mut session, ctl) = session();
        let mut telemetry = log_reply(false, false);
        telemetry.extend_from_slice(&log_reply(true, false));
        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &telemetry,
        );

        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 2);

        let report = session.monitor_receptions(&cancel).await.unwrap();
        assert_eq!(report.stop, StopReason::Cancelled);
        assert_eq!(report.records.len(), 2);
        assert!(!report.records[0].crc_error);
        assert!(report.records[1].crc_error);

        let counters = session.handle().counters();
        assert_eq!(counters.received_total, 2);
        assert_eq!(counters.received_ok, 1);
        assert_eq!(counters.received_error, 1);
        assert_eq!(
            counters.received_total,
            counters.received_ok + counters.received_error
        );

        // Receiver commanded going in, standby on the way out.
        let sent = ctl.sent_data();
        assert_eq!(sent[0], framed(&Packet::state_change(RadioState::Receiver)));
        assert_eq!(
            sent.last().unwrap(),
            &framed(&Packet::state_change(RadioState::Standby))
        );
        assert_eq!(session.handle().commanded_state(), RadioState::Standby);
    }

    #[tokio::test]
    async fn monitor_receptions_keeps_records_on_link_loss() {
        let (mut session, ctl) = session();
        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &log_reply(false, false),
        );
        ctl.close_when_drained();

        let cancel = CancellationToken::new();
        let report = session.monitor_receptions(&cancel).await.unwrap();
        assert_eq!(report.stop, StopReason::LinkClosed);
        assert_eq!(report.records.len(), 1);
        assert_eq!(session.handle().counters().received_total, 1);
    }

    #[tokio::test]
    async fn monitor_reset_every_run_by_default() {
        let (mut session, ctl) = session();
        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &{
                let mut t = log_reply(false, false);
                t.extend_from_slice(&log_reply(true, false));
                t
            },
        );

        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 2);
        session.monitor_receptions(&cancel).await.unwrap();
        assert_eq!(session.handle().counters().received_total, 2);

        // Second run: counters restart from zero no matter their prior value.
        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &log_reply(false, false),
        );
        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 1);
        let report = session.monitor_receptions(&cancel).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(session.handle().counters().received_total, 1);
    }

    #[tokio::test]
    async fn monitor_reset_first_run_only_accumulates() {
        let mock = MockTransport::new();
        let ctl = mock.controller();
        let config = SessionConfig {
            counter_reset: CounterReset::FirstMonitorOnly,
            ..Default::default()
        };
        let mut session = DeviceSession::with_config(Box::new(mock), config);

        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &{
                let mut t = log_reply(false, false);
                t.extend_from_slice(&log_reply(true, false));
                t
            },
        );
        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 2);
        session.monitor_receptions(&cancel).await.unwrap();

        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &log_reply(false, false),
        );
        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 3);
        session.monitor_receptions(&cancel).await.unwrap();

        // Counters carried across the runs instead of restarting.
        assert_eq!(session.handle().counters().received_total, 3);
    }

    // -----------------------------------------------------------------
    // Transmit echo monitoring
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn monitor_transmit_echo_is_echo_driven() {
        let (mut session, ctl) = session();
        ctl.push_inbound(&log_reply(false, false));
        ctl.push_inbound(&log_reply(false, true));
        ctl.close_when_drained();

        let cancel = CancellationToken::new();
        let report = session
            .monitor_transmit_echo(8, Duration::ZERO, &cancel)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::LinkClosed);
        assert_eq!(report.records.len(), 2);

        let counters = session.handle().counters();
        // Initial probe, plus one fresh probe per echo.
        assert_eq!(counters.transmitted, 3);
        assert_eq!(counters.received_total, 2);
        assert_eq!(counters.received_ok, 1);
        assert_eq!(counters.received_error, 1);

        // The records carry the probes that went over the air.
        let sent = ctl.sent_data();
        // sent[0] is the transmitter state command, sent[1] the first probe.
        let (probe, _) = frame::scan_frame(&sent[1]).expect("framed probe");
        let probe = loralink_proto::decode_packet(&probe).expect("probe packet");
        assert_eq!(
            report.records[0].payload,
            probe.transmission.expect("transmission").payload
        );
        assert_eq!(report.records[0].payload.len(), 8);
    }

    #[tokio::test]
    async fn monitor_transmit_echo_rejects_oversize_probe() {
        let (mut session, ctl) = session();
        let cancel = CancellationToken::new();
        let result = session
            .monitor_transmit_echo(MAX_PAYLOAD_LEN + 1, Duration::ZERO, &cancel)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(ctl.sent_data().is_empty());
    }

    #[tokio::test]
    async fn monitor_transmit_echo_cancels_cleanly() {
        let (mut session, ctl) = session();
        ctl.push_inbound(&log_reply(false, false));

        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 1);

        let report = session
            .monitor_transmit_echo(4, Duration::ZERO, &cancel)
            .await
            .unwrap();
        assert_eq!(report.stop, StopReason::Cancelled);
        assert_eq!(report.records.len(), 1);
        assert_eq!(session.handle().commanded_state(), RadioState::Standby);
    }

    // -----------------------------------------------------------------
    // End-to-end: garbage, then settings, then a monitored run
    // -----------------------------------------------------------------

    #[tokio::test]
    async fn full_exchange_over_noisy_link() {
        let (mut session, ctl) = session();

        let mut reply = b"garbage".to_vec();
        reply.extend_from_slice(&settings_reply(sample_settings()));
        ctl.expect(&framed(&Packet::settings_request()), &reply);

        let settings = session
            .await_settings(Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(settings, sample_settings());

        let mut telemetry = log_reply(false, false);
        telemetry.extend_from_slice(&log_reply(true, false));
        ctl.expect(
            &framed(&Packet::state_change(RadioState::Receiver)),
            &telemetry,
        );

        let cancel = CancellationToken::new();
        cancel_at_total(session.handle(), cancel.clone(), 2);
        let report = session.monitor_receptions(&cancel).await.unwrap();

        assert_eq!(report.records.len(), 2);
        let counters = session.handle().counters();
        assert_eq!(counters.received_ok, 1);
        assert_eq!(counters.received_error, 1);
        assert_eq!(counters.received_total, 2);
    }

    // -----------------------------------------------------------------
    // Parameter validation
    // -----------------------------------------------------------------

    #[test]
    fn validate_settings_accepts_typical_profiles() {
        assert!(validate_settings(&sample_settings()).is_ok());

        let mut fast = sample_settings();
        fast.frequency = 915.0;
        fast.bandwidth = 500.0;
        fast.spreading_factor = 7;
        assert!(validate_settings(&fast).is_ok());
    }

    #[test]
    fn validate_settings_rejects_each_bad_field() {
        let mut s = sample_settings();
        s.frequency = 100.0;
        assert!(validate_settings(&s).is_err());

        let mut s = sample_settings();
        s.power = 30;
        assert!(validate_settings(&s).is_err());

        let mut s = sample_settings();
        s.bandwidth = 0.0;
        assert!(validate_settings(&s).is_err());

        let mut s = sample_settings();
        s.coding_rate = 9;
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    fn success_rate_is_derived() {
        let counters = Counters {
            transmitted: 0,
            received_ok: 3,
            received_error: 1,
            received_total: 4,
        };
        assert!((counters.success_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(Counters::default().success_rate(), 0.0);
    }
}
