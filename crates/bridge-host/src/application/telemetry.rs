//! Telemetry emission and the control tick.
//!
//! [`ControlTick`] is the fixed-cadence callback run by the scheduler.  Each
//! tick advances the rate counter, pushes due telemetry through the link
//! session, and runs the supervisor's reconnect-eligibility check.  It never
//! blocks: probe work is queued to the discovery worker via the connect
//! request channel, and session writes are bounded by the port timeouts.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_core::{Frame, PcStatKind, RateCounter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::supervisor::{ConnectOrigin, ConnectRequest, LinkSupervisor};
use crate::infrastructure::serial::LinkSession;
use crate::infrastructure::stats::{DiskIoMeter, PcStatsSample, PcStatsSampler};

/// Cadence of the control tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Cadence of PC resource sampling and emission.
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Which telemetry the typing path emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// Typing-rate frames only.
    RateOnly,
    /// Solenoid pulses only.
    SolenoidOnly,
    /// Both rate frames and solenoid pulses.
    #[default]
    Both,
}

impl TelemetryMode {
    pub fn sends_rate(self) -> bool {
        matches!(self, TelemetryMode::RateOnly | TelemetryMode::Both)
    }

    pub fn sends_solenoid(self) -> bool {
        matches!(self, TelemetryMode::SolenoidOnly | TelemetryMode::Both)
    }
}

/// Builds the PC status frame burst for one sample.
///
/// Opcode order matches the device's expectations: percentages first, then
/// whole-MB/s disk rates, then the ×10-quantized rates, then the optional
/// CPU temperature (clamped to 0–100 °C, omitted when no sensor is
/// readable).
pub fn pc_status_frames(
    sample: &PcStatsSample,
    disk_read_mb: f64,
    disk_write_mb: f64,
) -> Vec<Frame> {
    let mut frames = vec![
        Frame::PcStat(PcStatKind::CpuPercent, sample.cpu_percent),
        Frame::PcStat(PcStatKind::RamPercent, sample.ram_percent),
        Frame::PcStat(PcStatKind::DiskPercent, sample.disk_percent),
        Frame::PcStat(PcStatKind::DiskReadMb, disk_read_mb as i32),
        Frame::PcStat(PcStatKind::DiskWriteMb, disk_write_mb as i32),
        Frame::PcStat(PcStatKind::DiskReadDeciMb, (disk_read_mb * 10.0) as i32),
        Frame::PcStat(PcStatKind::DiskWriteDeciMb, (disk_write_mb * 10.0) as i32),
    ];
    if let Some(temp) = sample.cpu_temp_c {
        frames.push(Frame::PcStat(PcStatKind::CpuTempC, temp.clamp(0, 100)));
    }
    frames
}

/// The fixed-cadence control callback.
pub struct ControlTick {
    session: Arc<LinkSession>,
    supervisor: Arc<LinkSupervisor>,
    rate: Arc<RateCounter>,
    mode: TelemetryMode,
    connect_tx: Sender<ConnectRequest>,
    sampler: Option<Box<dyn PcStatsSampler>>,
    io_meter: DiskIoMeter,
    last_stats: Option<Instant>,
}

impl ControlTick {
    pub fn new(
        session: Arc<LinkSession>,
        supervisor: Arc<LinkSupervisor>,
        rate: Arc<RateCounter>,
        mode: TelemetryMode,
        connect_tx: Sender<ConnectRequest>,
    ) -> Self {
        Self {
            session,
            supervisor,
            rate,
            mode,
            connect_tx,
            sampler: None,
            io_meter: DiskIoMeter::new(),
            last_stats: None,
        }
    }

    /// Attaches a PC resource sampler; without one, stats are skipped.
    pub fn with_sampler(mut self, sampler: Box<dyn PcStatsSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Runs one tick at the current time.
    pub fn on_tick(&mut self) {
        self.on_tick_at(Instant::now());
    }

    /// Runs one tick at an explicit time (injected for tests).
    pub fn on_tick_at(&mut self, now: Instant) {
        let (rate, should_emit) = self.rate.advance(now);
        if should_emit && self.mode.sends_rate() {
            let rate = i32::try_from(rate).unwrap_or(i32::MAX);
            self.session.send(&Frame::Rate(rate));
        }

        self.emit_pc_stats(now);

        if self.supervisor.poll(now)
            && self
                .connect_tx
                .send(ConnectRequest::AutoDetect(ConnectOrigin::Auto))
                .is_err()
        {
            debug!("reconnect requested but the discovery worker is gone");
        }
    }

    fn emit_pc_stats(&mut self, now: Instant) {
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };
        let due = self
            .last_stats
            .map_or(true, |at| now.duration_since(at) >= STATS_INTERVAL);
        if !due {
            return;
        }
        self.last_stats = Some(now);

        let sample = sampler.sample();
        let totals = sampler.disk_io_totals();
        let (read_mb, write_mb) = self.io_meter.update(now, totals);
        for frame in pc_status_frames(&sample, read_mb, write_mb) {
            self.session.send(&frame);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::supervisor::{
        ConnectionState, LinkEvent, SupervisorConfig,
    };
    use crate::infrastructure::serial::mock::MockLinkFactory;
    use crate::infrastructure::serial::{LinkFactory, ProbeEngine, ProbeTimings};
    use crate::infrastructure::stats::{DiskIoTotals, MockPcStatsSampler};
    use crate::infrastructure::storage::identity::IdentityStore;

    // ── TelemetryMode ─────────────────────────────────────────────────────────

    #[test]
    fn test_mode_gating() {
        assert!(TelemetryMode::Both.sends_rate());
        assert!(TelemetryMode::Both.sends_solenoid());
        assert!(TelemetryMode::RateOnly.sends_rate());
        assert!(!TelemetryMode::RateOnly.sends_solenoid());
        assert!(!TelemetryMode::SolenoidOnly.sends_rate());
        assert!(TelemetryMode::SolenoidOnly.sends_solenoid());
    }

    #[test]
    fn test_default_mode_is_both() {
        assert_eq!(TelemetryMode::default(), TelemetryMode::Both);
    }

    // ── pc_status_frames ──────────────────────────────────────────────────────

    fn sample(cpu: i32, ram: i32, disk: i32, temp: Option<i32>) -> PcStatsSample {
        PcStatsSample {
            cpu_percent: cpu,
            ram_percent: ram,
            disk_percent: disk,
            cpu_temp_c: temp,
        }
    }

    #[test]
    fn test_pc_status_frames_order_and_quantization() {
        let frames = pc_status_frames(&sample(30, 60, 80, None), 2.4, 1.9);
        assert_eq!(
            frames,
            vec![
                Frame::PcStat(PcStatKind::CpuPercent, 30),
                Frame::PcStat(PcStatKind::RamPercent, 60),
                Frame::PcStat(PcStatKind::DiskPercent, 80),
                Frame::PcStat(PcStatKind::DiskReadMb, 2),
                Frame::PcStat(PcStatKind::DiskWriteMb, 1),
                Frame::PcStat(PcStatKind::DiskReadDeciMb, 24),
                Frame::PcStat(PcStatKind::DiskWriteDeciMb, 19),
            ]
        );
    }

    #[test]
    fn test_pc_status_frames_include_temperature_when_available() {
        let frames = pc_status_frames(&sample(0, 0, 0, Some(67)), 0.0, 0.0);
        assert_eq!(frames.len(), 8);
        assert_eq!(frames[7], Frame::PcStat(PcStatKind::CpuTempC, 67));
    }

    #[test]
    fn test_pc_status_frames_clamp_temperature() {
        let frames = pc_status_frames(&sample(0, 0, 0, Some(150)), 0.0, 0.0);
        assert_eq!(frames[7], Frame::PcStat(PcStatKind::CpuTempC, 100));
        let frames = pc_status_frames(&sample(0, 0, 0, Some(-10)), 0.0, 0.0);
        assert_eq!(frames[7], Frame::PcStat(PcStatKind::CpuTempC, 0));
    }

    // ── ControlTick ───────────────────────────────────────────────────────────

    struct Harness {
        factory: Arc<MockLinkFactory>,
        tick: ControlTick,
        supervisor: Arc<LinkSupervisor>,
        _events: tokio::sync::mpsc::Receiver<LinkEvent>,
        connect_rx: std::sync::mpsc::Receiver<ConnectRequest>,
        rate: Arc<RateCounter>,
        _tmp: std::path::PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self._tmp).ok();
        }
    }

    fn fast_timings() -> ProbeTimings {
        ProbeTimings {
            active_settle: Duration::ZERO,
            passive_settle: Duration::ZERO,
            open_settle: Duration::ZERO,
            reply_deadline: Duration::from_millis(20),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn harness(start: Instant, mode: TelemetryMode) -> Harness {
        harness_with(start, mode, None)
    }

    fn harness_with(
        start: Instant,
        mode: TelemetryMode,
        sampler: Option<Box<dyn PcStatsSampler>>,
    ) -> Harness {
        let tmp = std::env::temp_dir().join(format!(
            "bridge_tick_{}_{:?}",
            std::process::id(),
            std::thread::current().id(),
        ));
        std::fs::create_dir_all(&tmp).unwrap();

        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        let dyn_factory = Arc::clone(&factory) as Arc<dyn LinkFactory>;
        let session = Arc::new(LinkSession::with_timings(
            Arc::clone(&dyn_factory),
            fast_timings(),
        ));
        let engine = ProbeEngine::with_timings(dyn_factory, fast_timings());
        let store = IdentityStore::new(tmp.join("identity.toml"));
        let (supervisor, events) =
            LinkSupervisor::new(Arc::clone(&session), engine, store, SupervisorConfig::default());
        let rate = Arc::new(RateCounter::new(start));
        let (connect_tx, connect_rx) = std::sync::mpsc::channel();

        let mut tick = ControlTick::new(
            Arc::clone(&session),
            Arc::clone(&supervisor),
            Arc::clone(&rate),
            mode,
            connect_tx,
        );
        if let Some(sampler) = sampler {
            tick = tick.with_sampler(sampler);
        }

        Harness {
            factory,
            tick,
            supervisor,
            _events: events,
            connect_rx,
            rate,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_tick_emits_rate_on_emission_cadence_only() {
        let start = Instant::now();
        let mut h = harness(start, TelemetryMode::Both);
        h.supervisor.connect(ConnectOrigin::Manual);
        let port = h.factory.port("COM3");

        h.rate.record_event();
        h.tick.on_tick_at(start + Duration::from_millis(50));
        assert!(port.written().is_empty(), "50 ms: nothing due yet");

        h.tick.on_tick_at(start + Duration::from_millis(500));
        assert_eq!(
            port.written(),
            vec![0x01, 0x00, 0x00],
            "500 ms: rate emitted (window not rolled yet, so 0)"
        );

        h.tick.on_tick_at(start + Duration::from_millis(1000));
        assert_eq!(
            &port.written()[3..],
            &[0x01, 0x3C, 0x00],
            "1 s: window rolled, 1 event * 60 = 60"
        );
    }

    #[test]
    fn test_tick_respects_solenoid_only_mode() {
        let start = Instant::now();
        let mut h = harness(start, TelemetryMode::SolenoidOnly);
        h.supervisor.connect(ConnectOrigin::Manual);
        let port = h.factory.port("COM3");

        h.tick.on_tick_at(start + Duration::from_millis(600));
        assert!(
            port.written().is_empty(),
            "solenoid-only mode must not emit rate frames"
        );
    }

    #[test]
    fn test_tick_emits_pc_stats_once_per_interval() {
        let start = Instant::now();
        let sampler = MockPcStatsSampler::new(PcStatsSample {
            cpu_percent: 10,
            ram_percent: 20,
            disk_percent: 30,
            cpu_temp_c: None,
        });
        sampler.set_totals(DiskIoTotals::default());

        let mut h = harness_with(start, TelemetryMode::Both, Some(Box::new(sampler)));
        h.supervisor.connect(ConnectOrigin::Manual);
        let port = h.factory.port("COM3");

        h.tick.on_tick_at(start + Duration::from_millis(50));
        let first = port.written().len();
        assert_eq!(first, 14, "7 stat frames of 2 bytes each on first tick");

        h.tick.on_tick_at(start + Duration::from_millis(100));
        assert_eq!(port.written().len(), first, "not due again at 100 ms");

        h.tick.on_tick_at(start + Duration::from_millis(1100));
        assert!(port.written().len() > first, "due again after 1 s");
    }

    #[test]
    fn test_tick_requests_reconnect_when_due() {
        let start = Instant::now();
        let mut h = harness(start, TelemetryMode::Both);
        let port = h.factory.port("COM3");

        // Connect, then lose the link.
        h.supervisor.connect(ConnectOrigin::Manual);
        port.set_write_error(Some(std::io::ErrorKind::BrokenPipe));

        // First tick observes the loss; the throttle window just started at
        // connect time, so no request yet.
        h.tick.on_tick_at(start);
        assert_eq!(h.supervisor.state(), ConnectionState::Disconnected);

        // Past the reconnect interval the tick queues one request.
        h.tick
            .on_tick_at(start + crate::application::supervisor::RECONNECT_INTERVAL + Duration::from_millis(100));
        let request = h.connect_rx.try_recv().expect("a reconnect request");
        assert!(matches!(
            request,
            ConnectRequest::AutoDetect(ConnectOrigin::Auto)
        ));
        assert!(
            h.connect_rx.try_recv().is_err(),
            "exactly one request per due window"
        );
    }

    #[test]
    fn test_tick_without_sampler_emits_no_stats() {
        let start = Instant::now();
        let mut h = harness(start, TelemetryMode::Both);
        h.supervisor.connect(ConnectOrigin::Manual);
        let port = h.factory.port("COM3");

        h.tick.on_tick_at(start + Duration::from_millis(50));
        assert!(port.written().is_empty());
    }
}
