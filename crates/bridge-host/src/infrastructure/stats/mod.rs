//! PC resource sampling.
//!
//! The resource sampler is an external collaborator: it produces periodic
//! scalar readings, and the bridge only clamps and frames them.  This module
//! holds the trait seam, a scripted mock, and the one piece of real logic —
//! the disk I/O meter that turns cumulative byte counters into MB/s.

use std::sync::Mutex;
use std::time::Instant;

/// One snapshot of host resource usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcStatsSample {
    /// CPU utilisation, percent.
    pub cpu_percent: i32,
    /// RAM utilisation, percent.
    pub ram_percent: i32,
    /// Disk-space utilisation, percent.
    pub disk_percent: i32,
    /// CPU temperature in °C; `None` when no sensor is readable.
    pub cpu_temp_c: Option<i32>,
}

/// Cumulative disk I/O counters since boot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskIoTotals {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Produces resource snapshots.  Implemented outside this crate for real
/// hosts; tests use [`MockPcStatsSampler`].
pub trait PcStatsSampler: Send {
    fn sample(&mut self) -> PcStatsSample;
    fn disk_io_totals(&mut self) -> DiskIoTotals;
}

/// Converts cumulative disk I/O byte counters into MB/s over elapsed time.
///
/// The first call only records the baseline and reports `(0.0, 0.0)`.
#[derive(Debug, Default)]
pub struct DiskIoMeter {
    prev: Option<(DiskIoTotals, Instant)>,
}

impl DiskIoMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(read_mb_per_s, write_mb_per_s)` since the previous call.
    pub fn update(&mut self, now: Instant, totals: DiskIoTotals) -> (f64, f64) {
        let prev = self.prev.replace((totals, now));
        let Some((prev_totals, prev_at)) = prev else {
            return (0.0, 0.0);
        };

        let dt = now.duration_since(prev_at).as_secs_f64();
        if dt <= 0.0 {
            return (0.0, 0.0);
        }

        const MB: f64 = 1024.0 * 1024.0;
        let read = totals.read_bytes.saturating_sub(prev_totals.read_bytes) as f64 / MB / dt;
        let write = totals.write_bytes.saturating_sub(prev_totals.write_bytes) as f64 / MB / dt;
        (read, write)
    }
}

/// A scripted sampler for tests.
pub struct MockPcStatsSampler {
    sample: Mutex<PcStatsSample>,
    totals: Mutex<DiskIoTotals>,
}

impl MockPcStatsSampler {
    pub fn new(sample: PcStatsSample) -> Self {
        Self {
            sample: Mutex::new(sample),
            totals: Mutex::new(DiskIoTotals::default()),
        }
    }

    /// Replaces the snapshot returned by subsequent `sample` calls.
    pub fn set_sample(&self, sample: PcStatsSample) {
        *self.sample.lock().expect("lock poisoned") = sample;
    }

    /// Replaces the cumulative I/O counters.
    pub fn set_totals(&self, totals: DiskIoTotals) {
        *self.totals.lock().expect("lock poisoned") = totals;
    }
}

impl PcStatsSampler for MockPcStatsSampler {
    fn sample(&mut self) -> PcStatsSample {
        *self.sample.lock().expect("lock poisoned")
    }

    fn disk_io_totals(&mut self) -> DiskIoTotals {
        *self.totals.lock().expect("lock poisoned")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
