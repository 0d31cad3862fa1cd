//! Typing-rate counter with a fixed 1-second accumulation window.
//!
//! Key-down events are accumulated for one second, then converted to a
//! per-minute rate (`window_count * 60`).  Independently of the window, an
//! emission flag fires every 500 ms so the rate is pushed to the device (and
//! any display) twice as often as it is recomputed.  The two cadences are
//! deliberately decoupled: emission smoothness does not depend on the window
//! length.
//!
//! # Thread safety
//!
//! Two independent callers touch this type: the key-event worker calls
//! [`RateCounter::record_event`] on every accepted key-down, and the control
//! tick calls [`RateCounter::advance`].  `record_event` must never block the
//! event source, so the window count is an `AtomicU32`; the window
//! timestamps are only read and written by the tick thread and sit behind a
//! mutex that is uncontended in practice.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Length of the accumulation window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Minimum interval between two emissions.
pub const EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Events-per-window to events-per-minute conversion factor.
const PER_MINUTE: u32 = 60;

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    last_emit: Instant,
    current_rate: u32,
}

/// Converts discrete key-down events into a per-minute typing rate.
#[derive(Debug)]
pub struct RateCounter {
    window_count: AtomicU32,
    state: Mutex<WindowState>,
}

impl RateCounter {
    /// Creates a counter whose window and emission clocks start at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_count: AtomicU32::new(0),
            state: Mutex::new(WindowState {
                window_start: now,
                last_emit: now,
                current_rate: 0,
            }),
        }
    }

    /// Records one accepted key-down event.
    ///
    /// Lock-free and callable from any thread.
    pub fn record_event(&self) {
        self.window_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Advances the counter to `now` and returns `(current_rate, should_emit)`.
    ///
    /// Called on every scheduler tick.  When at least [`WINDOW`] has elapsed
    /// since the window start, the rate is recomputed as
    /// `window_count * 60` and the window restarts at `now`; when at least
    /// [`EMIT_INTERVAL`] has elapsed since the last emission, the emission
    /// flag is reported and the emission clock restarts at `now`.  Both the
    /// latest rate and the flag are returned on every call, whether or not
    /// either threshold fired.
    pub fn advance(&self, now: Instant) -> (u32, bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now.duration_since(state.window_start) >= WINDOW {
            let count = self.window_count.swap(0, Ordering::Relaxed);
            state.current_rate = count * PER_MINUTE;
            state.window_start = now;
        }

        let should_emit = if now.duration_since(state.last_emit) >= EMIT_INTERVAL {
            state.last_emit = now;
            true
        } else {
            false
        };

        (state.current_rate, should_emit)
    }

    /// Resets both clocks and the accumulated count, as after a reconnect.
    pub fn reset(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.window_count.store(0, Ordering::Relaxed);
        state.window_start = now;
        state.last_emit = now;
        state.current_rate = 0;
    }

    /// Returns the most recently computed rate without advancing the clocks.
    pub fn current_rate(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_rate
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
