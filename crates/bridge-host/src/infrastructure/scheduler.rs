//! Fixed-cadence scheduler tick.
//!
//! The control tick drives the rate counter, the reconnect-eligibility check
//! and telemetry emission.  In a GUI deployment the host toolkit's timer
//! plays this role; here it is an explicit abstraction — a dedicated thread
//! invoking a callback at a fixed cadence — so the rest of the system never
//! depends on any UI event loop.
//!
//! The loop sleeps until the next deadline rather than sleeping the period,
//! so a slow callback does not accumulate drift.  The callback must never
//! block: all blocking I/O belongs on the discovery worker.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// A dedicated thread that invokes a callback at a fixed cadence until the
/// shared running flag is cleared.
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Ticker {
    /// Spawns the tick thread.
    ///
    /// `running` is shared: clearing it from anywhere stops the loop at the
    /// next deadline.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` when the OS refuses to spawn the thread.
    pub fn spawn(
        name: &str,
        period: Duration,
        running: Arc<AtomicBool>,
        mut callback: impl FnMut() + Send + 'static,
    ) -> io::Result<Self> {
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut deadline = Instant::now() + period;
            while flag.load(Ordering::Relaxed) {
                callback();
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                deadline += period;
            }
            debug!("ticker stopped");
        })?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    /// Clears the running flag and joins the tick thread.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
