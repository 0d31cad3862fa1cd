//! Worker pumps: the dedicated threads that move events between the
//! collaborators and the device link.
//!
//! - the **discovery worker** owns all blocking detection and open calls; it
//!   is the only thread allowed to drive [`LinkSupervisor::connect`];
//! - the **key pump** consumes raw keyboard events, suppresses auto-repeat,
//!   feeds the rate counter and fires solenoid frames;
//! - the **layer pump** forwards device-side layer notifications.
//!
//! All pumps stop cooperatively: they re-check the shared running flag at
//! least twice a second and exit when their source channel closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bridge_core::RateCounter;
use tracing::debug;

use crate::application::keystrokes::KeystrokeProcessor;
use crate::application::supervisor::{ConnectRequest, LinkSupervisor};
use crate::application::telemetry::TelemetryMode;
use crate::infrastructure::input::{CaptureError, KeySource, LayerSource};
use crate::infrastructure::serial::LinkSession;

/// How long a pump blocks on its channel before re-checking the running flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Spawns the discovery worker that serializes all connect attempts.
pub fn spawn_probe_worker(
    supervisor: Arc<LinkSupervisor>,
    requests: Receiver<ConnectRequest>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("bridge-probe".to_string())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match requests.recv_timeout(POLL_TIMEOUT) {
                    Ok(ConnectRequest::AutoDetect(origin)) => supervisor.connect(origin),
                    Ok(ConnectRequest::Endpoint { identifier, origin }) => {
                        supervisor.connect_to(&identifier, origin)
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("probe worker stopped");
        })
}

/// Starts `source` and spawns the key pump.
///
/// Accepted presses are counted into `rate` unconditionally (the rate is
/// displayed even when rate frames are muted); solenoid frames honour the
/// telemetry mode.
///
/// # Errors
///
/// Returns [`CaptureError`] when the key source fails to start.
pub fn spawn_key_pump(
    source: &dyn KeySource,
    session: Arc<LinkSession>,
    rate: Arc<RateCounter>,
    mode: TelemetryMode,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, CaptureError> {
    let events = source.start()?;
    let handle = thread::Builder::new()
        .name("bridge-keys".to_string())
        .spawn(move || {
            let mut processor = KeystrokeProcessor::new();
            while running.load(Ordering::Relaxed) {
                match events.recv_timeout(POLL_TIMEOUT) {
                    Ok(event) => {
                        if let Some(pulse) = processor.on_event(&event) {
                            rate.record_event();
                            if mode.sends_solenoid() {
                                session.send(&pulse.frame());
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("key pump stopped");
        })
        .expect("failed to spawn key pump thread");
    Ok(handle)
}

/// Starts `source` and spawns the layer pump.
///
/// # Errors
///
/// Returns [`CaptureError`] when the layer source fails to start.
pub fn spawn_layer_pump(
    source: &dyn LayerSource,
    supervisor: Arc<LinkSupervisor>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, CaptureError> {
    let layers = source.start()?;
    let handle = thread::Builder::new()
        .name("bridge-layers".to_string())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match layers.recv_timeout(POLL_TIMEOUT) {
                    Ok(layer) => supervisor.forward_layer(layer),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("layer pump stopped");
        })
        .expect("failed to spawn layer pump thread");
    Ok(handle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
