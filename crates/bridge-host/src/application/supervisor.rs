//! LinkSupervisor: the connection lifecycle state machine.
//!
//! States and transitions:
//!
//! ```text
//! Disconnected ──connect / reconnect check──► Probing
//! Probing ──detection + open succeeded──────► Connected
//! Probing ──no candidate / probe failed─────► Disconnected
//! Connected ──user disconnect / link lost───► Disconnected
//! ```
//!
//! The reconnect check is throttled to one attempt per fixed interval and is
//! armed only after a link has succeeded at least once — no unsolicited
//! Bluetooth probing before the user's first connect, to avoid noisy radio
//! scanning.  A check while already `Probing` or `Connected` is a no-op.
//!
//! Detection and open run on the discovery worker thread (they block on
//! serial I/O); the tick thread only calls [`LinkSupervisor::poll`].
//! Failures never propagate to the tick: they become a state transition plus
//! a [`LinkEvent`] on the event queue, with manual attempts reported
//! distinctly from automatic ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bridge_core::{extract_bt_mac, Frame, SerialEndpoint, TransportKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::serial::{Detection, LinkSession, ProbeEngine, ProbeStrategy};
use crate::infrastructure::storage::identity::{BluetoothIdentity, IdentityStore};

/// Fixed interval between automatic reconnect attempts.  No backoff.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Current state of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; reconnect checks may fire once armed.
    Disconnected,
    /// A detection/handshake attempt is in flight on the discovery worker.
    Probing,
    /// The session holds an open, verified handle.
    Connected,
}

/// Who initiated a connect attempt.  Manual failures are surfaced as an
/// explicit failure notice; automatic failures only update passive status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOrigin {
    Manual,
    Auto,
}

/// Why a connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// No endpoint of the requested kind is currently enumerated.
    NoCandidates,
    /// Candidates existed but every probe was rejected.
    AllProbesRejected { tried: usize },
    /// The selected endpoint failed to open or greet.
    OpenFailed,
}

/// Events emitted by the supervisor to the presentation/control layer.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    StateChanged(ConnectionState),
    Connected {
        identifier: String,
        kind: TransportKind,
    },
    ConnectFailed {
        origin: ConnectOrigin,
        reason: ConnectFailure,
    },
    /// A periodic check observed the open handle gone.
    LinkLost,
    /// A device-side layer notification was forwarded to the wire.
    LayerForwarded(u8),
}

/// A request for the discovery worker.
#[derive(Debug, Clone)]
pub enum ConnectRequest {
    /// Run auto-detection for the configured transport kind.
    AutoDetect(ConnectOrigin),
    /// Connect to an explicitly chosen endpoint.
    Endpoint {
        identifier: String,
        origin: ConnectOrigin,
    },
}

/// Construction-time knobs for the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub kind: TransportKind,
    pub strategy: ProbeStrategy,
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Usb,
            strategy: ProbeStrategy::Passive,
            auto_reconnect: true,
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    last_attempt: Option<Instant>,
    has_connected_once: bool,
}

/// The connection state machine.
pub struct LinkSupervisor {
    session: Arc<LinkSession>,
    engine: ProbeEngine,
    store: IdentityStore,
    kind: Mutex<TransportKind>,
    strategy: ProbeStrategy,
    auto_reconnect: AtomicBool,
    reconnect_interval: Duration,
    inner: Mutex<Inner>,
    event_tx: mpsc::Sender<LinkEvent>,
}

impl LinkSupervisor {
    /// Creates the supervisor and returns it with the event receiver.
    pub fn new(
        session: Arc<LinkSession>,
        engine: ProbeEngine,
        store: IdentityStore,
        config: SupervisorConfig,
    ) -> (Arc<Self>, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let supervisor = Arc::new(Self {
            session,
            engine,
            store,
            kind: Mutex::new(config.kind),
            strategy: config.strategy,
            auto_reconnect: AtomicBool::new(config.auto_reconnect),
            reconnect_interval: config.reconnect_interval,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                last_attempt: None,
                has_connected_once: false,
            }),
            event_tx: tx,
        });
        (supervisor, rx)
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LinkEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("link event dropped (queue full or receiver gone)");
        }
    }

    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.state != next {
            inner.state = next;
            self.emit(LinkEvent::StateChanged(next));
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_inner().state
    }

    pub fn has_connected_once(&self) -> bool {
        self.lock_inner().has_connected_once
    }

    pub fn transport_kind(&self) -> TransportKind {
        *self.kind.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switches the transport kind used by subsequent detection attempts.
    pub fn set_transport_kind(&self, kind: TransportKind) {
        *self.kind.lock().unwrap_or_else(|e| e.into_inner()) = kind;
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::Relaxed);
    }

    /// Runs one auto-detection attempt for the configured transport kind.
    ///
    /// Blocking; must be called from the discovery worker, never the tick.
    /// A no-op unless currently `Disconnected`.
    pub fn connect(&self, origin: ConnectOrigin) {
        let kind = self.transport_kind();
        if !self.begin_probing() {
            return;
        }

        info!(%kind, ?origin, "searching for device");
        let preferred = self.store.last_port(kind);
        match self.engine.auto_detect(kind, preferred.as_deref(), self.strategy) {
            Detection::NoCandidates => self.fail(origin, ConnectFailure::NoCandidates),
            Detection::AllRejected { tried } => {
                self.fail(origin, ConnectFailure::AllProbesRejected { tried })
            }
            Detection::Found { endpoint, handle } => {
                let opened = match handle {
                    // The probe already holds a greeted handle; re-opening an
                    // RFCOMM channel here would lose the link.
                    Some(handle) => {
                        self.session.adopt(handle, kind);
                        Ok(())
                    }
                    None => self.session.open(&endpoint.identifier, kind),
                };
                match opened {
                    Ok(()) if self.session.is_open() => self.succeed(kind, &endpoint),
                    Ok(()) => self.fail(origin, ConnectFailure::OpenFailed),
                    Err(e) => {
                        debug!(identifier = %endpoint.identifier, "open failed: {e}");
                        self.fail(origin, ConnectFailure::OpenFailed);
                    }
                }
            }
        }
    }

    /// Connects to an explicitly chosen endpoint (manual port selection).
    ///
    /// The transport kind is taken from the endpoint's classification.  An
    /// identifier that is no longer enumerated fails like any other
    /// unavailable candidate.
    pub fn connect_to(&self, identifier: &str, origin: ConnectOrigin) {
        if !self.begin_probing() {
            return;
        }

        info!(%identifier, ?origin, "connecting to selected endpoint");
        let endpoint = self
            .engine
            .endpoints()
            .into_iter()
            .find(|e| e.identifier == identifier);
        match endpoint {
            None => {
                debug!(%identifier, "selected endpoint is no longer enumerated");
                self.fail(origin, ConnectFailure::NoCandidates);
            }
            Some(endpoint) => {
                let kind = endpoint.transport_kind;
                match self.session.open(&endpoint.identifier, kind) {
                    Ok(()) if self.session.is_open() => self.succeed(kind, &endpoint),
                    Ok(()) => self.fail(origin, ConnectFailure::OpenFailed),
                    Err(e) => {
                        debug!(%identifier, "open failed: {e}");
                        self.fail(origin, ConnectFailure::OpenFailed);
                    }
                }
            }
        }
    }

    /// Explicit user disconnect.
    pub fn disconnect(&self) {
        self.session.close();
        let mut inner = self.lock_inner();
        self.transition(&mut inner, ConnectionState::Disconnected);
        info!("disconnected");
    }

    /// Periodic duties for the control tick: observe link loss and decide
    /// reconnect eligibility.
    ///
    /// Returns `true` when an automatic reconnect attempt should be queued;
    /// the attempt itself must run on the discovery worker.
    pub fn poll(&self, now: Instant) -> bool {
        if self.state() == ConnectionState::Connected && !self.session.is_open() {
            let mut inner = self.lock_inner();
            // Recheck under the lock; a concurrent disconnect may have won.
            if inner.state == ConnectionState::Connected {
                self.transition(&mut inner, ConnectionState::Disconnected);
                drop(inner);
                warn!("device link lost");
                self.emit(LinkEvent::LinkLost);
            }
        }

        self.reconnect_due(now)
    }

    /// Returns `true` when a reconnect attempt is due, claiming the slot.
    ///
    /// A `true` return updates the last-attempt timestamp, so two calls less
    /// than the reconnect interval apart can never both trigger.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        if !self.auto_reconnect.load(Ordering::Relaxed) {
            return false;
        }
        let mut inner = self.lock_inner();
        if inner.state != ConnectionState::Disconnected || !inner.has_connected_once {
            return false;
        }
        let due = match inner.last_attempt {
            Some(at) => now.duration_since(at) >= self.reconnect_interval,
            None => true,
        };
        if due {
            inner.last_attempt = Some(now);
        }
        due
    }

    /// Forwards a device-side layer notification as a `Layer` frame.
    pub fn forward_layer(&self, layer: u8) {
        debug!(layer, "layer notification");
        self.session.send(&Frame::Layer(layer as u16));
        self.emit(LinkEvent::LayerForwarded(layer));
    }

    /// Claims the probing slot.  Returns `false` when an attempt is already
    /// in flight or a link is already up.
    fn begin_probing(&self) -> bool {
        let mut inner = self.lock_inner();
        if inner.state != ConnectionState::Disconnected {
            debug!(state = ?inner.state, "connect ignored; not disconnected");
            return false;
        }
        inner.last_attempt = Some(Instant::now());
        self.transition(&mut inner, ConnectionState::Probing);
        true
    }

    fn succeed(&self, kind: TransportKind, endpoint: &SerialEndpoint) {
        let bluetooth = (kind == TransportKind::Bluetooth).then(|| BluetoothIdentity {
            mac: extract_bt_mac(&endpoint.hardware_id),
            name: endpoint.description.clone(),
        });
        if let Err(e) = self
            .store
            .record_success(kind, &endpoint.identifier, bluetooth)
        {
            // A failed write only loses the reconnect hint.
            warn!("failed to persist link identity: {e}");
        }

        {
            let mut inner = self.lock_inner();
            inner.has_connected_once = true;
            self.transition(&mut inner, ConnectionState::Connected);
        }
        info!(identifier = %endpoint.identifier, %kind, "device connected");
        self.emit(LinkEvent::Connected {
            identifier: endpoint.identifier.clone(),
            kind,
        });
    }

    fn fail(&self, origin: ConnectOrigin, reason: ConnectFailure) {
        {
            let mut inner = self.lock_inner();
            self.transition(&mut inner, ConnectionState::Disconnected);
        }
        match origin {
            ConnectOrigin::Manual => warn!(?reason, "connect failed"),
            ConnectOrigin::Auto => debug!(?reason, "automatic connect failed"),
        }
        self.emit(LinkEvent::ConnectFailed { origin, reason });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
