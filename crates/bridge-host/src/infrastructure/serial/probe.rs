//! Probe engine: handshake verification and best-effort device detection.
//!
//! OS transport labels cannot be fully trusted: a desktop commonly exposes
//! several unrelated Bluetooth and USB serial endpoints, and opening the
//! wrong one must not capture the session.  The probe engine decides whether
//! a candidate endpoint is actually a Core2:
//!
//! - **USB** endpoints are never actively probed.  Opening a wrong USB-CDC
//!   port is cheap and harmless to detect downstream, so selection simply
//!   trusts the persisted identifier when present and falls back to the
//!   first enumerated USB endpoint.
//!
//! - **Bluetooth** endpoints are probed by opening the port, letting the
//!   RFCOMM link stabilise, clearing stale input, writing HELLO and — in the
//!   *active* variant — polling for the 6-byte DEVICE_ID reply within a
//!   bounded deadline.  The *passive* variant only checks that the HELLO
//!   write goes through; some Bluetooth stacks take seconds to fail a read,
//!   which makes negative confirmation too slow for a detection sweep.
//!
//! On success the opened handle is returned to the caller so the session can
//! adopt it; re-opening an RFCOMM channel right after a successful handshake
//! is exactly how the just-established link gets lost.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bridge_core::{encode, filter_by_kind, find_device_id_reply, Frame, SerialEndpoint, TransportKind};
use thiserror::Error;
use tracing::debug;

use super::{LinkError, LinkFactory, SerialLink};

/// Wall-clock bounds for probe operations.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTimings {
    /// Settle period after opening before the active-probe HELLO; a fresh
    /// RFCOMM channel drops bytes written immediately after open.
    pub active_settle: Duration,
    /// Settle period for the passive probe.
    pub passive_settle: Duration,
    /// Settle period before the HELLO that [`super::LinkSession::open`]
    /// performs on a fresh Bluetooth handle.
    pub open_settle: Duration,
    /// Deadline for observing the DEVICE_ID reply.
    pub reply_deadline: Duration,
    /// Pause between read polls while waiting for the reply.
    pub poll_interval: Duration,
}

impl Default for ProbeTimings {
    fn default() -> Self {
        Self {
            active_settle: Duration::from_millis(600),
            passive_settle: Duration::from_millis(400),
            open_settle: Duration::from_millis(500),
            reply_deadline: Duration::from_millis(150),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// How Bluetooth candidates are verified during auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Require a matching DEVICE_ID reply.
    Active,
    /// Accept any endpoint whose HELLO write succeeds.
    Passive,
}

/// Error type for a single endpoint probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("open failed: {0}")]
    Open(#[from] LinkError),

    #[error("handshake I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("no DEVICE_ID reply within the deadline")]
    NoReply,

    #[error("device type 0x{found:02X} is not a Core2")]
    WrongDeviceType { found: u8 },
}

/// Outcome of an auto-detection sweep.
pub enum Detection {
    /// A usable endpoint was selected.  `handle` is `Some` when a probe
    /// already opened (and handshook) the port; the session must adopt it
    /// rather than re-open.
    Found {
        endpoint: SerialEndpoint,
        handle: Option<Box<dyn SerialLink>>,
    },
    /// No endpoint of the requested kind is currently enumerated.
    NoCandidates,
    /// Candidates existed but every probe failed.
    AllRejected { tried: usize },
}

/// Verifies candidate endpoints and selects the one to connect to.
pub struct ProbeEngine {
    factory: Arc<dyn LinkFactory>,
    timings: ProbeTimings,
}

impl ProbeEngine {
    pub fn new(factory: Arc<dyn LinkFactory>) -> Self {
        Self::with_timings(factory, ProbeTimings::default())
    }

    pub fn with_timings(factory: Arc<dyn LinkFactory>, timings: ProbeTimings) -> Self {
        Self { factory, timings }
    }

    pub fn timings(&self) -> ProbeTimings {
        self.timings
    }

    /// Lists the currently visible endpoints (manual selection / refresh).
    pub fn endpoints(&self) -> Vec<SerialEndpoint> {
        self.factory.enumerate()
    }

    /// Active Bluetooth probe: HELLO out, DEVICE_ID back, device type checked.
    ///
    /// On success the handle is returned still open.
    ///
    /// # Errors
    ///
    /// [`ProbeError::NoReply`] when the deadline passes without a complete
    /// reply, [`ProbeError::WrongDeviceType`] when a reply arrives from
    /// something that is not a Core2.
    pub fn probe_active(&self, identifier: &str) -> Result<Box<dyn SerialLink>, ProbeError> {
        debug!(%identifier, "active probe");
        let mut link = self.factory.open(identifier, TransportKind::Bluetooth)?;

        thread::sleep(self.timings.active_settle);
        link.clear_input()?;
        link.write_all(&encode(&Frame::Hello))?;

        let deadline = Instant::now() + self.timings.reply_deadline;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 32];
        loop {
            let n = link.read_chunk(&mut chunk)?;
            buf.extend_from_slice(&chunk[..n]);

            if let Some(reply) = find_device_id_reply(&buf) {
                if reply.is_core2() {
                    debug!(%identifier, protocol = reply.protocol, "active probe succeeded");
                    return Ok(link);
                }
                return Err(ProbeError::WrongDeviceType {
                    found: reply.device_type,
                });
            }

            if Instant::now() >= deadline {
                return Err(ProbeError::NoReply);
            }
            thread::sleep(self.timings.poll_interval);
        }
    }

    /// Passive Bluetooth probe: open + settle + HELLO write, reply ignored.
    pub fn probe_passive(&self, identifier: &str) -> Result<Box<dyn SerialLink>, ProbeError> {
        debug!(%identifier, "passive probe");
        let mut link = self.factory.open(identifier, TransportKind::Bluetooth)?;

        thread::sleep(self.timings.passive_settle);
        link.write_all(&encode(&Frame::Hello))?;

        debug!(%identifier, "passive probe likely succeeded");
        Ok(link)
    }

    /// Selects an endpoint of `kind`, preferring the persisted identifier.
    ///
    /// USB selection never opens a port.  Bluetooth selection probes the
    /// preferred identifier first (at most once, even when the enumeration
    /// heuristic did not classify it as Bluetooth — a remembered success
    /// outranks the heuristic), then the remaining Bluetooth endpoints in
    /// enumeration order.
    pub fn auto_detect(
        &self,
        kind: TransportKind,
        preferred: Option<&str>,
        strategy: ProbeStrategy,
    ) -> Detection {
        let endpoints = self.factory.enumerate();

        match kind {
            TransportKind::Usb => {
                let usb = filter_by_kind(&endpoints, TransportKind::Usb);
                if let Some(preferred) = preferred {
                    if let Some(endpoint) = usb.iter().find(|e| e.identifier == preferred) {
                        debug!(identifier = %endpoint.identifier, "using preferred USB endpoint");
                        return Detection::Found {
                            endpoint: endpoint.clone(),
                            handle: None,
                        };
                    }
                }
                match usb.into_iter().next() {
                    Some(endpoint) => {
                        debug!(identifier = %endpoint.identifier, "using first USB endpoint");
                        Detection::Found {
                            endpoint,
                            handle: None,
                        }
                    }
                    None => Detection::NoCandidates,
                }
            }
            TransportKind::Bluetooth => {
                let mut tried = 0;

                if let Some(preferred) = preferred {
                    if let Some(endpoint) =
                        endpoints.iter().find(|e| e.identifier == preferred)
                    {
                        tried += 1;
                        match self.probe(strategy, preferred) {
                            Ok(handle) => {
                                return Detection::Found {
                                    endpoint: endpoint.clone(),
                                    handle: Some(handle),
                                };
                            }
                            Err(e) => debug!(%preferred, "preferred endpoint rejected: {e}"),
                        }
                    }
                }

                for endpoint in filter_by_kind(&endpoints, TransportKind::Bluetooth) {
                    if Some(endpoint.identifier.as_str()) == preferred {
                        continue;
                    }
                    tried += 1;
                    match self.probe(strategy, &endpoint.identifier) {
                        Ok(handle) => {
                            return Detection::Found {
                                endpoint,
                                handle: Some(handle),
                            };
                        }
                        Err(e) => debug!(identifier = %endpoint.identifier, "rejected: {e}"),
                    }
                }

                if tried == 0 {
                    Detection::NoCandidates
                } else {
                    Detection::AllRejected { tried }
                }
            }
        }
    }

    fn probe(
        &self,
        strategy: ProbeStrategy,
        identifier: &str,
    ) -> Result<Box<dyn SerialLink>, ProbeError> {
        match strategy {
            ProbeStrategy::Active => self.probe_active(identifier),
            ProbeStrategy::Passive => self.probe_passive(identifier),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
