//! The single live transport session.
//!
//! At most one serial handle may be open system-wide.  The handle is shared
//! between the control tick (telemetry writes, liveness checks), the
//! discovery worker (open/adopt) and user commands (disconnect), so every
//! operation here takes the one session mutex for its whole check-and-act
//! sequence — "check open, then write" must be atomic with respect to a
//! concurrent close or failure-driven handle drop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use bridge_core::{encode, Frame, TransportKind};
use tracing::{debug, warn};

use super::{is_timeout_error, LinkError, LinkFactory, ProbeTimings, SerialLink};

struct ActiveLink {
    link: Box<dyn SerialLink>,
    kind: TransportKind,
}

/// Owner of zero or one open serial handle.
pub struct LinkSession {
    factory: Arc<dyn LinkFactory>,
    timings: ProbeTimings,
    inner: Mutex<Option<ActiveLink>>,
}

impl LinkSession {
    pub fn new(factory: Arc<dyn LinkFactory>) -> Self {
        Self::with_timings(factory, ProbeTimings::default())
    }

    pub fn with_timings(factory: Arc<dyn LinkFactory>, timings: ProbeTimings) -> Self {
        Self {
            factory,
            timings,
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens `identifier`, closing any existing handle first.
    ///
    /// Bluetooth handles get the settle / clear-input / HELLO sequence
    /// before the call returns; USB handles are usable immediately.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] when the open or the Bluetooth greeting fails;
    /// the session is left closed in that case.
    pub fn open(&self, identifier: &str, kind: TransportKind) -> Result<(), LinkError> {
        let mut guard = self.lock();
        guard.take(); // close any existing handle first

        let mut link = self.factory.open(identifier, kind)?;

        if kind == TransportKind::Bluetooth {
            // RFCOMM needs a moment after open before it accepts writes.
            thread::sleep(self.timings.open_settle);
            link.clear_input()?;
            link.write_all(&encode(&Frame::Hello))?;
        }

        debug!(%identifier, %kind, "session opened");
        *guard = Some(ActiveLink { link, kind });
        Ok(())
    }

    /// Takes ownership of a handle the probe engine already opened and
    /// handshook, closing any existing handle first.
    pub fn adopt(&self, link: Box<dyn SerialLink>, kind: TransportKind) {
        let mut guard = self.lock();
        guard.take();
        debug!(%kind, "session adopted probed handle");
        *guard = Some(ActiveLink { link, kind });
    }

    /// Releases the handle if present.  Safe to call at any time.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            debug!("session closed");
        }
    }

    /// Reports whether a handle is open.
    ///
    /// Bluetooth reflects handle presence.  USB additionally performs a
    /// zero-length write, because a surprise-removed USB-CDC device is not
    /// reliably reported by the OS until something touches the handle; any
    /// error drops the handle as a side effect.  This is an approximation —
    /// some platforms accept a zero-length write on a dead handle — and a
    /// false positive is corrected by the next real write.
    pub fn is_open(&self) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            None => false,
            Some(active) => match active.kind {
                TransportKind::Bluetooth => true,
                TransportKind::Usb => match active.link.write_all(&[]) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("USB liveness check failed, dropping handle: {e}");
                        *guard = None;
                        false
                    }
                },
            },
        }
    }

    /// Transport kind of the open handle, if any.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.lock().as_ref().map(|active| active.kind)
    }

    /// Writes raw frame bytes; a no-op when the session is closed.
    ///
    /// A write timeout is swallowed (transient link-speed hiccup).  Any
    /// other I/O failure drops the handle so the next `is_open` check
    /// observes the loss.
    pub fn write(&self, data: &[u8]) {
        let mut guard = self.lock();
        let Some(active) = guard.as_mut() else {
            return;
        };
        match active.link.write_all(data) {
            Ok(()) => {}
            Err(e) if is_timeout_error(&e) => {
                debug!("write timeout ignored: {e}");
            }
            Err(e) => {
                warn!("write failed, dropping handle: {e}");
                *guard = None;
            }
        }
    }

    /// Encodes and writes one frame.
    pub fn send(&self, frame: &Frame) {
        self.write(&encode(frame));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial::mock::MockLinkFactory;
    use std::io;
    use std::time::Duration;

    fn fast_timings() -> ProbeTimings {
        ProbeTimings {
            active_settle: Duration::ZERO,
            passive_settle: Duration::ZERO,
            open_settle: Duration::ZERO,
            reply_deadline: Duration::from_millis(20),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn session_with(factory: &Arc<MockLinkFactory>) -> LinkSession {
        LinkSession::with_timings(Arc::clone(factory) as Arc<dyn LinkFactory>, fast_timings())
    }

    #[test]
    fn test_open_usb_does_not_send_hello() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_usb("COM3");
        let session = session_with(&factory);

        session.open("COM3", TransportKind::Usb).unwrap();

        assert!(session.is_open());
        assert_eq!(session.transport_kind(), Some(TransportKind::Usb));
        assert!(port.written().is_empty(), "USB open sends nothing");
    }

    #[test]
    fn test_open_bluetooth_sends_hello_after_clear() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_bluetooth("COM5");
        port.push_read_data(&[0xDE, 0xAD]); // stale bytes to be cleared

        let session = session_with(&factory);
        session.open("COM5", TransportKind::Bluetooth).unwrap();

        assert!(session.is_open());
        assert_eq!(port.written(), vec![0xF0, 0x00]);
    }

    #[test]
    fn test_open_closes_previous_handle_first() {
        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        factory.add_usb("COM7");
        let session = session_with(&factory);

        session.open("COM3", TransportKind::Usb).unwrap();
        session.open("COM7", TransportKind::Usb).unwrap();

        assert_eq!(factory.live_handles(), 1);
        assert_eq!(
            factory.max_live_handles(),
            1,
            "old handle must be closed before the new one opens"
        );
    }

    #[test]
    fn test_open_failure_leaves_session_closed() {
        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        factory.add_bluetooth("COM5").set_open_fails(true);
        let session = session_with(&factory);

        session.open("COM3", TransportKind::Usb).unwrap();
        let result = session.open("COM5", TransportKind::Bluetooth);

        assert!(result.is_err());
        assert!(
            !session.is_open(),
            "a failed re-open must not leave the old handle active"
        );
    }

    #[test]
    fn test_adopt_replaces_existing_handle() {
        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        factory.add_bluetooth("COM5");
        let session = session_with(&factory);

        session.open("COM3", TransportKind::Usb).unwrap();
        let probed = factory.open("COM5", TransportKind::Bluetooth).unwrap();
        session.adopt(probed, TransportKind::Bluetooth);

        assert_eq!(session.transport_kind(), Some(TransportKind::Bluetooth));
        assert_eq!(factory.live_handles(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        let session = session_with(&factory);

        session.close(); // nothing open: still fine
        session.open("COM3", TransportKind::Usb).unwrap();
        session.close();
        session.close();

        assert!(!session.is_open());
        assert_eq!(factory.live_handles(), 0);
    }

    #[test]
    fn test_write_is_noop_when_closed() {
        let factory = Arc::new(MockLinkFactory::new());
        factory.add_usb("COM3");
        let session = session_with(&factory);

        session.send(&Frame::Rate(100)); // must not panic
        assert!(!session.is_open());
    }

    #[test]
    fn test_write_timeout_is_swallowed() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_bluetooth("COM5");
        let session = session_with(&factory);
        session.open("COM5", TransportKind::Bluetooth).unwrap();

        port.set_write_error(Some(io::ErrorKind::TimedOut));
        session.send(&Frame::Rate(100));

        assert!(session.is_open(), "a write timeout must not drop the link");
    }

    #[test]
    fn test_write_failure_drops_handle() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_bluetooth("COM5");
        let session = session_with(&factory);
        session.open("COM5", TransportKind::Bluetooth).unwrap();

        port.set_write_error(Some(io::ErrorKind::BrokenPipe));
        session.send(&Frame::Rate(100));

        assert!(!session.is_open(), "a fatal write error must drop the link");
        assert_eq!(factory.live_handles(), 0);
    }

    #[test]
    fn test_usb_liveness_check_drops_dead_handle() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_usb("COM3");
        let session = session_with(&factory);
        session.open("COM3", TransportKind::Usb).unwrap();
        assert!(session.is_open());

        // Device yanked: even the zero-length probe write now fails.
        port.set_write_error(Some(io::ErrorKind::BrokenPipe));

        assert!(!session.is_open());
        assert_eq!(session.transport_kind(), None);
    }

    #[test]
    fn test_bluetooth_is_open_reflects_handle_presence() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_bluetooth("COM5");
        let session = session_with(&factory);
        session.open("COM5", TransportKind::Bluetooth).unwrap();

        // Bluetooth liveness is handle presence only; a scripted write error
        // does not affect is_open until a real write happens.
        port.set_write_error(Some(io::ErrorKind::BrokenPipe));
        assert!(session.is_open());
    }

    #[test]
    fn test_frames_reach_the_wire_in_write_order() {
        let factory = Arc::new(MockLinkFactory::new());
        let port = factory.add_usb("COM3");
        let session = session_with(&factory);
        session.open("COM3", TransportKind::Usb).unwrap();

        session.send(&Frame::Rate(500));
        session.send(&Frame::Layer(3));
        session.send(&Frame::SolenoidStrong);

        assert_eq!(
            port.written(),
            vec![0x01, 0xF4, 0x01, 0x02, 0x03, 0x11],
            "frames are serialized back to back by the session lock"
        );
    }
}
