//! Scripted serial factory for unit and integration tests.
//!
//! Allows tests to stage a set of fake endpoints, script each port's probe
//! behaviour (handshake reply, open failure, write/read errors), and inspect
//! everything the code under test wrote — without touching real hardware.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bridge_core::protocol::frames::{HELLO_CMD, HELLO_MAGIC};
use bridge_core::{SerialEndpoint, TransportKind};

use super::{LinkError, LinkFactory, SerialLink};

/// Scripted state for one fake port, shared between the factory and every
/// handle opened on it.
#[derive(Debug, Default)]
pub struct MockPortState {
    open_fails: AtomicBool,
    open_calls: AtomicUsize,
    hello_reply: Mutex<Option<Vec<u8>>>,
    pending_read: Mutex<Vec<u8>>,
    write_error: Mutex<Option<io::ErrorKind>>,
    read_error: Mutex<Option<io::ErrorKind>>,
    written: Mutex<Vec<u8>>,
}

impl MockPortState {
    /// Makes every subsequent `open` of this port fail.
    pub fn set_open_fails(&self, fails: bool) {
        self.open_fails.store(fails, Ordering::SeqCst);
    }

    /// Stages the bytes the fake device sends back after receiving a HELLO.
    pub fn set_hello_reply(&self, reply: Vec<u8>) {
        *self.hello_reply.lock().unwrap() = Some(reply);
    }

    /// Makes every subsequent write on open handles fail with `kind`
    /// (`None` restores normal writes).
    pub fn set_write_error(&self, kind: Option<io::ErrorKind>) {
        *self.write_error.lock().unwrap() = kind;
    }

    /// Makes every subsequent read fail with `kind`.
    pub fn set_read_error(&self, kind: Option<io::ErrorKind>) {
        *self.read_error.lock().unwrap() = kind;
    }

    /// Queues inbound bytes as if the device had sent them unprompted.
    pub fn push_read_data(&self, data: &[u8]) {
        self.pending_read.lock().unwrap().extend_from_slice(data);
    }

    /// Returns every byte written to this port so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Returns how many times this port has been opened.
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

/// A handle onto a scripted port.
pub struct MockSerialLink {
    state: Arc<MockPortState>,
    live: Arc<AtomicUsize>,
}

impl SerialLink for MockSerialLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(kind) = *self.state.write_error.lock().unwrap() {
            return Err(io::Error::new(kind, "mock write failure"));
        }
        self.state
            .written
            .lock()
            .unwrap()
            .extend_from_slice(data);
        if data == [HELLO_MAGIC, HELLO_CMD] {
            if let Some(reply) = self.state.hello_reply.lock().unwrap().clone() {
                self.state
                    .pending_read
                    .lock()
                    .unwrap()
                    .extend_from_slice(&reply);
            }
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = *self.state.read_error.lock().unwrap() {
            return Err(io::Error::new(kind, "mock read failure"));
        }
        let mut pending = self.state.pending_read.lock().unwrap();
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.drain(..n);
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.state.pending_read.lock().unwrap().clear();
        Ok(())
    }
}

impl Drop for MockSerialLink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted [`LinkFactory`] holding a fixed endpoint list.
#[derive(Default)]
pub struct MockLinkFactory {
    endpoints: Mutex<Vec<SerialEndpoint>>,
    ports: Mutex<HashMap<String, Arc<MockPortState>>>,
    open_order: Mutex<Vec<String>>,
    total_opens: AtomicUsize,
    live_handles: Arc<AtomicUsize>,
    max_live_handles: AtomicUsize,
}

impl MockLinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an endpoint with explicit descriptor strings.
    pub fn add_endpoint(
        &self,
        identifier: &str,
        kind: TransportKind,
        description: &str,
        hardware_id: &str,
    ) -> Arc<MockPortState> {
        self.endpoints.lock().unwrap().push(SerialEndpoint {
            identifier: identifier.to_string(),
            transport_kind: kind,
            hardware_id: hardware_id.to_string(),
            description: description.to_string(),
        });
        let state = Arc::new(MockPortState::default());
        self.ports
            .lock()
            .unwrap()
            .insert(identifier.to_string(), Arc::clone(&state));
        state
    }

    /// Stages a typical USB-CDC adapter endpoint.
    pub fn add_usb(&self, identifier: &str) -> Arc<MockPortState> {
        self.add_endpoint(
            identifier,
            TransportKind::Usb,
            "Silicon Labs CP210x USB to UART Bridge",
            r"USB\VID_10C4&PID_EA60\0001",
        )
    }

    /// Stages a typical Windows Bluetooth RFCOMM endpoint whose hardware id
    /// carries the device MAC `08:00:5F:9B:34:FB`.
    pub fn add_bluetooth(&self, identifier: &str) -> Arc<MockPortState> {
        self.add_endpoint(
            identifier,
            TransportKind::Bluetooth,
            "Standard Serial over Bluetooth link",
            r"BTHENUM\{SPP}_VID&PID_08005F9B34FB",
        )
    }

    /// Returns the scripted state for `identifier`.
    ///
    /// Panics when the port was never staged.
    pub fn port(&self, identifier: &str) -> Arc<MockPortState> {
        Arc::clone(
            self.ports
                .lock()
                .unwrap()
                .get(identifier)
                .unwrap_or_else(|| panic!("port {identifier} was never staged")),
        )
    }

    /// Total number of `open` calls across all ports.
    pub fn total_open_calls(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }

    /// The identifiers passed to `open`, in call order.
    pub fn open_order(&self) -> Vec<String> {
        self.open_order.lock().unwrap().clone()
    }

    /// Number of handles currently alive.
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live handles observed.
    pub fn max_live_handles(&self) -> usize {
        self.max_live_handles.load(Ordering::SeqCst)
    }
}

impl LinkFactory for MockLinkFactory {
    fn enumerate(&self) -> Vec<SerialEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }

    fn open(&self, identifier: &str, _kind: TransportKind) -> Result<Box<dyn SerialLink>, LinkError> {
        let state = {
            let ports = self.ports.lock().unwrap();
            match ports.get(identifier) {
                Some(state) => Arc::clone(state),
                None => return Err(LinkError::PortNotFound(identifier.to_string())),
            }
        };

        state.open_calls.fetch_add(1, Ordering::SeqCst);
        self.total_opens.fetch_add(1, Ordering::SeqCst);
        self.open_order
            .lock()
            .unwrap()
            .push(identifier.to_string());

        if state.open_fails.load(Ordering::SeqCst) {
            return Err(LinkError::OpenFailed(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "mock open failure",
            )));
        }

        let live = self.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_handles.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockSerialLink {
            state,
            live: Arc::clone(&self.live_handles),
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_returns_staged_endpoints_in_order() {
        let factory = MockLinkFactory::new();
        factory.add_usb("COM3");
        factory.add_bluetooth("COM5");

        let endpoints = factory.enumerate();
        let ids: Vec<_> = endpoints.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["COM3", "COM5"]);
        assert_eq!(endpoints[0].transport_kind, TransportKind::Usb);
        assert_eq!(endpoints[1].transport_kind, TransportKind::Bluetooth);
    }

    #[test]
    fn test_open_unknown_port_returns_port_not_found() {
        let factory = MockLinkFactory::new();
        let result = factory.open("COM99", TransportKind::Usb);
        assert!(matches!(result, Err(LinkError::PortNotFound(_))));
    }

    #[test]
    fn test_open_failure_is_scripted_per_port() {
        let factory = MockLinkFactory::new();
        let port = factory.add_bluetooth("COM5");
        port.set_open_fails(true);

        assert!(factory.open("COM5", TransportKind::Bluetooth).is_err());
        assert_eq!(port.open_calls(), 1);
        assert_eq!(factory.live_handles(), 0, "failed opens hold no handle");
    }

    #[test]
    fn test_hello_write_triggers_scripted_reply() {
        let factory = MockLinkFactory::new();
        let port = factory.add_bluetooth("COM5");
        port.set_hello_reply(vec![0x7F, 0x01, 0x02, 0x01, 0x00, 0x00]);

        let mut link = factory.open("COM5", TransportKind::Bluetooth).unwrap();
        link.write_all(&[0xF0, 0x00]).unwrap();

        let mut buf = [0u8; 32];
        let n = link.read_chunk(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x7F, 0x01, 0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_clear_input_discards_pending_bytes() {
        let factory = MockLinkFactory::new();
        let port = factory.add_bluetooth("COM5");
        port.push_read_data(&[0xAA, 0xBB]);

        let mut link = factory.open("COM5", TransportKind::Bluetooth).unwrap();
        link.clear_input().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(link.read_chunk(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_error_is_scripted() {
        let factory = MockLinkFactory::new();
        let port = factory.add_usb("COM3");
        let mut link = factory.open("COM3", TransportKind::Usb).unwrap();

        link.write_all(&[0x01]).unwrap();
        port.set_write_error(Some(io::ErrorKind::BrokenPipe));
        let err = link.write_all(&[0x02]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // Only the successful write was recorded.
        assert_eq!(port.written(), vec![0x01]);
    }

    #[test]
    fn test_live_handle_accounting_follows_drops() {
        let factory = MockLinkFactory::new();
        factory.add_usb("COM3");

        let a = factory.open("COM3", TransportKind::Usb).unwrap();
        let b = factory.open("COM3", TransportKind::Usb).unwrap();
        assert_eq!(factory.live_handles(), 2);
        assert_eq!(factory.max_live_handles(), 2);

        drop(a);
        drop(b);
        assert_eq!(factory.live_handles(), 0);
        assert_eq!(factory.max_live_handles(), 2, "max is a high-water mark");
    }
}
