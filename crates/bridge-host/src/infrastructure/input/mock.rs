//! Mock input sources for unit testing.
//!
//! Allow tests to inject synthetic key events and layer notifications
//! without OS hooks or a connected keyboard.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};

use super::{CaptureError, KeyEvent, KeySource, LayerSource};

/// A mock [`KeySource`] that lets tests inject events.
#[derive(Default)]
pub struct MockKeySource {
    sender: Arc<Mutex<Option<Sender<KeyEvent>>>>,
}

impl MockKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic event, as if captured from the keyboard.
    ///
    /// Panics if `start()` has not been called or `stop()` already has.
    pub fn inject(&self, event: KeyEvent) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(event)
                .expect("receiver dropped; call start() first"),
            None => panic!("MockKeySource::inject called before start()"),
        }
    }
}

impl KeySource for MockKeySource {
    fn start(&self) -> Result<mpsc::Receiver<KeyEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

/// A mock [`LayerSource`] that lets tests inject layer ids.
#[derive(Default)]
pub struct MockLayerSource {
    sender: Arc<Mutex<Option<Sender<u8>>>>,
}

impl MockLayerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a layer notification.
    pub fn inject(&self, layer: u8) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(layer)
                .expect("receiver dropped; call start() first"),
            None => panic!("MockLayerSource::inject called before start()"),
        }
    }
}

impl LayerSource for MockLayerSource {
    fn start(&self) -> Result<mpsc::Receiver<u8>, CaptureError> {
        let (tx, rx) = mpsc::channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::input::KeyAction;

    #[test]
    fn test_mock_key_source_delivers_injected_events() {
        let source = MockKeySource::new();
        let rx = source.start().expect("start should succeed");

        source.inject(KeyEvent::down("a"));
        source.inject(KeyEvent::up("a"));

        assert_eq!(rx.recv().unwrap().action, KeyAction::Down);
        assert_eq!(rx.recv().unwrap().action, KeyAction::Up);
    }

    #[test]
    fn test_mock_key_source_stop_closes_channel() {
        let source = MockKeySource::new();
        let rx = source.start().expect("start should succeed");

        source.stop();

        assert!(rx.recv().is_err(), "channel must close on stop()");
    }

    #[test]
    fn test_mock_layer_source_delivers_layers_in_order() {
        let source = MockLayerSource::new();
        let rx = source.start().expect("start should succeed");

        source.inject(1);
        source.inject(3);

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 3);
    }
}
