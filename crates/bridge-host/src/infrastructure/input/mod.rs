//! Input event sources.
//!
//! Two external collaborators feed the bridge asynchronously:
//!
//! - a **key source** – the global keyboard hook delivering discrete
//!   key-down/key-up events (only key-downs are counted, after auto-repeat
//!   suppression in the application layer);
//! - a **layer source** – the device-side notification channel (the
//!   keyboard firmware's raw-HID endpoint in the original deployment)
//!   delivering active-layer ids.
//!
//! Both are trait seams: the OS-specific implementations live outside this
//! crate, and tests use the mocks in [`mock`].

use std::sync::mpsc;

use thiserror::Error;

pub mod mock;

/// Whether a key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// One raw keyboard event.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// Key name as reported by the hook, e.g. `"a"`, `"enter"`, `"space"`.
    pub key: String,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn down(key: &str) -> Self {
        Self {
            key: key.to_string(),
            action: KeyAction::Down,
        }
    }

    pub fn up(key: &str) -> Self {
        Self {
            key: key.to_string(),
            action: KeyAction::Up,
        }
    }
}

/// Error type for input source operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("input source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("input source has already been stopped")]
    AlreadyStopped,
}

/// Produces raw keyboard events.
///
/// The production implementation installs an OS-global hook; tests use
/// [`mock::MockKeySource`].
pub trait KeySource: Send {
    /// Starts the source and returns a receiver for captured events.
    fn start(&self) -> Result<mpsc::Receiver<KeyEvent>, CaptureError>;
    /// Stops the source and releases its resources.
    fn stop(&self);
}

/// Produces active-layer ids from the device-side notification channel.
pub trait LayerSource: Send {
    /// Starts the source and returns a receiver for layer ids.
    fn start(&self) -> Result<mpsc::Receiver<u8>, CaptureError>;
    /// Stops the source and releases its resources.
    fn stop(&self);
}
