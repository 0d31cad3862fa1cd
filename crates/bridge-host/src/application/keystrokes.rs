//! Keystroke processing: auto-repeat suppression and solenoid selection.
//!
//! The key source reports raw key-down/key-up events.  Holding a key makes
//! the OS synthesize repeated key-downs, which must count as a single press:
//! a key is accepted on the first down and ignored until its up arrives.
//! Accepted presses feed the rate counter and select a solenoid pulse —
//! strong for the chunky editing keys, light for everything else.

use std::collections::HashSet;

use bridge_core::Frame;

use crate::infrastructure::input::{KeyAction, KeyEvent};

/// Keys that fire the strong solenoid pulse.
pub const STRONG_KEYS: &[&str] = &["enter", "space", "backspace", "delete", "tab"];

/// Which solenoid pulse an accepted key press triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPulse {
    Light,
    Strong,
}

impl KeyPulse {
    /// The wire frame for this pulse.
    pub fn frame(self) -> Frame {
        match self {
            KeyPulse::Light => Frame::SolenoidLight,
            KeyPulse::Strong => Frame::SolenoidStrong,
        }
    }
}

/// Tracks held keys and classifies accepted presses.
#[derive(Debug, Default)]
pub struct KeystrokeProcessor {
    pressed: HashSet<String>,
}

impl KeystrokeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one raw event.
    ///
    /// Returns the pulse to fire for an accepted key-down; `None` for
    /// auto-repeats and key-ups.  Key names are compared case-insensitively.
    pub fn on_event(&mut self, event: &KeyEvent) -> Option<KeyPulse> {
        let key = event.key.to_ascii_lowercase();
        match event.action {
            KeyAction::Down => {
                if !self.pressed.insert(key.clone()) {
                    // Already held: OS auto-repeat.
                    return None;
                }
                Some(if STRONG_KEYS.contains(&key.as_str()) {
                    KeyPulse::Strong
                } else {
                    KeyPulse::Light
                })
            }
            KeyAction::Up => {
                self.pressed.remove(&key);
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
