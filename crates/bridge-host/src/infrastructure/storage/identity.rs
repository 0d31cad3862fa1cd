//! Persisted link identity: the last successfully used endpoint per
//! transport kind.
//!
//! A small TOML record keyed by transport kind:
//!
//! ```toml
//! [usb]
//! last_port = "COM3"
//!
//! [bt]
//! last_port = "COM5"
//! mac = "08:00:5F:9B:34:FB"
//! name = "Standard Serial over Bluetooth link"
//! ```
//!
//! The store is written only after a **confirmed successful** connection of
//! the same transport kind, never on failure, and entries are never deleted
//! automatically.  Loading tolerates a missing or malformed file by falling
//! back to empty identities so a corrupted store can never block startup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bridge_core::TransportKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Error type for identity store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing identity store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse identity store: {0}")]
    Parse(#[from] toml::de::Error),

    /// The identities could not be serialized to TOML.
    #[error("failed to serialize identity store: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Identity record for one transport kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportIdentity {
    /// Identifier of the last successfully connected endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_port: Option<String>,
    /// Bluetooth device address, colon-separated.  Bluetooth entry only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Endpoint description at the time of the last success.  Bluetooth
    /// entry only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The full persisted record, one entry per transport kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentities {
    #[serde(default)]
    pub usb: TransportIdentity,
    #[serde(default)]
    pub bt: TransportIdentity,
}

impl PersistedIdentities {
    /// Returns the entry for `kind`.
    pub fn entry(&self, kind: TransportKind) -> &TransportIdentity {
        match kind {
            TransportKind::Usb => &self.usb,
            TransportKind::Bluetooth => &self.bt,
        }
    }

    fn entry_mut(&mut self, kind: TransportKind) -> &mut TransportIdentity {
        match kind {
            TransportKind::Usb => &mut self.usb,
            TransportKind::Bluetooth => &mut self.bt,
        }
    }
}

/// Bluetooth extras recorded alongside a successful connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothIdentity {
    pub mac: Option<String>,
    pub name: String,
}

/// File-backed identity store.
///
/// All read-modify-write cycles serialize on an internal mutex; writes are
/// rare (one per successful connection) so contention is negligible.
pub struct IdentityStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl IdentityStore {
    /// Creates a store backed by `path`.  The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted identities, falling back to empty identities when
    /// the file is missing or malformed.
    pub fn load(&self) -> PersistedIdentities {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.read_unlocked()
    }

    /// Returns the remembered endpoint identifier for `kind`, if any.
    pub fn last_port(&self, kind: TransportKind) -> Option<String> {
        self.load().entry(kind).last_port.clone()
    }

    /// Records a confirmed successful connection.
    ///
    /// Overwrites only the entry for `kind`; for Bluetooth, the extracted
    /// MAC and endpoint name are stored alongside the port.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file cannot be written.  A failed
    /// write loses only the reconnect hint, so callers typically log and
    /// carry on.
    pub fn record_success(
        &self,
        kind: TransportKind,
        port: &str,
        bluetooth: Option<BluetoothIdentity>,
    ) -> Result<(), StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut identities = self.read_unlocked();
        let entry = identities.entry_mut(kind);
        entry.last_port = Some(port.to_string());
        if let Some(bt) = bluetooth {
            entry.mac = bt.mac;
            entry.name = Some(bt.name);
        }

        self.write_unlocked(&identities)
    }

    fn read_unlocked(&self) -> PersistedIdentities {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PersistedIdentities::default();
            }
            Err(e) => {
                warn!("failed to read identity store {}: {e}", self.path.display());
                return PersistedIdentities::default();
            }
        };
        match toml::from_str(&content) {
            Ok(identities) => identities,
            Err(e) => {
                warn!(
                    "malformed identity store {}, starting empty: {e}",
                    self.path.display()
                );
                PersistedIdentities::default()
            }
        }
    }

    fn write_unlocked(&self, identities: &PersistedIdentities) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(identities)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
