//! Serial endpoint model and transport classification.
//!
//! A host machine typically exposes a mix of serial endpoints: real USB-CDC
//! adapters, motherboard UARTs, and virtual COM ports created by the
//! Bluetooth stack for RFCOMM channels.  The OS does not label these in a
//! uniform way, so classification is heuristic: an endpoint is considered
//! Bluetooth when its description or hardware id contains one of a known set
//! of Bluetooth-stack markers, and USB otherwise.
//!
//! The marker table is data, not control flow: [`classify_with`] accepts any
//! table so the keyword set can be extended without touching callers.

use serde::{Deserialize, Serialize};

/// The physical transport behind a serial endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Bluetooth,
}

impl TransportKind {
    /// Key used for this transport kind in the persisted identity store.
    pub fn store_key(self) -> &'static str {
        match self {
            TransportKind::Usb => "usb",
            TransportKind::Bluetooth => "bt",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "USB"),
            TransportKind::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// One serial endpoint as seen at enumeration time.
///
/// Produced fresh on every enumeration call and never mutated.  Only the
/// identifier (and, for Bluetooth, the MAC extracted from `hardware_id`) is
/// ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialEndpoint {
    /// OS port name, e.g. `COM5` or `/dev/ttyUSB0`.
    pub identifier: String,
    /// Classified transport kind.
    pub transport_kind: TransportKind,
    /// OS hardware id string (vendor/product/instance path).
    pub hardware_id: String,
    /// Human-readable device description.
    pub description: String,
}

/// Substring markers identifying a Bluetooth-stack serial endpoint.
///
/// Matching is done against the uppercased description and hardware id.
/// `BTHENUM` is the Windows Bluetooth enumerator prefix; `RFCOMM` appears in
/// Linux/BlueZ device paths.
pub const BLUETOOTH_MARKERS: &[&str] = &[
    "BLUETOOTH",
    "BTHENUM",
    "RFCOMM",
    "STANDARD SERIAL OVER BLUETOOTH",
];

/// Classifies an endpoint from its descriptor text using the default
/// [`BLUETOOTH_MARKERS`] table.
pub fn classify(description: &str, hardware_id: &str) -> TransportKind {
    classify_with(BLUETOOTH_MARKERS, description, hardware_id)
}

/// Classifies an endpoint against an explicit marker table.
///
/// Everything that matches no marker is USB: unknown vendor strings are far
/// more likely to be USB-CDC adapters than Bluetooth channels, and a wrong
/// USB label is cheap to detect downstream while a wrong Bluetooth label
/// triggers pointless radio probing.
pub fn classify_with(markers: &[&str], description: &str, hardware_id: &str) -> TransportKind {
    let desc = description.to_ascii_uppercase();
    let hwid = hardware_id.to_ascii_uppercase();
    if markers.iter().any(|m| desc.contains(m) || hwid.contains(m)) {
        TransportKind::Bluetooth
    } else {
        TransportKind::Usb
    }
}

/// Returns the endpoints of the given transport kind, preserving enumeration
/// order.
pub fn filter_by_kind(endpoints: &[SerialEndpoint], kind: TransportKind) -> Vec<SerialEndpoint> {
    endpoints
        .iter()
        .filter(|e| e.transport_kind == kind)
        .cloned()
        .collect()
}

/// Extracts the Bluetooth device address embedded in a hardware id string.
///
/// Windows encodes the remote device address as 12 contiguous hex digits
/// (possibly hyphen-separated) inside the `BTHENUM` instance path.  The
/// digits are reformatted as a colon-separated MAC, e.g.
/// `08005F9B34FB` → `08:00:5F:9B:34:FB`.
///
/// Returns `None` when the string contains no 12-hex-digit run.
pub fn extract_bt_mac(hardware_id: &str) -> Option<String> {
    let cleaned = hardware_id.to_ascii_uppercase().replace('-', "");
    let bytes = cleaned.as_bytes();

    let mut run_start = 0;
    let mut run_len = 0;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_hexdigit() {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len == 12 {
                let mac = &cleaned[run_start..run_start + 12];
                return Some(
                    mac.as_bytes()
                        .chunks(2)
                        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join(":"),
                );
            }
        } else {
            run_len = 0;
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
