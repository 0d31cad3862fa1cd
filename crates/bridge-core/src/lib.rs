//! # bridge-core
//!
//! Shared library for TypingBridge containing the Core2 wire protocol codec,
//! the serial endpoint model, and the typing-rate window logic.
//!
//! This crate is used by the host application and by its tests.  It has zero
//! dependencies on OS APIs, serial backends, or UI frameworks: time is always
//! passed in by the caller and all functions are deterministic.
//!
//! The crate defines:
//!
//! - **`protocol`** – How bytes travel over the serial link.  Outbound frames
//!   are encoded into short fixed-layout byte sequences (the receiver derives
//!   the length from the opcode); the only inbound message, the DEVICE_ID
//!   handshake reply, is located by scanning a read buffer for its two-byte
//!   magic prefix.
//!
//! - **`endpoint`** – The serial endpoint model and the table-driven
//!   USB/Bluetooth classifier, plus Bluetooth MAC extraction from OS
//!   hardware-id strings.
//!
//! - **`rate`** – The typing-rate counter: a 1-second accumulation window
//!   converted to a per-minute rate, with an independent 500 ms emission
//!   cadence.

pub mod endpoint;
pub mod protocol;
pub mod rate;

// Re-export the most-used types at the crate root so callers can write
// `bridge_core::Frame` instead of `bridge_core::protocol::frames::Frame`.
pub use endpoint::{
    classify, extract_bt_mac, filter_by_kind, SerialEndpoint, TransportKind,
};
pub use protocol::codec::{encode, find_device_id_reply};
pub use protocol::frames::{DeviceIdReply, Frame, PcStatKind};
pub use rate::RateCounter;
