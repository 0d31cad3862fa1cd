//! Core2 wire protocol: frame types and the byte codec.

pub mod codec;
pub mod frames;

pub use codec::{encode, find_device_id_reply};
pub use frames::{DeviceIdReply, Frame, PcStatKind};
