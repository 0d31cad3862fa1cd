//! All Core2 wire frame types and protocol constants.
//!
//! Frames are byte-oriented with no length prefix; the receiver derives the
//! frame length from the opcode.  There is no acknowledgment or
//! retransmission: every frame is fire-and-forget.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// First byte of the host → device HELLO frame.
pub const HELLO_MAGIC: u8 = 0xF0;

/// Second byte of the HELLO frame.
pub const HELLO_CMD: u8 = 0x00;

/// First byte of the device → host DEVICE_ID reply.
pub const DEVICE_ID_MAGIC: u8 = 0x7F;

/// Second byte of the DEVICE_ID reply.
pub const DEVICE_ID_CMD: u8 = 0x01;

/// Total length of a DEVICE_ID reply, including the two-byte prefix.
pub const DEVICE_ID_LEN: usize = 6;

/// Device-type byte identifying a Core2 in a DEVICE_ID reply.
pub const CORE2_DEVICE_TYPE: u8 = 0x01;

/// Upper clamp for the typing-rate payload.
pub const RATE_MAX: i32 = 2000;

/// Typing-rate opcode (`0x01, lsb, msb`).
pub const OPCODE_RATE: u8 = 0x01;

/// Active-layer opcode (`0x02, layer`).
pub const OPCODE_LAYER: u8 = 0x02;

/// Light solenoid pulse opcode, single byte.
pub const OPCODE_SOLENOID_LIGHT: u8 = 0x10;

/// Strong solenoid pulse opcode, single byte.
pub const OPCODE_SOLENOID_STRONG: u8 = 0x11;

// ── PC stat kinds ─────────────────────────────────────────────────────────────

/// PC resource stat opcodes (`0x20..=0x27`), each carrying one clamped byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PcStatKind {
    /// CPU utilisation, percent.
    CpuPercent = 0x20,
    /// RAM utilisation, percent.
    RamPercent = 0x21,
    /// Disk-space utilisation, percent.
    DiskPercent = 0x22,
    /// Disk read throughput, whole MB/s.
    DiskReadMb = 0x23,
    /// Disk write throughput, whole MB/s.
    DiskWriteMb = 0x24,
    /// Disk read throughput, 0.1 MB/s units (value is MB/s × 10).
    DiskReadDeciMb = 0x25,
    /// Disk write throughput, 0.1 MB/s units.
    DiskWriteDeciMb = 0x26,
    /// CPU temperature, °C.  Only sent when the host can read a sensor.
    CpuTempC = 0x27,
}

impl TryFrom<u8> for PcStatKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x20 => Ok(PcStatKind::CpuPercent),
            0x21 => Ok(PcStatKind::RamPercent),
            0x22 => Ok(PcStatKind::DiskPercent),
            0x23 => Ok(PcStatKind::DiskReadMb),
            0x24 => Ok(PcStatKind::DiskWriteMb),
            0x25 => Ok(PcStatKind::DiskReadDeciMb),
            0x26 => Ok(PcStatKind::DiskWriteDeciMb),
            0x27 => Ok(PcStatKind::CpuTempC),
            _ => Err(()),
        }
    }
}

// ── DEVICE_ID reply ───────────────────────────────────────────────────────────

/// Payload of a DEVICE_ID reply.
///
/// On the wire: `[0x7F, 0x01, protocol, device_type, features, reserved]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdReply {
    /// Protocol revision the device speaks.
    pub protocol: u8,
    /// Device type; a trusted Core2 reports [`CORE2_DEVICE_TYPE`].
    pub device_type: u8,
    /// Feature bitmask (device-defined).
    pub features: u8,
}

impl DeviceIdReply {
    /// Returns `true` when the device-type byte identifies a Core2.
    pub fn is_core2(&self) -> bool {
        self.device_type == CORE2_DEVICE_TYPE
    }
}

// ── Top-level frame enum ──────────────────────────────────────────────────────

/// One discrete protocol message.
///
/// Frames are immutable and constructed just before encoding; numeric
/// payloads are clamped or masked by the codec, not by the constructor, so a
/// `Frame` may legally carry an out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Host → device greeting; also elicits the DEVICE_ID reply during a
    /// probe.  Encoded as `[0xF0, 0x00]`.
    Hello,
    /// Current typing rate in events per minute; clamped to `[0, RATE_MAX]`
    /// and encoded little-endian, least-significant byte first.
    Rate(i32),
    /// Active keyboard layer id, masked to one byte.
    Layer(u16),
    /// Light haptic pulse.
    SolenoidLight,
    /// Strong haptic pulse.
    SolenoidStrong,
    /// One PC resource reading, clamped to one byte.
    PcStat(PcStatKind, i32),
    /// Device → host handshake reply.  Encoded only by device simulators and
    /// tests; the host decodes it via
    /// [`find_device_id_reply`](crate::protocol::codec::find_device_id_reply).
    DeviceIdReply(DeviceIdReply),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
