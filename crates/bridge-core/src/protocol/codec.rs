//! Byte codec for Core2 frames.
//!
//! Encoding produces a short, fixed-layout byte vector per frame; the
//! receiver derives the length from the opcode, so there is no framing
//! header.  Numeric payloads are clamped or masked here rather than at
//! construction time, so every encoded frame is in range no matter what the
//! caller passed in.
//!
//! Decoding covers the single inbound message: the 6-byte DEVICE_ID
//! handshake reply.  Serial reads arrive in arbitrary chunks with possible
//! stale bytes in front, so [`find_device_id_reply`] scans the accumulated
//! buffer for the two-byte magic prefix instead of assuming alignment.

use crate::protocol::frames::{
    DeviceIdReply, Frame, DEVICE_ID_CMD, DEVICE_ID_LEN, DEVICE_ID_MAGIC, HELLO_CMD, HELLO_MAGIC,
    OPCODE_LAYER, OPCODE_RATE, OPCODE_SOLENOID_LIGHT, OPCODE_SOLENOID_STRONG, RATE_MAX,
};

/// Encodes a [`Frame`] into its wire byte sequence.
///
/// # Examples
///
/// ```rust
/// use bridge_core::{encode, Frame};
///
/// assert_eq!(encode(&Frame::Hello), vec![0xF0, 0x00]);
/// assert_eq!(encode(&Frame::Rate(500)), vec![0x01, 0xF4, 0x01]);
/// ```
pub fn encode(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::Hello => vec![HELLO_MAGIC, HELLO_CMD],
        Frame::Rate(rate) => {
            let clamped = (*rate).clamp(0, RATE_MAX) as u16;
            let [lsb, msb] = clamped.to_le_bytes();
            vec![OPCODE_RATE, lsb, msb]
        }
        Frame::Layer(layer) => vec![OPCODE_LAYER, (*layer & 0xFF) as u8],
        Frame::SolenoidLight => vec![OPCODE_SOLENOID_LIGHT],
        Frame::SolenoidStrong => vec![OPCODE_SOLENOID_STRONG],
        Frame::PcStat(kind, value) => vec![*kind as u8, clamp_byte(*value)],
        Frame::DeviceIdReply(reply) => vec![
            DEVICE_ID_MAGIC,
            DEVICE_ID_CMD,
            reply.protocol,
            reply.device_type,
            reply.features,
            0x00, // reserved
        ],
    }
}

/// Scans an inbound read buffer for a complete DEVICE_ID reply.
///
/// Returns the first reply whose two-byte prefix is followed by the full
/// 6-byte packet; returns `None` when the prefix is absent or the packet is
/// still truncated (the caller keeps polling until its deadline).  The
/// device-type byte is **not** validated here: a mismatch is a trust
/// decision for the probe engine, not a parse error.
pub fn find_device_id_reply(buf: &[u8]) -> Option<DeviceIdReply> {
    let prefix = [DEVICE_ID_MAGIC, DEVICE_ID_CMD];
    let idx = buf
        .windows(prefix.len())
        .position(|window| window == prefix)?;
    if buf.len() < idx + DEVICE_ID_LEN {
        return None;
    }
    let pkt = &buf[idx..idx + DEVICE_ID_LEN];
    Some(DeviceIdReply {
        protocol: pkt[2],
        device_type: pkt[3],
        features: pkt[4],
    })
}

fn clamp_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frames::PcStatKind;

    // ── Rate encoding ─────────────────────────────────────────────────────────

    #[test]
    fn test_rate_encodes_little_endian() {
        // 500 = 0x01F4: LSB first.
        assert_eq!(encode(&Frame::Rate(500)), vec![0x01, 0xF4, 0x01]);
    }

    #[test]
    fn test_rate_clamps_above_two_thousand() {
        // 2500 clamps to 2000 = 0x07D0.
        assert_eq!(encode(&Frame::Rate(2500)), vec![0x01, 0xD0, 0x07]);
    }

    #[test]
    fn test_rate_clamps_negative_to_zero() {
        assert_eq!(encode(&Frame::Rate(-5)), vec![0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_rate_boundary_values() {
        assert_eq!(encode(&Frame::Rate(0)), vec![0x01, 0x00, 0x00]);
        assert_eq!(encode(&Frame::Rate(2000)), vec![0x01, 0xD0, 0x07]);
    }

    // ── Layer encoding ────────────────────────────────────────────────────────

    #[test]
    fn test_layer_encodes_opcode_and_value() {
        assert_eq!(encode(&Frame::Layer(3)), vec![0x02, 0x03]);
    }

    #[test]
    fn test_layer_masks_to_one_byte() {
        // 300 & 0xFF = 44.
        assert_eq!(encode(&Frame::Layer(300)), vec![0x02, 44]);
    }

    // ── Solenoid encoding ─────────────────────────────────────────────────────

    #[test]
    fn test_solenoid_opcodes_are_single_bytes() {
        assert_eq!(encode(&Frame::SolenoidLight), vec![0x10]);
        assert_eq!(encode(&Frame::SolenoidStrong), vec![0x11]);
    }

    // ── Hello encoding ────────────────────────────────────────────────────────

    #[test]
    fn test_hello_is_magic_plus_cmd() {
        assert_eq!(encode(&Frame::Hello), vec![0xF0, 0x00]);
    }

    // ── PC stat encoding ──────────────────────────────────────────────────────

    #[test]
    fn test_pc_stat_encodes_kind_opcode() {
        assert_eq!(
            encode(&Frame::PcStat(PcStatKind::CpuPercent, 42)),
            vec![0x20, 42]
        );
        assert_eq!(
            encode(&Frame::PcStat(PcStatKind::CpuTempC, 67)),
            vec![0x27, 67]
        );
    }

    #[test]
    fn test_pc_stat_clamps_to_byte_range() {
        assert_eq!(
            encode(&Frame::PcStat(PcStatKind::DiskReadDeciMb, 9000)),
            vec![0x25, 255]
        );
        assert_eq!(
            encode(&Frame::PcStat(PcStatKind::RamPercent, -3)),
            vec![0x21, 0]
        );
    }

    // ── DEVICE_ID reply encoding ──────────────────────────────────────────────

    #[test]
    fn test_device_id_reply_encodes_six_bytes() {
        let frame = Frame::DeviceIdReply(DeviceIdReply {
            protocol: 0x02,
            device_type: 0x01,
            features: 0x00,
        });
        assert_eq!(encode(&frame), vec![0x7F, 0x01, 0x02, 0x01, 0x00, 0x00]);
    }

    // ── DEVICE_ID reply scanning ──────────────────────────────────────────────

    #[test]
    fn test_find_reply_at_buffer_start() {
        let reply = find_device_id_reply(&[0x7F, 0x01, 0x02, 0x01, 0x00, 0x00]);
        assert_eq!(
            reply,
            Some(DeviceIdReply {
                protocol: 0x02,
                device_type: 0x01,
                features: 0x00,
            })
        );
    }

    #[test]
    fn test_find_reply_after_stale_bytes() {
        // Stale echo bytes before the reply are skipped by the scan.
        let buf = [0x00, 0xAA, 0x7F, 0x01, 0x02, 0x01, 0x05, 0x00];
        let reply = find_device_id_reply(&buf).expect("reply must be found");
        assert_eq!(reply.protocol, 0x02);
        assert_eq!(reply.features, 0x05);
    }

    #[test]
    fn test_find_reply_returns_none_for_truncated_packet() {
        // Prefix present but only 5 of 6 bytes buffered so far.
        assert_eq!(find_device_id_reply(&[0x7F, 0x01, 0x02, 0x01, 0x00]), None);
    }

    #[test]
    fn test_find_reply_returns_none_without_prefix() {
        assert_eq!(find_device_id_reply(&[0x01, 0xF4, 0x01, 0x02, 0x03]), None);
        assert_eq!(find_device_id_reply(&[]), None);
    }

    #[test]
    fn test_find_reply_does_not_validate_device_type() {
        // A non-Core2 device type still parses; trusting it is the probe's
        // decision.
        let reply = find_device_id_reply(&[0x7F, 0x01, 0x02, 0x02, 0x00, 0x00])
            .expect("reply must parse");
        assert!(!reply.is_core2());
    }

    #[test]
    fn test_find_reply_magic_split_across_stale_data() {
        // A lone 0x7F followed by a non-0x01 byte must not match; the real
        // reply later in the buffer must.
        let buf = [0x7F, 0x00, 0x7F, 0x01, 0x03, 0x01, 0x00, 0x00];
        let reply = find_device_id_reply(&buf).expect("reply must be found");
        assert_eq!(reply.protocol, 0x03);
    }
}
