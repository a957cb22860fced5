//! Stream framing: `u32le payload_len | u32le packet_id | payload`.

/// Bytes occupied by the frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest `payload_len` the protocol admits. Handlers layer a much
/// stricter buffered cap on top of this.
pub const MAX_PAYLOAD_LEN: u32 = 1_677_721_600;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
    pub packet_id: u32,
}

impl FrameHeader {
    /// Parse a header from the first 8 bytes of `b`, if present.
    pub fn parse(b: &[u8]) -> Option<FrameHeader> {
        if b.len() < FRAME_HEADER_LEN {
            return None;
        }
        Some(FrameHeader {
            payload_len: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            packet_id: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        })
    }

    /// Total frame size including the header.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload_len as usize
    }
}

/// Encode a complete frame for `packet_id` around `payload`.
pub fn encode_frame(packet_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&packet_id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frame_layout() {
        let payload = [0x01, 0x02, 0x03];
        let out = encode_frame(18, &payload);
        assert_eq!(out.len(), FRAME_HEADER_LEN + payload.len());
        assert_eq!(u32::from_le_bytes(out[0..4].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), 18);
        assert_eq!(&out[8..], &payload);
    }

    #[test]
    fn header_roundtrip() {
        let out = encode_frame(0, &[0xaa; 12]);
        let header = FrameHeader::parse(&out).expect("header");
        assert_eq!(header.payload_len, 12);
        assert_eq!(header.packet_id, 0);
        assert_eq!(header.frame_len(), 20);
    }

    #[test]
    fn header_needs_eight_bytes() {
        assert!(FrameHeader::parse(&[0; 7]).is_none());
    }
}
