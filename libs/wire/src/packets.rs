//! Payload encoders for the packets the router emits, plus packet id
//! naming for observability.

use crate::varint::{read_varstring, write_varint, write_varstring};
use crate::WireError;

const MAX_REFERRAL_HOST: usize = 256;
const MAX_REFERRAL_DATA: usize = 4096;
const MAX_DISCONNECT_REASON: usize = 4_096_000;
const MAX_PASSWORD_CHALLENGE: usize = 64;

/// Known packet ids on the game stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketId {
    Connect = 0,
    Disconnect = 1,
    Ping = 2,
    Pong = 3,
    ConnectAccept = 14,
    ClientReferral = 18,
}

impl PacketId {
    /// Wire value of this packet id.
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<PacketId> {
        match id {
            0 => Some(PacketId::Connect),
            1 => Some(PacketId::Disconnect),
            2 => Some(PacketId::Ping),
            3 => Some(PacketId::Pong),
            14 => Some(PacketId::ConnectAccept),
            18 => Some(PacketId::ClientReferral),
            _ => None,
        }
    }
}

/// Human-readable packet name for logging; `"unknown"` for ids the
/// router does not recognize.
pub fn packet_name(id: u32) -> &'static str {
    match PacketId::from_id(id) {
        Some(PacketId::Connect) => "Connect",
        Some(PacketId::Disconnect) => "Disconnect",
        Some(PacketId::Ping) => "Ping",
        Some(PacketId::Pong) => "Pong",
        Some(PacketId::ConnectAccept) => "ConnectAccept",
        Some(PacketId::ClientReferral) => "ClientReferral",
        None => "unknown",
    }
}

/// A `port | varstring(host)` address entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    /// Decode a HostAddress at `pos`, returning it with its encoded size.
    pub(crate) fn decode(b: &[u8], pos: usize) -> Option<(HostAddress, usize)> {
        if pos + 2 > b.len() {
            return None;
        }
        let port = u16::from_le_bytes([b[pos], b[pos + 1]]);
        let (host, host_size) = read_varstring(b, pos + 2, MAX_REFERRAL_HOST)?;
        Some((HostAddress { host, port }, 2 + host_size))
    }
}

fn write_host_address(out: &mut Vec<u8>, host: &str, port: u16) -> Result<(), WireError> {
    out.extend_from_slice(&port.to_le_bytes());
    write_varstring(out, host, MAX_REFERRAL_HOST)
}

/// Encode a Disconnect payload. An empty reason encodes as two zero
/// bytes; otherwise the reason rides as a varstring.
pub fn encode_disconnect(reason: &str) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    if reason.is_empty() {
        payload.push(0);
        payload.push(0);
        return Ok(payload);
    }
    payload.push(0x01);
    payload.push(0);
    write_varstring(&mut payload, reason, MAX_DISCONNECT_REASON)?;
    Ok(payload)
}

/// Encode a ConnectAccept payload with an optional password challenge.
pub fn encode_connect_accept(challenge: Option<&[u8]>) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    let Some(challenge) = challenge else {
        payload.push(0);
        return Ok(payload);
    };
    if challenge.len() > MAX_PASSWORD_CHALLENGE {
        return Err(WireError::ChallengeTooLong(challenge.len()));
    }
    payload.push(0x01);
    write_varint(&mut payload, challenge.len());
    payload.extend_from_slice(challenge);
    Ok(payload)
}

/// Encode a ClientReferral payload steering the client to `host:port`,
/// optionally carrying opaque `data` bytes.
///
/// Layout: `null_bits u8 | host_to_offset i32le | data_offset i32le`
/// followed by the variable block the offsets index into (offset -1 for
/// an absent entry).
pub fn encode_client_referral(
    host: &str,
    port: u16,
    data: Option<&[u8]>,
) -> Result<Vec<u8>, WireError> {
    if host.is_empty() {
        return Err(WireError::EmptyHost);
    }
    if host.len() > MAX_REFERRAL_HOST {
        return Err(WireError::HostTooLong(host.len()));
    }
    if let Some(data) = data {
        if data.len() > MAX_REFERRAL_DATA {
            return Err(WireError::DataTooLong(data.len()));
        }
    }

    let mut null_bits = 0x01u8;
    if data.is_some() {
        null_bits |= 0x02;
    }

    let mut payload = Vec::new();
    payload.push(null_bits);

    let host_offset_slot = payload.len();
    payload.extend_from_slice(&[0; 4]);
    let data_offset_slot = payload.len();
    payload.extend_from_slice(&[0; 4]);

    let var_block_start = payload.len();

    let host_offset = (payload.len() - var_block_start) as i32;
    set_i32_le(&mut payload, host_offset_slot, host_offset);
    write_host_address(&mut payload, host, port)?;

    if let Some(data) = data {
        let data_offset = (payload.len() - var_block_start) as i32;
        set_i32_le(&mut payload, data_offset_slot, data_offset);
        write_varint(&mut payload, data.len());
        payload.extend_from_slice(data);
    } else {
        set_i32_le(&mut payload, data_offset_slot, -1);
    }

    Ok(payload)
}

fn set_i32_le(b: &mut [u8], pos: usize, v: i32) {
    b[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_empty_reason() {
        let p = encode_disconnect("").unwrap();
        assert_eq!(p, vec![0, 0]);
    }

    #[test]
    fn disconnect_with_reason() {
        let p = encode_disconnect("no").unwrap();
        assert_eq!(p[0], 0x01);
        assert_eq!(p[1], 0);
        assert_eq!(p[2], 2);
        assert_eq!(&p[3..], b"no");
    }

    #[test]
    fn connect_accept_without_challenge() {
        assert_eq!(encode_connect_accept(None).unwrap(), vec![0]);
    }

    #[test]
    fn connect_accept_with_challenge() {
        let p = encode_connect_accept(Some(&[9, 8, 7])).unwrap();
        assert_eq!(p, vec![0x01, 3, 9, 8, 7]);
        assert_eq!(
            encode_connect_accept(Some(&[0; 65])),
            Err(WireError::ChallengeTooLong(65))
        );
    }

    #[test]
    fn client_referral_host_only() {
        let p = encode_client_referral("play.example.com", 5520, None).unwrap();
        assert!(p.len() >= 9);
        assert_eq!(p[0], 0x01);
        assert_eq!(i32::from_le_bytes(p[1..5].try_into().unwrap()), 0);
        assert_eq!(i32::from_le_bytes(p[5..9].try_into().unwrap()), -1);
        assert_eq!(u16::from_le_bytes(p[9..11].try_into().unwrap()), 5520);
        assert_eq!(p[11] as usize, "play.example.com".len());
        assert_eq!(&p[12..12 + 16], b"play.example.com");
    }

    #[test]
    fn client_referral_with_data() {
        let data: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
        let p = encode_client_referral("h", 1, Some(&data)).unwrap();
        assert_eq!(p[0], 0x03);
        let data_offset = i32::from_le_bytes(p[5..9].try_into().unwrap());
        assert!(data_offset > 0);
        let pos = 9 + data_offset as usize;
        let (len, size) = crate::read_varint(&p, pos).unwrap();
        assert_eq!(len, 300);
        assert_eq!(&p[pos + size..], &data[..]);
    }

    #[test]
    fn client_referral_rejects_bad_inputs() {
        assert_eq!(
            encode_client_referral("", 1, None),
            Err(WireError::EmptyHost)
        );
        let long_host = "a".repeat(257);
        assert_eq!(
            encode_client_referral(&long_host, 1, None),
            Err(WireError::HostTooLong(257))
        );
        let big = vec![0u8; 4097];
        assert_eq!(
            encode_client_referral("h", 1, Some(&big)),
            Err(WireError::DataTooLong(4097))
        );
    }

    #[test]
    fn host_address_decode_failures() {
        assert!(HostAddress::decode(&[], 0).is_none());
        assert!(HostAddress::decode(&[0, 0, 0x81], 0).is_none());
    }

    #[test]
    fn packet_names() {
        assert_eq!(packet_name(0), "Connect");
        assert_eq!(packet_name(1), "Disconnect");
        assert_eq!(packet_name(14), "ConnectAccept");
        assert_eq!(packet_name(18), "ClientReferral");
        assert_eq!(packet_name(999), "unknown");
    }
}
