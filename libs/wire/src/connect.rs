//! Connect payload decoding.
//!
//! Two on-wire layouts exist. Old clients (v1) lead with a 64-byte
//! ASCII-hex protocol hash; newer clients (v2) lead with a CRC, build
//! number and a short version string. The probe inspects the bytes where
//! the v1 hash would sit: ASCII hex with trailing NULs selects v1,
//! anything else tries v2 first and falls back to v1.

use tracing::debug;

use crate::varint::{read_fixed_ascii, read_varstring};
use crate::{read_varint, HostAddress, WireError};

const V1_MIN_LEN: usize = 102;
const V2_MIN_LEN: usize = 66;

const MAX_LANGUAGE_V1: usize = 128;
const MAX_LANGUAGE_V2: usize = 16;
const MAX_IDENTITY_TOKEN: usize = 8192;
const MAX_USERNAME: usize = 16;
const MAX_REFERRAL_DATA: usize = 4096;

/// Fields decoded from a Connect payload.
///
/// The identity token is never surfaced, only whether one parsed. The
/// referral fields are observability-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectInfo {
    pub protocol_hash: String,
    pub protocol_crc: i32,
    pub protocol_build: i32,
    pub client_version: String,
    pub client_type: u8,
    pub uuid: String,
    pub language: String,
    pub identity_token_present: bool,
    pub username: String,
    pub referral_data_len: usize,
    pub referral_source: Option<HostAddress>,
}

/// Decode a Connect payload under either layout.
///
/// A payload failing every mandatory field of both layouts yields
/// `DecodeFailed` rather than partial data.
pub fn decode_connect(payload: &[u8]) -> Result<ConnectInfo, WireError> {
    if payload.len() >= V1_MIN_LEN && looks_like_hex_fixed_ascii(payload, 1, 64) {
        return decode_connect_v1(payload).ok_or(WireError::DecodeFailed);
    }
    if let Some(info) = decode_connect_v2(payload) {
        debug!("connect payload decoded as v2 after v1 probe declined");
        return Ok(info);
    }
    decode_connect_v1(payload).ok_or(WireError::DecodeFailed)
}

fn looks_like_hex_fixed_ascii(b: &[u8], start: usize, len: usize) -> bool {
    let Some(end) = start.checked_add(len) else {
        return false;
    };
    if len == 0 || end > b.len() {
        return false;
    }
    b[start..end]
        .iter()
        .all(|&c| c == 0 || c.is_ascii_hexdigit())
}

fn decode_connect_v1(payload: &[u8]) -> Option<ConnectInfo> {
    if payload.len() < V1_MIN_LEN {
        return None;
    }

    let null_bits = payload[0];

    let mut info = ConnectInfo {
        protocol_hash: read_fixed_ascii(payload, 1, 64),
        client_type: payload[65],
        ..ConnectInfo::default()
    };

    let msb = u64::from_be_bytes(payload[66..74].try_into().ok()?);
    let lsb = u64::from_be_bytes(payload[74..82].try_into().ok()?);
    info.uuid = format_uuid(msb, lsb);

    let language_offset = read_i32_le(payload, 82);
    let identity_offset = read_i32_le(payload, 86);
    let username_offset = read_i32_le(payload, 90);
    let referral_data_offset = read_i32_le(payload, 94);
    let referral_source_offset = read_i32_le(payload, 98);

    if null_bits & 0x01 != 0 && language_offset >= 0 {
        let pos = V1_MIN_LEN + language_offset as usize;
        if let Some((s, _)) = read_varstring(payload, pos, MAX_LANGUAGE_V1) {
            info.language = s;
        }
    }

    if null_bits & 0x02 != 0 && identity_offset >= 0 {
        let pos = V1_MIN_LEN + identity_offset as usize;
        info.identity_token_present = read_varstring(payload, pos, MAX_IDENTITY_TOKEN).is_some();
    }

    if username_offset >= 0 {
        let pos = V1_MIN_LEN + username_offset as usize;
        if let Some((s, _)) = read_varstring(payload, pos, MAX_USERNAME) {
            info.username = s;
        }
    }

    if null_bits & 0x04 != 0 && referral_data_offset >= 0 {
        let pos = V1_MIN_LEN + referral_data_offset as usize;
        info.referral_data_len = read_referral_data_len(payload, pos).unwrap_or(0);
    }

    if null_bits & 0x08 != 0 && referral_source_offset >= 0 {
        let pos = V1_MIN_LEN + referral_source_offset as usize;
        if let Some((ha, _)) = HostAddress::decode(payload, pos) {
            info.referral_source = Some(ha);
        }
    }

    Some(info)
}

fn decode_connect_v2(payload: &[u8]) -> Option<ConnectInfo> {
    if payload.len() < V2_MIN_LEN {
        return None;
    }

    let null_bits = payload[0];

    let mut info = ConnectInfo {
        protocol_crc: read_i32_le(payload, 1),
        protocol_build: read_i32_le(payload, 5),
        client_version: read_fixed_ascii(payload, 9, 20),
        client_type: payload[29],
        ..ConnectInfo::default()
    };
    info.protocol_hash = info.client_version.clone();

    let msb = u64::from_be_bytes(payload[30..38].try_into().ok()?);
    let lsb = u64::from_be_bytes(payload[38..46].try_into().ok()?);
    info.uuid = format_uuid(msb, lsb);

    let username_offset = read_i32_le(payload, 46);
    let identity_offset = read_i32_le(payload, 50);
    let language_offset = read_i32_le(payload, 54);
    let referral_data_offset = read_i32_le(payload, 58);
    let referral_source_offset = read_i32_le(payload, 62);

    // Username and language are mandatory in this layout.
    if username_offset < 0 {
        return None;
    }
    let (username, _) =
        read_varstring(payload, V2_MIN_LEN + username_offset as usize, MAX_USERNAME)?;
    info.username = username;

    if null_bits & 0x01 != 0 && identity_offset >= 0 {
        let pos = V2_MIN_LEN + identity_offset as usize;
        info.identity_token_present = read_varstring(payload, pos, MAX_IDENTITY_TOKEN).is_some();
    }

    if language_offset < 0 {
        return None;
    }
    let (language, _) = read_varstring(
        payload,
        V2_MIN_LEN + language_offset as usize,
        MAX_LANGUAGE_V2,
    )?;
    info.language = language;

    if null_bits & 0x02 != 0 && referral_data_offset >= 0 {
        let pos = V2_MIN_LEN + referral_data_offset as usize;
        info.referral_data_len = read_referral_data_len(payload, pos).unwrap_or(0);
    }

    if null_bits & 0x04 != 0 && referral_source_offset >= 0 {
        let pos = V2_MIN_LEN + referral_source_offset as usize;
        if let Some((ha, _)) = HostAddress::decode(payload, pos) {
            info.referral_source = Some(ha);
        }
    }

    Some(info)
}

fn read_referral_data_len(payload: &[u8], pos: usize) -> Option<usize> {
    let (len, len_size) = read_varint(payload, pos)?;
    if len > MAX_REFERRAL_DATA {
        return None;
    }
    let start = pos + len_size;
    let end = start.checked_add(len)?;
    if end > payload.len() {
        return None;
    }
    Some(len)
}

fn read_i32_le(b: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes([b[pos], b[pos + 1], b[pos + 2], b[pos + 3]])
}

fn format_uuid(msb: u64, lsb: u64) -> String {
    let hi = msb.to_be_bytes();
    let lo = lsb.to_be_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        hi[0], hi[1], hi[2], hi[3], hi[4], hi[5], hi[6], hi[7],
        lo[0], lo[1], lo[2], lo[3], lo[4], lo[5], lo[6], lo[7],
    )
}
