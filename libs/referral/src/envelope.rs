//! Envelope encode, parse and verify.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::EnvelopeError;

type HmacSha256 = Hmac<Sha256>;

const MAGIC_V1: &[u8; 4] = b"HYRP";

/// Version byte of the v1 envelope.
pub const ENVELOPE_VERSION_V1: u8 = 1;

const FLAG_SIGNED_HMAC_SHA256: u8 = 0x01;

const MAX_ENVELOPE_SIZE: usize = 4096;
const HMAC_SIZE: usize = 32;
const V1_HEADER_SIZE: usize = 4 + 1 + 1 + 1 + 2;

/// A parsed referral envelope.
///
/// All byte fields are owned copies; nothing borrows the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    pub flags: u8,
    pub key_id: u8,
    pub content: Vec<u8>,
    pub hmac: Vec<u8>,
    pub signed: bool,
    /// The full envelope bytes, trimmed to the declared length.
    pub raw: Vec<u8>,
    /// The pre-MAC prefix the signature covers.
    pub raw_unsigned: Vec<u8>,
}

/// Encode a v1 envelope around `content`.
///
/// Signs with HMAC-SHA-256 iff `secret` is non-empty. Fails when the
/// total envelope would exceed 4096 bytes.
pub fn encode_v1(content: &[u8], key_id: u8, secret: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if content.len() > MAX_ENVELOPE_SIZE {
        return Err(EnvelopeError::ContentTooLarge(content.len()));
    }

    let mut flags = 0u8;
    if !secret.is_empty() {
        flags |= FLAG_SIGNED_HMAC_SHA256;
    }

    let sig_size = if flags & FLAG_SIGNED_HMAC_SHA256 != 0 {
        HMAC_SIZE
    } else {
        0
    };

    let total = V1_HEADER_SIZE + content.len() + sig_size;
    if total > MAX_ENVELOPE_SIZE {
        return Err(EnvelopeError::EnvelopeTooLarge(total));
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC_V1);
    out.push(ENVELOPE_VERSION_V1);
    out.push(flags);
    out.push(key_id);
    out.extend_from_slice(&(content.len() as u16).to_le_bytes());
    out.extend_from_slice(content);

    if flags & FLAG_SIGNED_HMAC_SHA256 != 0 {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| EnvelopeError::InvalidSecret("empty hmac key".into()))?;
        mac.update(&out);
        out.extend_from_slice(&mac.finalize().into_bytes());
    }

    Ok(out)
}

/// Parse a v1 envelope, validating magic, version and lengths.
pub fn parse(b: &[u8]) -> Result<Envelope, EnvelopeError> {
    if b.len() < V1_HEADER_SIZE {
        return Err(EnvelopeError::InvalidEnvelope("buffer too small"));
    }
    if &b[0..4] != MAGIC_V1 {
        return Err(EnvelopeError::InvalidEnvelope("invalid magic"));
    }
    if b[4] != ENVELOPE_VERSION_V1 {
        return Err(EnvelopeError::InvalidEnvelope("unsupported version"));
    }

    let flags = b[5];
    let key_id = b[6];
    let content_len = u16::from_le_bytes([b[7], b[8]]) as usize;

    let signed = flags & FLAG_SIGNED_HMAC_SHA256 != 0;
    let mut need = V1_HEADER_SIZE + content_len;
    if signed {
        need += HMAC_SIZE;
    }
    if need > b.len() {
        return Err(EnvelopeError::InvalidEnvelope("invalid length"));
    }
    if need > MAX_ENVELOPE_SIZE {
        return Err(EnvelopeError::EnvelopeTooLarge(need));
    }

    let content = b[V1_HEADER_SIZE..V1_HEADER_SIZE + content_len].to_vec();
    let hmac = if signed {
        b[V1_HEADER_SIZE + content_len..need].to_vec()
    } else {
        Vec::new()
    };

    let raw = b[..need].to_vec();
    let raw_unsigned = if signed {
        raw[..raw.len() - HMAC_SIZE].to_vec()
    } else {
        raw.clone()
    };

    Ok(Envelope {
        version: ENVELOPE_VERSION_V1,
        flags,
        key_id,
        content,
        hmac,
        signed,
        raw,
        raw_unsigned,
    })
}

/// Verify a signed envelope against a known secret.
pub fn verify(b: &[u8], secret: &[u8]) -> Result<Envelope, EnvelopeError> {
    let env = parse(b)?;
    if !env.signed {
        return Err(EnvelopeError::UnsignedEnvelope);
    }
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| EnvelopeError::InvalidSecret("empty hmac key".into()))?;
    mac.update(&env.raw_unsigned);
    mac.verify_slice(&env.hmac)
        .map_err(|_| EnvelopeError::InvalidHmac)?;
    Ok(env)
}

/// Verify a signed envelope, resolving the secret through
/// `secret_for_key_id`.
pub fn verify_with_secret<F>(b: &[u8], secret_for_key_id: F) -> Result<Envelope, EnvelopeError>
where
    F: Fn(u8) -> Option<Vec<u8>>,
{
    let env = parse(b)?;
    if !env.signed {
        return Err(EnvelopeError::UnsignedEnvelope);
    }
    let secret =
        secret_for_key_id(env.key_id).ok_or(EnvelopeError::UnknownKeyId(env.key_id))?;
    verify(b, &secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_verify_roundtrip() {
        let content = b"hello referral";
        let secret = b"super-secret";
        let out = encode_v1(content, 7, secret).unwrap();

        let env = verify(&out, secret).unwrap();
        assert_eq!(env.key_id, 7);
        assert!(env.signed);
        assert_eq!(env.content, content);
        assert_eq!(env.hmac.len(), HMAC_SIZE);
    }

    #[test]
    fn unsigned_envelope_parses_but_fails_verify() {
        let out = encode_v1(b"plain", 1, b"").unwrap();
        let env = parse(&out).unwrap();
        assert!(!env.signed);
        assert!(env.hmac.is_empty());
        assert_eq!(env.content, b"plain");

        assert_eq!(verify(&out, b"any"), Err(EnvelopeError::UnsignedEnvelope));
    }

    #[test]
    fn tampered_content_fails_verify() {
        let mut out = encode_v1(b"payload", 1, b"k").unwrap();
        let idx = V1_HEADER_SIZE;
        out[idx] ^= 0xff;
        assert_eq!(verify(&out, b"k"), Err(EnvelopeError::InvalidHmac));
    }

    #[test]
    fn wrong_secret_fails_verify() {
        let out = encode_v1(b"payload", 1, b"right").unwrap();
        assert_eq!(verify(&out, b"wrong"), Err(EnvelopeError::InvalidHmac));
    }

    #[test]
    fn verify_with_secret_lookup() {
        let out = encode_v1(b"payload", 3, b"key-three").unwrap();

        let env = verify_with_secret(&out, |key_id| {
            (key_id == 3).then(|| b"key-three".to_vec())
        })
        .unwrap();
        assert_eq!(env.content, b"payload");

        assert_eq!(
            verify_with_secret(&out, |_| None),
            Err(EnvelopeError::UnknownKeyId(3))
        );
    }

    #[test]
    fn size_cap_enforced() {
        // Content alone over the cap.
        let big = vec![0u8; MAX_ENVELOPE_SIZE + 1];
        assert!(matches!(
            encode_v1(&big, 0, b""),
            Err(EnvelopeError::ContentTooLarge(_))
        ));

        // Content fits but header + MAC push past the cap.
        let edge = vec![0u8; MAX_ENVELOPE_SIZE - V1_HEADER_SIZE - HMAC_SIZE + 1];
        assert!(matches!(
            encode_v1(&edge, 0, b"secret"),
            Err(EnvelopeError::EnvelopeTooLarge(_))
        ));

        // Same content unsigned still fits.
        assert!(encode_v1(&edge, 0, b"").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse(b"HYR"),
            Err(EnvelopeError::InvalidEnvelope("buffer too small"))
        ));
        assert!(matches!(
            parse(b"NOPE\x01\x00\x00\x00\x00"),
            Err(EnvelopeError::InvalidEnvelope("invalid magic"))
        ));
        assert!(matches!(
            parse(b"HYRP\x02\x00\x00\x00\x00"),
            Err(EnvelopeError::InvalidEnvelope("unsupported version"))
        ));
        // Declared content length past the buffer.
        assert!(matches!(
            parse(b"HYRP\x01\x00\x00\xff\x00"),
            Err(EnvelopeError::InvalidEnvelope("invalid length"))
        ));
    }

    #[test]
    fn parsed_fields_are_owned_copies() {
        let mut buf = encode_v1(b"abc", 1, b"s").unwrap();
        let env = parse(&buf).unwrap();
        // Mutating the source buffer must not affect the envelope.
        for b in buf.iter_mut() {
            *b = 0;
        }
        assert_eq!(env.content, b"abc");
    }

    #[test]
    fn parse_ignores_trailing_bytes() {
        let mut out = encode_v1(b"abc", 1, b"s").unwrap();
        let declared = out.len();
        out.extend_from_slice(b"junk");
        let env = parse(&out).unwrap();
        assert_eq!(env.raw.len(), declared);
    }
}
