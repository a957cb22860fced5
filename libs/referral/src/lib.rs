//! Signed referral envelope format.
//!
//! Referral content travels inside a small fixed container:
//!
//! ```text
//! "HYRP" | version=1 | flags | key_id | content_len: u16le | content | [hmac]
//! ```
//!
//! Flag bit 0 marks an HMAC-SHA-256 signature computed over everything
//! before the trailing MAC. The whole envelope is capped at 4096 bytes.
//! Secrets are configured as strings with an optional `base64:` or `hex:`
//! prefix selecting their decoding.

mod envelope;
mod secret;

pub use envelope::{encode_v1, parse, verify, verify_with_secret, Envelope, ENVELOPE_VERSION_V1};
pub use secret::decode_secret;

use thiserror::Error;

/// Errors produced while encoding, parsing or verifying envelopes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Content alone exceeds the envelope cap.
    #[error("content too large: {0} bytes")]
    ContentTooLarge(usize),

    /// Header + content + MAC exceed the envelope cap.
    #[error("envelope too large: {0} bytes")]
    EnvelopeTooLarge(usize),

    /// The buffer is not a well-formed v1 envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Verification requires the signed flag.
    #[error("envelope is not signed")]
    UnsignedEnvelope,

    /// No secret is registered for the envelope's key id.
    #[error("unknown key id {0}")]
    UnknownKeyId(u8),

    /// The recomputed MAC does not match the trailing MAC.
    #[error("invalid hmac")]
    InvalidHmac,

    /// A configured secret string failed to decode.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
}
