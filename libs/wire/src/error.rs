//! Error types for the wire codec.

use thiserror::Error;

/// Errors produced while encoding or decoding wire packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A length-prefixed string exceeds the caller-supplied maximum.
    #[error("string too long: {len} bytes > {max}")]
    StringTooLong { len: usize, max: usize },

    /// A referral host must carry at least one byte.
    #[error("referral host must not be empty")]
    EmptyHost,

    /// A referral host exceeds the 256-byte wire limit.
    #[error("referral host too long: {0} bytes")]
    HostTooLong(usize),

    /// Referral data exceeds the 4096-byte wire limit.
    #[error("referral data too long: {0} bytes")]
    DataTooLong(usize),

    /// A ConnectAccept password challenge exceeds 64 bytes.
    #[error("password challenge too long: {0} bytes")]
    ChallengeTooLong(usize),

    /// The payload did not decode under any supported layout.
    #[error("payload could not be decoded")]
    DecodeFailed,
}
