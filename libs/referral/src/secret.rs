//! Secret string decoding.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::EnvelopeError;

/// Decode a configured secret string.
///
/// A case-insensitive `base64:` or `hex:` prefix selects the decoding;
/// anything else is taken as literal bytes. Empty input is an error.
pub fn decode_secret(s: &str) -> Result<Vec<u8>, EnvelopeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(EnvelopeError::InvalidSecret("empty secret".into()));
    }
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("base64:") {
        let rest = s["base64:".len()..].trim();
        return BASE64_STANDARD
            .decode(rest)
            .map_err(|e| EnvelopeError::InvalidSecret(e.to_string()));
    }
    if lower.starts_with("hex:") {
        let rest = s["hex:".len()..].trim();
        return hex::decode(rest).map_err(|e| EnvelopeError::InvalidSecret(e.to_string()));
    }
    Ok(s.as_bytes().to_vec())
}
