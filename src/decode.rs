//! Numeric token decoding for log fields
//!
//! Register and address values are printed by the kernel as `0x`-prefixed
//! hexadecimal; thread ids and sequence counters as plain decimal.

use crate::error::{DecodeError, DecodeErrorKind};

/// Decode a `0x`-prefixed hexadecimal token (e.g. `0x41fffc60`)
pub fn parse_hex(token: &str) -> Result<u64, DecodeError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .ok_or_else(|| DecodeError::new(token, DecodeErrorKind::MissingPrefix))?;

    if digits.is_empty() {
        return Err(DecodeError::new(token, DecodeErrorKind::Empty));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::new(token, DecodeErrorKind::Invalid));
    }

    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::new(token, DecodeErrorKind::Invalid))
}

/// Decode an unsigned decimal token (thread ids, sequence numbers)
pub fn parse_dec(token: &str) -> Result<u64, DecodeError> {
    if token.is_empty() {
        return Err(DecodeError::new(token, DecodeErrorKind::Empty));
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::new(token, DecodeErrorKind::Invalid));
    }

    token
        .parse::<u64>()
        .map_err(|_| DecodeError::new(token, DecodeErrorKind::Invalid))
}
