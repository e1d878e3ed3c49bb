//! Hex helpers
//!
//! Scenarios, AIDs and communication logs all carry bytes as uppercase hex.
//! These helpers keep the encoding in one place.

use bytes::Bytes;

use crate::Error;

/// Shortest AID accepted, in hex characters (5 bytes)
pub const MIN_AID_HEX_LEN: usize = 10;

/// Longest AID accepted, in hex characters (16 bytes)
pub const MAX_AID_HEX_LEN: usize = 32;

/// Encode bytes as an uppercase hex string without separators
pub fn encode_upper(data: impl AsRef<[u8]>) -> String {
    ::hex::encode_upper(data)
}

/// Decode a hex string, ignoring ASCII whitespace and accepting either case
pub fn parse_hex(input: &str) -> Result<Bytes, Error> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(Error::invalid_hex(input, "odd number of digits"));
    }
    ::hex::decode(&cleaned)
        .map(Bytes::from)
        .map_err(|_| Error::invalid_hex(input, "non-hex character"))
}

/// Check whether `aid` is a valid application identifier
///
/// Valid AIDs are made of hex digits only, have an even length and are
/// between [`MIN_AID_HEX_LEN`] and [`MAX_AID_HEX_LEN`] characters long.
pub fn is_valid_aid(aid: &str) -> bool {
    (MIN_AID_HEX_LEN..=MAX_AID_HEX_LEN).contains(&aid.len())
        && aid.len() % 2 == 0
        && aid.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate `aid` and return it in its canonical uppercase form
pub fn normalize_aid(aid: &str) -> Result<String, Error> {
    let trimmed = aid.trim();
    if is_valid_aid(trimmed) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(Error::InvalidAid(aid.to_string()))
    }
}
