use crate::errors::{Error, Result};

const CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Maps a value in `0..64` to its base64 digit.
#[inline]
pub fn encode_digit(value: u8) -> u8 {
    CHARS[value as usize & 0x3f]
}

/// Maps a base64 digit back to its value.
pub fn decode_digit(digit: u8) -> Result<u8> {
    match digit {
        b'A'..=b'Z' => Ok(digit - b'A'),
        b'a'..=b'z' => Ok(digit - b'a' + 26),
        b'0'..=b'9' => Ok(digit - b'0' + 52),
        b'+' => Ok(62),
        b'/' => Ok(63),
        _ => Err(Error::invalid(format!(
            "invalid base64 character: {:?}",
            digit as char
        ))),
    }
}
