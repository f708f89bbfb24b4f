use std::io::Write;

use crate::base64;
use crate::errors::{Error, Result};

/// Writes one signed value as Base64 VLQ digits.
///
/// The sign lands in the lowest bit, then the magnitude is split into 5-bit
/// groups from least significant up, each group carrying a continuation bit
/// while more follow.
pub fn encode<W: Write>(out: &mut W, value: i64) -> Result<()> {
    let mut num = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (num & 0x1f) as u8;
        num >>= 5;
        if num > 0 {
            digit |= 0x20;
        }
        out.write_all(&[base64::encode_digit(digit)])?;
        if num == 0 {
            break;
        }
    }
    Ok(())
}

/// Parses every VLQ value in one comma-free mappings segment.
pub fn parse_segment(segment: &str) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    let mut cur = 0u64;
    let mut shift = 0u32;

    for &byte in segment.as_bytes() {
        let digit = base64::decode_digit(byte)? as u64;
        if shift >= 64 {
            return Err(Error::invalid("vlq value overflow"));
        }
        cur |= (digit & 0x1f) << shift;
        shift += 5;
        if digit & 0x20 == 0 {
            let value = (cur >> 1) as i64;
            values.push(if cur & 1 != 0 { -value } else { value });
            cur = 0;
            shift = 0;
        }
    }

    if shift != 0 {
        return Err(Error::invalid("truncated vlq value"));
    }
    if values.is_empty() {
        return Err(Error::invalid("empty mappings segment"));
    }
    Ok(values)
}
