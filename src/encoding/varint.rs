//! # Variable-Length Integers
//!
//! Length prefixes in encoded rows. A leading marker byte says how many
//! bytes follow:
//!
//! | Value Range              | Bytes | Format                           |
//! |--------------------------|-------|----------------------------------|
//! | 0 - 240                  | 1     | `[value]`                        |
//! | 241 - 2287               | 2     | `[241 + (v-240)>>8, (v-240)&FF]` |
//! | 2288 - 67823             | 3     | `[249, (v-2288)>>8, (v-2288)&FF]`|
//! | 67824 - 16777215         | 4     | `[250, v>>16, v>>8, v]`          |
//! | 16777216 - 4294967295    | 5     | `[251, v>>24, v>>16, v>>8, v]`   |
//! | larger                   | 9     | `[255, 8-byte big-endian]`       |
//!
//! Markers 252-254 are invalid. Column lengths in a row are almost always
//! below 241, so most prefixes cost one byte.
//!
//! ```rust
//! use twinslot::encoding::varint::{get_varint, put_varint, varint_len};
//!
//! let mut buf = Vec::new();
//! put_varint(&mut buf, 1000);
//! assert_eq!(buf.len(), varint_len(1000));
//! assert_eq!(get_varint(&buf).unwrap(), (1000, 2));
//! ```

use eyre::{bail, ensure, Result};

const ONE_BYTE_MAX: u64 = 240;
const TWO_BYTE_MAX: u64 = 2287;
const THREE_BYTE_MAX: u64 = 67823;
const FOUR_BYTE_MAX: u64 = 0xFF_FFFF;
const FIVE_BYTE_MAX: u64 = 0xFFFF_FFFF;

pub fn varint_len(value: u64) -> usize {
    match value {
        0..=ONE_BYTE_MAX => 1,
        0..=TWO_BYTE_MAX => 2,
        0..=THREE_BYTE_MAX => 3,
        0..=FOUR_BYTE_MAX => 4,
        0..=FIVE_BYTE_MAX => 5,
        _ => 9,
    }
}

/// Appends the encoding of `value` to `out`.
pub fn put_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=ONE_BYTE_MAX => out.push(value as u8),
        0..=TWO_BYTE_MAX => {
            let v = value - (ONE_BYTE_MAX + 1);
            out.extend_from_slice(&[241 + (v >> 8) as u8, v as u8]);
        }
        0..=THREE_BYTE_MAX => {
            let v = value - (TWO_BYTE_MAX + 1);
            out.extend_from_slice(&[249, (v >> 8) as u8, v as u8]);
        }
        0..=FOUR_BYTE_MAX => {
            out.push(250);
            out.extend_from_slice(&value.to_be_bytes()[5..]);
        }
        0..=FIVE_BYTE_MAX => {
            out.push(251);
            out.extend_from_slice(&value.to_be_bytes()[4..]);
        }
        _ => {
            out.push(255);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Decodes one varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn get_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let Some(&marker) = buf.first() else {
        bail!("empty buffer for varint decode");
    };
    let width = match marker {
        0..=240 => return Ok((marker as u64, 1)),
        241..=248 => 2,
        249 => 3,
        250 => 4,
        251 => 5,
        255 => 9,
        _ => bail!("invalid varint marker: {}", marker),
    };
    ensure!(buf.len() >= width, "truncated {}-byte varint", width);

    let tail = &buf[1..width];
    let value = match marker {
        241..=248 => ONE_BYTE_MAX + 1 + (((marker - 241) as u64) << 8) + tail[0] as u64,
        249 => TWO_BYTE_MAX + 1 + ((tail[0] as u64) << 8) + tail[1] as u64,
        _ => tail.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
    };
    Ok((value, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARIES: [u64; 13] = [
        0,
        1,
        240,
        241,
        2287,
        2288,
        67823,
        67824,
        0xFF_FFFF,
        0x100_0000,
        0xFFFF_FFFF,
        0x1_0000_0000,
        u64::MAX,
    ];

    #[test]
    fn boundaries_use_expected_width() {
        let widths = [1, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 9, 9];
        for (&value, &width) in BOUNDARIES.iter().zip(widths.iter()) {
            let mut buf = Vec::new();
            put_varint(&mut buf, value);
            assert_eq!(buf.len(), width, "width for {}", value);
            assert_eq!(varint_len(value), width);
            assert_eq!(get_varint(&buf).unwrap(), (value, width), "decode {}", value);
        }
    }

    #[test]
    fn two_byte_layout() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 2287);
        assert_eq!(buf, [248, 255]);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        assert_eq!(get_varint(&[7, 99, 99]).unwrap(), (7, 1));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(get_varint(&[]).is_err());
        assert!(get_varint(&[241]).is_err());
        assert!(get_varint(&[251, 0, 0, 0]).is_err());
        for marker in 252..=254u8 {
            assert!(get_varint(&[marker, 0, 0, 0, 0]).is_err());
        }
    }
}
