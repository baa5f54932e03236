// bsdiff 8-byte signed integer encoding.
//
// Sign-magnitude, little-endian: the magnitude occupies the low 63 bits and
// bit 7 of the last byte carries the sign.  This is NOT two's complement and
// must match bit-for-bit for existing patches to decode.

use std::io::{self, Write};

/// Encoded size of one offset value.
pub const OFFSET_LEN: usize = 8;

const SIGN_BIT: u64 = 1 << 63;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `value` into its 8-byte sign-magnitude form.
///
/// `i64::MIN` has no sign-magnitude representation; the encoder never
/// produces it because every value is bounded by a buffer length.
#[inline]
pub fn encode(value: i64) -> [u8; OFFSET_LEN] {
    debug_assert!(value != i64::MIN, "offset out of sign-magnitude range");
    let raw = if value < 0 {
        value.unsigned_abs() | SIGN_BIT
    } else {
        value as u64
    };
    raw.to_le_bytes()
}

/// Encode and write to a `Write` sink.
pub fn write_offset<W: Write>(w: &mut W, value: i64) -> io::Result<()> {
    w.write_all(&encode(value))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an 8-byte sign-magnitude value.
///
/// A set sign bit with zero magnitude ("negative zero") decodes to 0.
#[inline]
pub fn decode(buf: [u8; OFFSET_LEN]) -> i64 {
    let raw = u64::from_le_bytes(buf);
    let magnitude = (raw & !SIGN_BIT) as i64;
    if raw & SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_values_are_plain_little_endian() {
        assert_eq!(encode(0), [0; 8]);
        assert_eq!(encode(1), [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode(0x0102), [2, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn negative_values_set_top_bit_of_last_byte() {
        assert_eq!(encode(-1), [1, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(encode(-0x0102), [2, 1, 0, 0, 0, 0, 0, 0x80]);
        // Not two's complement.
        assert_ne!(encode(-1), (-1i64).to_le_bytes());
    }

    #[test]
    fn decode_inverts_encode_at_boundaries() {
        for v in [0, 1, -1, 255, -256, i64::MAX, -i64::MAX, 1 << 40, -(1 << 40)] {
            assert_eq!(decode(encode(v)), v, "value {v}");
        }
    }

    #[test]
    fn negative_zero_decodes_to_zero() {
        assert_eq!(decode([0, 0, 0, 0, 0, 0, 0, 0x80]), 0);
    }

    #[test]
    fn write_offset_appends_encoded_form() {
        let mut buf = Vec::new();
        write_offset(&mut buf, -42).unwrap();
        write_offset(&mut buf, 7).unwrap();
        assert_eq!(buf.len(), 2 * OFFSET_LEN);
        assert_eq!(&buf[..OFFSET_LEN], &encode(-42));
        assert_eq!(&buf[OFFSET_LEN..], &encode(7));
    }
}
