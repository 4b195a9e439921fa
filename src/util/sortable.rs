//! Order-preserving serialisation of numbers.
//!
//! Value slots compare as raw bytes. [`sortable_serialise`] encodes an `f64`
//! so that comparing the encodings byte-wise gives the same order as
//! comparing the numbers, which lets numeric values take part in value
//! sorting, collapsing and `VALUE_RANGE` filters.

/// Encode `value` so that byte order matches numeric order.
///
/// Positive numbers get their sign bit set, negative numbers have every bit
/// inverted; the result is big-endian with trailing zero bytes removed.
/// `-0.0` encodes like `0.0`. NaN has no meaningful position.
pub fn sortable_serialise(value: f64) -> Vec<u8> {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let key = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };

    let mut bytes = key.to_be_bytes().to_vec();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

/// Decode a value produced by [`sortable_serialise`].
///
/// Input longer than eight bytes is truncated; shorter input is padded with
/// zero bytes.
pub fn sortable_unserialise(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);

    let key = u64::from_be_bytes(buf);
    let bits = if key >> 63 == 1 { key & !(1 << 63) } else { !key };
    f64::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_preserved() {
        let values = [
            f64::NEG_INFINITY,
            -1e300,
            -42.5,
            -1.0,
            -1e-300,
            0.0,
            1e-300,
            0.5,
            1.0,
            2.0,
            42.5,
            1e300,
            f64::INFINITY,
        ];
        for pair in values.windows(2) {
            let a = sortable_serialise(pair[0]);
            let b = sortable_serialise(pair[1]);
            assert!(a < b, "{} should sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_decodes_what_it_encodes() {
        for &value in &[-3.25, 0.0, 1.0, 7.0, 1e10, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(sortable_unserialise(&sortable_serialise(value)), value);
        }
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(sortable_serialise(-0.0), sortable_serialise(0.0));
        assert_eq!(sortable_serialise(0.0), vec![0x80]);
    }
}
