//! Bit convention handling
//!
//! The first ATR character (TS) tells the reader how bits are encoded on the
//! line. In direct convention a UART sees TS as `0x3B`. In inverse convention
//! the card sends the byte most significant bit first with inverted levels,
//! so a UART configured for direct convention reads `0x03`.

use serde::{Deserialize, Serialize};

/// TS character announcing direct convention
pub const TS_DIRECT: u8 = 0x3B;

/// TS character announcing inverse convention (after decoding)
pub const TS_INVERSE: u8 = 0x3F;

/// Bit encoding used on the I/O line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Convention {
    /// Least significant bit first, high level is one
    #[default]
    Direct,
    /// Most significant bit first, low level is one
    Inverse,
}

impl Convention {
    /// Decode a raw line byte according to this convention
    pub fn decode(self, raw: u8) -> u8 {
        match self {
            Convention::Direct => raw,
            Convention::Inverse => from_inverse(raw),
        }
    }
}

/// Undo inverse convention on a byte read in direct convention.
///
/// Reverses the bit order and complements every bit. The transform is its
/// own inverse.
pub fn from_inverse(raw: u8) -> u8 {
    !raw.reverse_bits()
}

/// Check whether a raw byte is the inverse convention TS marker
pub fn is_inverse_marker(raw: u8) -> bool {
    from_inverse(raw) == TS_INVERSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_is_involutive() {
        for b in 0..=u8::MAX {
            assert_eq!(from_inverse(from_inverse(b)), b, "byte {:#04x}", b);
        }
    }

    #[test]
    fn test_transform_matches_bitwise_definition() {
        for b in 0..=u8::MAX {
            let mut expected = 0u8;
            for i in 0..8 {
                if (b >> i) & 0x01 == 0 {
                    expected |= 1 << (7 - i);
                }
            }
            assert_eq!(from_inverse(b), expected);
        }
    }

    #[test]
    fn test_inverse_marker() {
        assert!(is_inverse_marker(0x03));
        assert!(!is_inverse_marker(TS_DIRECT));
        assert_eq!(from_inverse(0x03), TS_INVERSE);
    }

    #[test]
    fn test_decode() {
        assert_eq!(Convention::Direct.decode(0x03), 0x03);
        assert_eq!(Convention::Inverse.decode(0x03), TS_INVERSE);
        assert_eq!(Convention::Inverse.decode(0xFF), 0x00);
    }
}
