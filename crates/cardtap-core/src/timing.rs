//! Speed negotiation math
//!
//! Maps the Fi/Di pair carried in TA1 or PPS1 to an elementary time unit
//! and to the baud rate a UART must use to keep sampling the line.
//!
//! Tables follow ISO/IEC 7816-3:2006 section 8.3, tables 7 and 8.

use serde::{Deserialize, Serialize};

/// Clock rate conversion factor used before any negotiation (Fd)
pub const DEFAULT_CLOCK_CONVERSION: u32 = 372;

/// Baud rate adjustment factor used before any negotiation (Dd)
pub const DEFAULT_BAUD_DIVISOR: u32 = 1;

/// Elementary time unit, in clock ticks, of the default Fd/Dd pair
pub const BASE_ETU: u32 = DEFAULT_CLOCK_CONVERSION / DEFAULT_BAUD_DIVISOR;

/// Speed byte equivalent to the default Fd/Dd pair
pub const DEFAULT_SPEED: u8 = 0x11;

/// Highest base rate accepted for a session (a 372 MHz clock)
pub const MAX_BASE_BAUD_RATE: u32 = 1_000_000;

/// Clock rate conversion factor Fi, from the high nibble of a speed byte
pub fn clock_conversion(speed: u8) -> u32 {
    match speed >> 4 {
        0x2 => 558,
        0x3 => 744,
        0x4 => 1116,
        0x5 => 1488,
        0x6 => 1860,
        0x9 => 512,
        0xA => 768,
        0xB => 1024,
        0xC => 1536,
        0xD => 2048,
        _ => DEFAULT_CLOCK_CONVERSION,
    }
}

/// Baud rate adjustment factor Di, from the low nibble of a speed byte
pub fn baud_divisor(speed: u8) -> u32 {
    match speed & 0x0F {
        0x2 => 2,
        0x3 => 4,
        0x4 => 8,
        0x5 => 16,
        0x6 => 32,
        0x7 => 64,
        0x8 => 12,
        0x9 => 20,
        _ => DEFAULT_BAUD_DIVISOR,
    }
}

/// Maximum card clock frequency in kHz for the Fi code of a speed byte.
///
/// Returns `None` for reserved codes.
pub fn max_clock_khz(speed: u8) -> Option<u32> {
    match speed >> 4 {
        0x0 => Some(4_000),
        0x1 => Some(5_000),
        0x2 => Some(6_000),
        0x3 => Some(8_000),
        0x4 => Some(12_000),
        0x5 => Some(16_000),
        0x6 => Some(20_000),
        0x9 => Some(5_000),
        0xA => Some(7_500),
        0xB => Some(10_000),
        0xC => Some(15_000),
        0xD => Some(20_000),
        _ => None,
    }
}

/// Elementary time unit in clock ticks for a speed byte
pub fn etu_ticks(speed: u8) -> u32 {
    clock_conversion(speed) / baud_divisor(speed)
}

/// Baud rate to sample the line at after switching to `speed`.
///
/// `base_baud` is the rate matching the default ETU of 372 ticks. The
/// division is done in floating point and truncated, which is how baud
/// generators round. Results beyond `u32::MAX` saturate; sessions keep
/// `base_baud` at or below [`MAX_BASE_BAUD_RATE`] so every speed byte fits.
pub fn baud_rate(base_baud: u32, speed: u8) -> u32 {
    let etu = etu_ticks(speed);
    let scaled = u64::from(base_baud) * u64::from(BASE_ETU);
    (scaled as f64 / f64::from(etu)) as u32
}

/// A baud rate change resulting from a negotiated speed byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedChange {
    /// New elementary time unit in clock ticks
    pub etu_ticks: u32,
    /// New baud rate
    pub baud_rate: u32,
}

/// Compute the change needed to follow a negotiated speed byte.
///
/// Returns `None` when the line already runs at the resulting rate.
pub fn speed_change(base_baud: u32, current_baud: u32, speed: u8) -> Option<SpeedChange> {
    let baud_rate = baud_rate(base_baud, speed);
    if baud_rate == current_baud {
        return None;
    }
    Some(SpeedChange {
        etu_ticks: etu_ticks(speed),
        baud_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_max_base_rate_never_saturates() {
        let fastest = (0..=u8::MAX).map(|speed| baud_rate(MAX_BASE_BAUD_RATE, speed)).max();
        // Fi 372 over Di 64 gives the shortest ETU, 5 ticks
        assert_eq!(etu_ticks(0x17), 5);
        assert_eq!(fastest, Some(74_400_000));
        assert_eq!(baud_rate(100_000_000, 0x17), u32::MAX);
    }

    #[test]
    fn test_clock_conversion_table() {
        let expected: [u32; 16] = [
            372, 372, 558, 744, 1116, 1488, 1860, 372, 372, 512, 768, 1024, 1536, 2048, 372, 372,
        ];
        for (nibble, fi) in expected.iter().enumerate() {
            let speed = (nibble as u8) << 4;
            assert_eq!(clock_conversion(speed), *fi, "Fi code {:X}", nibble);
            // Low nibble must not matter
            assert_eq!(clock_conversion(speed | 0x0F), *fi);
        }
    }

    #[test]
    fn test_baud_divisor_table() {
        let expected: [u32; 16] = [1, 1, 2, 4, 8, 16, 32, 64, 12, 20, 1, 1, 1, 1, 1, 1];
        for (nibble, di) in expected.iter().enumerate() {
            assert_eq!(baud_divisor(nibble as u8), *di, "Di code {:X}", nibble);
            assert_eq!(baud_divisor(0xF0 | nibble as u8), *di);
        }
    }

    #[test]
    fn test_etu_ticks() {
        assert_eq!(etu_ticks(DEFAULT_SPEED), 372);
        assert_eq!(etu_ticks(0x13), 93);
        assert_eq!(etu_ticks(0x18), 31);
        assert_eq!(etu_ticks(0x96), 16);
    }

    #[test]
    fn test_baud_rate() {
        assert_eq!(baud_rate(9600, DEFAULT_SPEED), 9600);
        assert_eq!(baud_rate(9600, 0x13), 38400);
        assert_eq!(baud_rate(9600, 0x18), 115200);
        assert_eq!(baud_rate(9600, 0x96), 223200);
    }

    #[test]
    fn test_baud_rate_truncates() {
        assert_eq!(baud_rate(9600, 0x21), 6400);
        // 9999 * 372 / 1860 = 1999.8
        assert_eq!(baud_rate(9999, 0x61), 1999);
    }

    #[test]
    fn test_speed_change_skips_current_rate() {
        assert_eq!(speed_change(9600, 9600, DEFAULT_SPEED), None);
        assert_eq!(
            speed_change(9600, 9600, 0x13),
            Some(SpeedChange {
                etu_ticks: 93,
                baud_rate: 38400
            })
        );
        assert_eq!(speed_change(9600, 38400, 0x13), None);
    }

    #[test]
    fn test_max_clock() {
        assert_eq!(max_clock_khz(0x11), Some(5_000));
        assert_eq!(max_clock_khz(0x96), Some(5_000));
        assert_eq!(max_clock_khz(0x71), None);
        assert_eq!(max_clock_khz(0xF1), None);
    }
}
