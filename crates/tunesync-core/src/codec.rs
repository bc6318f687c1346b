//! Wire value codec
//!
//! Converts fixed-width integers from the serial protocol to and from
//! engineering units via an affine transform.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

/// Integer types used on the wire by MegaSquirt-compatible firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireType {
    /// Unsigned 8-bit integer
    U08,
    /// Signed 8-bit integer
    S08,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 16-bit integer
    S16,
}

impl WireType {
    /// Number of bytes one element occupies on the wire
    pub fn byte_width(&self) -> usize {
        match self {
            WireType::U08 | WireType::S08 => 1,
            WireType::U16 | WireType::S16 => 2,
        }
    }
}

/// Decode a raw wire value into engineering units: `(raw + add) * mult`
///
/// 16-bit values are big-endian; signed variants are sign-extended.
/// `bytes` must hold at least `ty.byte_width()` bytes.
pub fn decode(ty: WireType, bytes: &[u8], add: f64, mult: f64) -> f64 {
    let raw = match ty {
        WireType::U08 => bytes[0] as f64,
        WireType::S08 => bytes[0] as i8 as f64,
        WireType::U16 => BigEndian::read_u16(bytes) as f64,
        WireType::S16 => BigEndian::read_i16(bytes) as f64,
    };
    (raw + add) * mult
}

/// Encode an engineering-unit value back into its wire form:
/// `raw = value / mult - add`, packed big-endian.
///
/// Truncation to the target width is deliberately unchecked. The firmware
/// defines calibration data to be in range, and the fixed-width wire format
/// has no way to signal overflow.
pub fn encode(ty: WireType, value: f64, add: f64, mult: f64) -> Vec<u8> {
    let raw = value / mult - add;
    match ty {
        WireType::U08 => vec![raw as u8],
        WireType::S08 => vec![raw as i8 as u8],
        WireType::U16 => {
            let mut buf = vec![0u8; 2];
            BigEndian::write_u16(&mut buf, raw as u16);
            buf
        }
        WireType::S16 => {
            let mut buf = vec![0u8; 2];
            BigEndian::write_i16(&mut buf, raw as i16);
            buf
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_widths() {
        assert_eq!(WireType::U08.byte_width(), 1);
        assert_eq!(WireType::S08.byte_width(), 1);
        assert_eq!(WireType::U16.byte_width(), 2);
        assert_eq!(WireType::S16.byte_width(), 2);
    }

    #[test]
    fn test_decode_u16_big_endian() {
        assert_eq!(decode(WireType::U16, &[0x01, 0x2C], 0.0, 1.0), 300.0);
    }

    #[test]
    fn test_encode_u16_big_endian() {
        assert_eq!(encode(WireType::U16, 300.0, 0.0, 1.0), vec![0x01, 0x2C]);
    }

    #[test]
    fn test_decode_sign_extension() {
        assert_eq!(decode(WireType::S16, &[0xFF, 0xFF], 0.0, 1.0), -1.0);
        assert_eq!(decode(WireType::S08, &[0x80], 0.0, 1.0), -128.0);
        // The unsigned variants must not sign-extend
        assert_eq!(decode(WireType::U16, &[0xFF, 0xFF], 0.0, 1.0), 65535.0);
        assert_eq!(decode(WireType::U08, &[0x80], 0.0, 1.0), 128.0);
    }

    #[test]
    fn test_affine_transform() {
        // S16 raw -100 scaled by 0.1 -> -10.0 degrees
        assert!((decode(WireType::S16, &[0xFF, 0x9C], 0.0, 0.1) - (-10.0)).abs() < 1e-9);
        // temperature style: (raw + add) * mult
        let v = decode(WireType::S16, &[0x02, 0x00], -320.0, 0.05555);
        assert!((v - (512.0 - 320.0) * 0.05555).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_all_types() {
        let cases: [(WireType, f64, f64, f64); 4] = [
            (WireType::U08, 1.0, 0.0, 205.0),
            (WireType::S08, 1.0, 0.0, -17.0),
            (WireType::U16, 1.0, 0.0, 6500.0),
            (WireType::S16, 0.1, 0.0, -25.5),
        ];
        for (ty, mult, add, value) in cases {
            let bytes = encode(ty, value, add, mult);
            assert_eq!(bytes.len(), ty.byte_width());
            let back = decode(ty, &bytes, add, mult);
            assert!(
                (back - value).abs() < 1e-6,
                "{:?}: {} != {}",
                ty,
                back,
                value
            );
        }
    }
}
