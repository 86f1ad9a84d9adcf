//! Low-level octet and bit helpers shared by both GRIB editions.

/// Read a big-endian unsigned integer of `len` octets starting at `start`.
pub(crate) fn uint(bytes: &[u8], start: usize, len: usize) -> Option<u64> {
    let slice = bytes.get(start..start + len)?;
    Some(slice.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Read a sign-magnitude integer (high bit is the sign), as GRIB stores
/// scale factors.
pub(crate) fn signed(bytes: &[u8], start: usize, len: usize) -> Option<i64> {
    let raw = uint(bytes, start, len)?;
    let sign_bit = 1u64 << (len * 8 - 1);
    let magnitude = (raw & (sign_bit - 1)) as i64;
    Some(if raw & sign_bit != 0 { -magnitude } else { magnitude })
}

/// Decode an IBM System/360 single-precision float (GRIB edition 1).
pub(crate) fn ibm_f32(bytes: &[u8], start: usize) -> Option<f64> {
    let raw = uint(bytes, start, 4)? as u32;
    let sign = if raw & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((raw >> 24) & 0x7f) as i32 - 64;
    let mantissa = f64::from(raw & 0x00ff_ffff) / f64::from(1u32 << 24);
    Some(sign * mantissa * 16f64.powi(exponent))
}

/// Decode an IEEE 754 single-precision float (GRIB edition 2).
pub(crate) fn ieee_f32(bytes: &[u8], start: usize) -> Option<f64> {
    let raw = uint(bytes, start, 4)? as u32;
    Some(f64::from(f32::from_bits(raw)))
}

/// MSB-first bit cursor over a packed data section.
#[derive(Debug)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the next `nbits` bits (at most 64) as an unsigned integer.
    pub(crate) fn read(&mut self, nbits: u32) -> Option<u64> {
        if nbits == 0 {
            return Some(0);
        }
        if nbits > 64 || self.pos + nbits as usize > self.data.len() * 8 {
            return None;
        }

        let mut value = 0u64;
        let mut remaining = nbits;
        while remaining > 0 {
            let byte = self.data[self.pos / 8];
            let offset = (self.pos % 8) as u32;
            let available = 8 - offset;
            let take = available.min(remaining);
            let shift = available - take;
            let mask = ((1u16 << take) - 1) as u8;
            value = (value << take) | u64::from((byte >> shift) & mask);
            self.pos += take as usize;
            remaining -= take;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_unaligned_bit_groups() {
        let data = [0b1011_0011, 0b0101_1100];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(3), Some(0b101));
        assert_eq!(reader.read(7), Some(0b1_0011_01));
        assert_eq!(reader.read(6), Some(0b01_1100));
        assert_eq!(reader.read(1), None);
    }

    #[test]
    fn sign_magnitude_scale_factors() {
        assert_eq!(signed(&[0x80, 0x03], 0, 2), Some(-3));
        assert_eq!(signed(&[0x00, 0x03], 0, 2), Some(3));
        assert_eq!(signed(&[0x81], 0, 1), Some(-1));
    }

    #[test]
    fn ibm_float_values() {
        // 0x4110_0000 = 1/16 * 16^1 = 1.0
        assert_eq!(ibm_f32(&[0x41, 0x10, 0x00, 0x00], 0), Some(1.0));
        // 0xC276_A000 = -118.625
        assert_eq!(ibm_f32(&[0xC2, 0x76, 0xA0, 0x00], 0), Some(-118.625));
        assert_eq!(ibm_f32(&[0, 0, 0, 0], 0), Some(0.0));
    }

    #[test]
    fn ieee_float_values() {
        let bytes = 2.5f32.to_bits().to_be_bytes();
        assert_eq!(ieee_f32(&bytes, 0), Some(2.5));
    }
}
