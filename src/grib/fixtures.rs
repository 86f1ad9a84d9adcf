//! Minimal simple-packing GRIB writers for tests.

use super::LevelType;

/// A field to encode as a GRIB2 message. NaN values are written as masked.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    discipline: u8,
    category: u8,
    number: u8,
    level_type: LevelType,
    level: u32,
    step_hours: u32,
    bits: u8,
    spectral: bool,
    values: Vec<f64>,
}

impl Field {
    pub(crate) fn new(short_name: &str, values: &[f64]) -> Self {
        use LevelType::*;
        let (discipline, category, number, level_type, level) = match short_name {
            "2t" => (0, 0, 0, HeightAboveGround, 2),
            "10u" => (0, 2, 2, HeightAboveGround, 10),
            "10v" => (0, 2, 3, HeightAboveGround, 10),
            "msl" => (0, 3, 1, MeanSea, 0),
            "sp" => (0, 3, 0, Surface, 0),
            "cp" => (0, 1, 10, Surface, 0),
            "ci" => (10, 2, 0, Surface, 0),
            "tcc" => (0, 6, 1, Surface, 0),
            "t" => (0, 0, 0, Hybrid, 1),
            "q" => (0, 1, 0, Hybrid, 1),
            "cc" => (0, 6, 32, Hybrid, 1),
            "clwc" => (0, 1, 83, Hybrid, 1),
            other => panic!("no fixture mapping for {}", other),
        };
        Self {
            discipline,
            category,
            number,
            level_type,
            level,
            step_hours: 6,
            bits: 16,
            spectral: false,
            values: values.to_vec(),
        }
    }

    pub(crate) fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub(crate) fn level_type(mut self, level_type: LevelType) -> Self {
        self.level_type = level_type;
        self
    }

    pub(crate) fn step(mut self, hours: u32) -> Self {
        self.step_hours = hours;
        self
    }

    pub(crate) fn bits(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }

    pub(crate) fn spectral(mut self) -> Self {
        self.spectral = true;
        self
    }

    fn surface_code(&self) -> u8 {
        match self.level_type {
            LevelType::Surface => 1,
            LevelType::EntireAtmosphere => 10,
            LevelType::Isobaric => 100,
            LevelType::MeanSea => 101,
            LevelType::HeightAboveGround => 103,
            LevelType::Hybrid => 105,
            LevelType::DepthBelowLandLayer => 106,
            LevelType::PotentialVorticity => 109,
            LevelType::Other { code, .. } => code as u8,
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let valid: Vec<f64> = self.values.iter().copied().filter(|v| !v.is_nan()).collect();
        let (reference, binary_scale, packed) = pack(&valid, self.bits);

        let mut body = Vec::new();

        // Section 1: identification.
        section(&mut body, 1, &[
            0, 98, 0, 0, 4, 0, 1, 0x07, 0xE4, 1, 1, 0, 0, 0, 0, 1,
        ]);

        // Section 3: grid definition (only point count and template are read).
        let mut s3 = vec![0u8; 67];
        s3[1..5].copy_from_slice(&(self.values.len() as u32).to_be_bytes());
        s3[7..9].copy_from_slice(&(if self.spectral { 50u16 } else { 0u16 }).to_be_bytes());
        section(&mut body, 3, &s3);

        // Section 4: product definition, template 4.0.
        let mut s4 = vec![0u8, 0, 0, 0, self.category, self.number, 2, 0, 0, 0, 0, 0, 1];
        s4.extend_from_slice(&self.step_hours.to_be_bytes());
        s4.push(self.surface_code());
        s4.push(0);
        let surface_value = if self.level_type == LevelType::Isobaric {
            self.level * 100
        } else {
            self.level
        };
        s4.extend_from_slice(&surface_value.to_be_bytes());
        s4.extend_from_slice(&[255, 0, 0, 0, 0, 0]);
        section(&mut body, 4, &s4);

        // Section 5: data representation, template 5.0.
        let mut s5 = (valid.len() as u32).to_be_bytes().to_vec();
        s5.extend_from_slice(&0u16.to_be_bytes());
        s5.extend_from_slice(&reference.to_bits().to_be_bytes());
        s5.extend_from_slice(&sign_magnitude(binary_scale));
        s5.extend_from_slice(&[0, 0, self.bits, 0]);
        section(&mut body, 5, &s5);

        // Section 6: bitmap.
        if self.values.iter().any(|v| v.is_nan()) {
            let mut s6 = vec![0u8];
            let mut bits = BitWriter::default();
            for v in &self.values {
                bits.push(u64::from(!v.is_nan()), 1);
            }
            s6.extend(bits.finish());
            section(&mut body, 6, &s6);
        } else {
            section(&mut body, 6, &[255]);
        }

        // Section 7: data.
        section(&mut body, 7, &packed);

        let total = 16 + body.len() as u64 + 4;
        let mut message = b"GRIB".to_vec();
        message.extend_from_slice(&[0, 0, self.discipline, 2]);
        message.extend_from_slice(&total.to_be_bytes());
        message.extend(body);
        message.extend_from_slice(b"7777");
        message
    }
}

fn section(out: &mut Vec<u8>, number: u8, content: &[u8]) {
    out.extend_from_slice(&(content.len() as u32 + 5).to_be_bytes());
    out.push(number);
    out.extend_from_slice(content);
}

fn sign_magnitude(value: i32) -> [u8; 2] {
    let magnitude = value.unsigned_abs() as u16;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

fn next_down(r: f32) -> f32 {
    if r > 0.0 {
        f32::from_bits(r.to_bits() - 1)
    } else if r < 0.0 {
        f32::from_bits(r.to_bits() + 1)
    } else {
        -f32::MIN_POSITIVE
    }
}

/// Simple packing with D = 0. Returns (R, E, packed bytes).
fn pack(values: &[f64], bits: u8) -> (f32, i32, Vec<u8>) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        return (0.0, 0, Vec::new());
    }
    let mut reference = min as f32;
    while f64::from(reference) > min {
        reference = next_down(reference);
    }
    let reference_f64 = f64::from(reference);

    let range = max - reference_f64;
    let binary_scale = if bits == 0 || range <= 0.0 {
        0
    } else {
        (range / ((1u64 << bits) - 1) as f64).log2().ceil() as i32
    };
    let step = 2f64.powi(binary_scale);

    let mut writer = BitWriter::default();
    if bits > 0 {
        let limit = (1u64 << bits) - 1;
        for v in values {
            let x = ((v - reference_f64) / step).round().clamp(0.0, limit as f64) as u64;
            writer.push(x, u32::from(bits));
        }
    }
    (reference, binary_scale, writer.finish())
}

#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    used: u32,
}

impl BitWriter {
    fn push(&mut self, value: u64, nbits: u32) {
        for i in (0..nbits).rev() {
            if self.used % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - self.used % 8);
            self.used += 1;
        }
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

fn ibm(value: f64) -> [u8; 4] {
    if value == 0.0 {
        return [0; 4];
    }
    let sign = if value < 0.0 { 0x80u8 } else { 0 };
    let magnitude = value.abs();
    let mut exponent = (magnitude.log2() / 4.0).floor() as i32 + 1;
    let mut mantissa = (magnitude / 16f64.powi(exponent) * f64::from(1u32 << 24)).floor() as u32;
    if mantissa >= 1 << 24 {
        exponent += 1;
        mantissa >>= 4;
    }
    let m = mantissa.to_be_bytes();
    [sign | (exponent + 64) as u8, m[1], m[2], m[3]]
}

/// GRIB1 message with table 128 parameter, no grid or bitmap section,
/// 16-bit simple packing.
pub(crate) fn grib1_message(
    parameter: u8,
    level_code: u8,
    level: u16,
    step_hours: u8,
    values: &[f64],
) -> Vec<u8> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let reference = ibm(min);
    let reference_f64 = {
        let raw = u32::from_be_bytes(reference);
        let sign = if raw & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
        let e = ((raw >> 24) & 0x7f) as i32 - 64;
        sign * f64::from(raw & 0x00ff_ffff) / f64::from(1u32 << 24) * 16f64.powi(e)
    };
    let binary_scale = ((max - reference_f64) / 65535.0).log2().ceil() as i32;
    let step = 2f64.powi(binary_scale);

    let mut data = BitWriter::default();
    for v in values {
        data.push(((v - reference_f64) / step).round() as u64, 16);
    }
    let data = data.finish();

    let level_bytes = level.to_be_bytes();
    let pds: Vec<u8> = vec![
        0, 0, 28, 128, 98, 0, 255, 0, parameter, level_code, level_bytes[0], level_bytes[1],
        20, 1, 1, 0, 0, 1, step_hours, 0, 0, 0, 0, 0, 21, 0, 0, 0,
    ];

    let bds_len = 11 + data.len();
    let mut bds = vec![(bds_len >> 16) as u8, (bds_len >> 8) as u8, bds_len as u8, 0];
    bds.extend_from_slice(&sign_magnitude(binary_scale));
    bds.extend_from_slice(&reference);
    bds.push(16);
    bds.extend(data);

    let total = 8 + pds.len() + bds.len() + 4;
    let mut message = b"GRIB".to_vec();
    message.extend_from_slice(&[(total >> 16) as u8, (total >> 8) as u8, total as u8, 1]);
    message.extend(pds);
    message.extend(bds);
    message.extend_from_slice(b"7777");
    message
}
