//! Record header parsing and field extraction.

use super::bits::{ibm_f32, ieee_f32, signed, uint, BitReader};
use super::message::RawMessage;
use super::params::{grib1_short_name, grib2_short_name, LevelType};
use crate::error::{CrosscheckError, Result};
use std::ops::Range;

/// Forecast step range of a record, in seconds since the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRange {
    /// Start of the range.
    pub start: i64,
    /// End of the range; equals `start` for instantaneous fields.
    pub end: i64,
}

impl StepRange {
    /// Token used to group records into logical steps: the end of the range.
    pub fn token(&self) -> i64 {
        self.end
    }

    /// End of the range in whole hours.
    pub fn end_hours(&self) -> i64 {
        self.end / 3600
    }
}

/// Metadata available without unpacking the field.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    /// GRIB edition.
    pub edition: u8,
    /// ecCodes-style short name (`2t`, `q`, ...).
    pub short_name: String,
    /// Level value (hPa for isobaric levels).
    pub level: i64,
    /// Level type.
    pub level_type: LevelType,
    /// Forecast step range.
    pub step: StepRange,
    /// Bits per packed value.
    pub bits_per_value: u32,
    /// Packing reference value R.
    pub reference_value: f64,
    /// Whether the field is stored as spherical-harmonic coefficients.
    pub spectral: bool,
    /// Number of grid points (including masked ones).
    pub num_points: usize,
}

/// A fully unpacked record.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    /// Header the values were unpacked with.
    pub header: RecordHeader,
    /// Field values in grid order; masked points are NaN.
    pub values: Vec<f64>,
    /// Smallest finite value (NaN when the field has none).
    pub minimum: f64,
    /// Largest finite value (NaN when the field has none).
    pub maximum: f64,
}

impl DecodedRecord {
    /// Quantization step implied by the value range and bit width.
    pub fn resolution(&self) -> f64 {
        (self.maximum - self.minimum) / 2f64.powi(self.header.bits_per_value as i32)
    }
}

#[derive(Debug, Clone)]
struct Packing {
    reference: f64,
    binary_scale: i32,
    decimal_scale: i32,
    nbits: u32,
    data: Range<usize>,
    bitmap: Option<Range<usize>>,
    num_points: usize,
    unsupported: Option<String>,
}

/// One message with its header parsed. Unpacking is deferred to [`decode`].
///
/// [`decode`]: GribRecord::decode
#[derive(Debug, Clone)]
pub struct GribRecord {
    message: RawMessage,
    header: RecordHeader,
    packing: Packing,
}

impl GribRecord {
    /// Parse the header of a framed message.
    pub fn parse(message: RawMessage) -> Result<Self> {
        let (header, packing) = match message.edition {
            1 => parse_edition1(&message.bytes),
            2 => parse_edition2(&message.bytes),
            other => Err(format!("unsupported edition {}", other)),
        }
        .map_err(|reason| CrosscheckError::decode(message.offset, reason))?;

        Ok(Self {
            message,
            header,
            packing,
        })
    }

    /// Parsed header.
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// Byte offset of the message in its stream.
    pub fn offset(&self) -> u64 {
        self.message.offset
    }

    /// The message bytes, unchanged.
    pub fn bytes(&self) -> &[u8] {
        &self.message.bytes
    }

    /// Unpack the field values.
    pub fn decode(&self) -> Result<DecodedRecord> {
        let values = unpack(&self.message.bytes, &self.packing)
            .map_err(|e| match e {
                Unpack::Unsupported(what) => CrosscheckError::UnsupportedPacking(format!(
                    "{} ({})",
                    what, self.header.short_name
                )),
                Unpack::Short => {
                    CrosscheckError::decode(self.message.offset, "data section too short")
                }
            })?;

        let (minimum, maximum) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((f64::NAN, f64::NAN));

        Ok(DecodedRecord {
            header: self.header.clone(),
            values,
            minimum,
            maximum,
        })
    }
}

enum Unpack {
    Unsupported(String),
    Short,
}

fn unpack(bytes: &[u8], packing: &Packing) -> std::result::Result<Vec<f64>, Unpack> {
    if let Some(reason) = &packing.unsupported {
        return Err(Unpack::Unsupported(reason.clone()));
    }

    let data = bytes.get(packing.data.clone()).ok_or(Unpack::Short)?;
    let binary = 2f64.powi(packing.binary_scale);
    let decimal = 10f64.powi(-packing.decimal_scale);
    let mut values = BitReader::new(data);
    let mut next = || -> std::result::Result<f64, Unpack> {
        let x = values.read(packing.nbits).ok_or(Unpack::Short)?;
        Ok((packing.reference + x as f64 * binary) * decimal)
    };

    match &packing.bitmap {
        None => (0..packing.num_points).map(|_| next()).collect(),
        Some(range) => {
            let mut mask = BitReader::new(bytes.get(range.clone()).ok_or(Unpack::Short)?);
            (0..packing.num_points)
                .map(|_| match mask.read(1) {
                    Some(1) => next(),
                    Some(_) => Ok(f64::NAN),
                    None => Err(Unpack::Short),
                })
                .collect()
        }
    }
}

/// Seconds per unit of `indicatorOfUnitOfTimeRange`. GRIB1 code table 4
/// and GRIB2 code table 4.4 agree up to code 12 and disagree after it.
fn seconds_per_unit(edition: u8, unit: u8) -> std::result::Result<i64, String> {
    match (edition, unit) {
        (_, 0) => Ok(60),
        (_, 1) => Ok(3600),
        (_, 2) => Ok(86_400),
        (_, 10) => Ok(3 * 3600),
        (_, 11) => Ok(6 * 3600),
        (_, 12) => Ok(12 * 3600),
        (1, 13) => Ok(15 * 60),
        (1, 14) => Ok(30 * 60),
        (1, 254) | (2, 13) => Ok(1),
        (_, other) => Err(format!("unsupported time unit {}", other)),
    }
}

fn octet(bytes: &[u8], index: usize) -> std::result::Result<u8, String> {
    bytes
        .get(index)
        .copied()
        .ok_or_else(|| format!("message too short at octet {}", index + 1))
}

fn field<T>(value: Option<T>, what: &str) -> std::result::Result<T, String> {
    value.ok_or_else(|| format!("message too short reading {}", what))
}

fn parse_edition1(b: &[u8]) -> std::result::Result<(RecordHeader, Packing), String> {
    // Section 1: product definition.
    let pds = 8;
    let pds_len = field(uint(b, pds, 3), "PDS length")? as usize;
    let table_version = octet(b, pds + 3)?;
    let flag = octet(b, pds + 7)?;
    let parameter = octet(b, pds + 8)?;
    let level_code = octet(b, pds + 9)?;
    let level = match level_code {
        // Layers carry top and bottom in one octet each; keep the top.
        101 | 104 | 106 | 108 | 110 | 112 | 114 | 116 | 120 | 121 | 128 | 141 => {
            i64::from(octet(b, pds + 10)?)
        }
        _ => field(uint(b, pds + 10, 2), "level")? as i64,
    };
    let unit = seconds_per_unit(1, octet(b, pds + 17)?)?;
    let p1 = i64::from(octet(b, pds + 18)?);
    let p2 = i64::from(octet(b, pds + 19)?);
    let step = match octet(b, pds + 20)? {
        2..=5 => StepRange {
            start: p1 * unit,
            end: p2 * unit,
        },
        10 => {
            let p = ((p1 << 8) | p2) * unit;
            StepRange { start: p, end: p }
        }
        _ => StepRange {
            start: p1 * unit,
            end: p1 * unit,
        },
    };
    let decimal_scale = if pds_len >= 28 {
        field(signed(b, pds + 26, 2), "decimal scale")? as i32
    } else {
        0
    };

    let mut cursor = pds + pds_len;

    // Section 2: grid description.
    let mut spectral = false;
    let mut grid_points = None;
    if flag & 0x80 != 0 {
        let gds = cursor;
        let gds_len = field(uint(b, gds, 3), "GDS length")? as usize;
        let nv = usize::from(octet(b, gds + 3)?);
        let pvl = usize::from(octet(b, gds + 4)?);
        let representation = octet(b, gds + 5)?;
        spectral = matches!(representation, 50 | 60 | 70 | 80);
        if !spectral {
            let ni = field(uint(b, gds + 6, 2), "Ni")? as usize;
            let nj = field(uint(b, gds + 8, 2), "Nj")? as usize;
            grid_points = if ni != 0xFFFF {
                Some(ni * nj)
            } else if pvl != 255 && pvl != 0 {
                // Reduced grid: points per row follow the vertical coordinates.
                let pl = gds + pvl - 1 + 4 * nv;
                let mut total = 0usize;
                for row in 0..nj {
                    total += field(uint(b, pl + 2 * row, 2), "pl")? as usize;
                }
                Some(total)
            } else {
                None
            };
        }
        cursor += gds_len;
    }

    // Section 3: bitmap.
    let mut bitmap = None;
    let mut bitmap_points = None;
    let mut unsupported = None;
    if flag & 0x40 != 0 {
        let bms = cursor;
        let bms_len = field(uint(b, bms, 3), "BMS length")? as usize;
        let unused = usize::from(octet(b, bms + 3)?);
        let bits = bms_len
            .checked_sub(6)
            .and_then(|n| (n * 8).checked_sub(unused.min(7)))
            .ok_or_else(|| format!("BMS length {} too short", bms_len))?;
        if field(uint(b, bms + 4, 2), "bitmap table")? != 0 {
            unsupported = Some("predefined bitmap".to_string());
        }
        bitmap = Some(bms + 6..bms + bms_len);
        bitmap_points = Some(bits);
        cursor += bms_len;
    }

    // Section 4: binary data.
    let bds = cursor;
    let bds_len = field(uint(b, bds, 3), "BDS length")? as usize;
    let bds_flag = octet(b, bds + 3)?;
    let binary_scale = field(signed(b, bds + 4, 2), "binary scale")? as i32;
    let reference = ibm_f32(b, bds + 6).ok_or("message too short reading R")?;
    let nbits = u32::from(octet(b, bds + 10)?);
    let unused_bits = usize::from(bds_flag & 0x0f);

    if bds_flag & 0x80 != 0 {
        spectral = true;
        unsupported.get_or_insert_with(|| "spherical harmonics".to_string());
    }
    if bds_flag & 0x40 != 0 {
        unsupported.get_or_insert_with(|| "second-order packing".to_string());
    }

    let packed = if nbits > 0 {
        Some(((bds_len.saturating_sub(11)) * 8).saturating_sub(unused_bits) / nbits as usize)
    } else {
        None
    };
    let num_points = bitmap_points.or(grid_points).or(packed).unwrap_or(0);

    let header = RecordHeader {
        edition: 1,
        short_name: grib1_short_name(table_version, parameter),
        level,
        level_type: LevelType::from_grib1(level_code),
        step,
        bits_per_value: nbits,
        reference_value: reference,
        spectral,
        num_points,
    };
    let packing = Packing {
        reference,
        binary_scale,
        decimal_scale,
        nbits,
        data: bds + 11..bds + bds_len,
        bitmap,
        num_points,
        unsupported,
    };
    Ok((header, packing))
}

fn parse_edition2(b: &[u8]) -> std::result::Result<(RecordHeader, Packing), String> {
    let discipline = octet(b, 6)?;
    let mut sections: [Option<usize>; 8] = [None; 8];
    let mut cursor = 16;
    while cursor + 4 <= b.len() && &b[cursor..cursor + 4] != b"7777" {
        let len = field(uint(b, cursor, 4), "section length")? as usize;
        let number = usize::from(octet(b, cursor + 4)?);
        if len < 5 {
            return Err(format!("section {} has length {}", number, len));
        }
        // Only the first field of a multi-field message is used.
        if number < sections.len() && sections[number].is_none() {
            sections[number] = Some(cursor);
        }
        cursor += len;
        if number == 7 {
            break;
        }
    }
    let section = |n: usize| sections[n].ok_or_else(|| format!("missing section {}", n));

    let s3 = section(3)?;
    let grid_points = field(uint(b, s3 + 6, 4), "number of points")? as usize;
    let grid_template = field(uint(b, s3 + 12, 2), "grid template")?;
    let spectral = (50..=53).contains(&grid_template);

    let s4 = section(4)?;
    let product_template = field(uint(b, s4 + 7, 2), "product template")?;
    if !matches!(product_template, 0 | 1 | 8 | 11) {
        return Err(format!("unsupported product template 4.{}", product_template));
    }
    let category = octet(b, s4 + 9)?;
    let number = octet(b, s4 + 10)?;
    let unit = seconds_per_unit(2, octet(b, s4 + 17)?)?;
    let forecast = field(uint(b, s4 + 18, 4), "forecast time")? as i64 * unit;
    let surface = octet(b, s4 + 22)?;
    let level_type = LevelType::from_grib2(surface);
    let level = if octet(b, s4 + 23)? == 0xFF {
        // Scale factor missing: the surface has no value (e.g. `surface`).
        0
    } else {
        let surface_scale = field(signed(b, s4 + 23, 1), "surface scale")? as i32;
        let surface_value = field(signed(b, s4 + 24, 4), "surface value")? as f64;
        let mut value = surface_value / 10f64.powi(surface_scale);
        if level_type == LevelType::Isobaric {
            value /= 100.0;
        }
        value.round() as i64
    };

    let step = match product_template {
        8 | 11 => {
            let base = if product_template == 8 { s4 + 48 } else { s4 + 51 };
            let range_unit = seconds_per_unit(2, octet(b, base)?)?;
            let length = field(uint(b, base + 1, 4), "time range length")? as i64;
            StepRange {
                start: forecast,
                end: forecast + length * range_unit,
            }
        }
        _ => StepRange {
            start: forecast,
            end: forecast,
        },
    };

    let s5 = section(5)?;
    let packed_values = field(uint(b, s5 + 5, 4), "number of values")? as usize;
    let data_template = field(uint(b, s5 + 9, 2), "data template")?;
    let reference = ieee_f32(b, s5 + 11).ok_or("message too short reading R")?;
    let binary_scale = field(signed(b, s5 + 15, 2), "binary scale")? as i32;
    let decimal_scale = field(signed(b, s5 + 17, 2), "decimal scale")? as i32;
    let nbits = u32::from(octet(b, s5 + 19)?);

    let mut unsupported = match data_template {
        0 => None,
        other => Some(format!("data template 5.{}", other)),
    };
    if spectral {
        unsupported.get_or_insert_with(|| "spherical harmonics".to_string());
    }

    let s6 = section(6)?;
    let s6_len = field(uint(b, s6, 4), "bitmap length")? as usize;
    let bitmap = match octet(b, s6 + 5)? {
        0 => Some(s6 + 6..s6 + s6_len),
        255 => None,
        other => {
            unsupported.get_or_insert_with(|| format!("bitmap indicator {}", other));
            None
        }
    };

    let s7 = section(7)?;
    let s7_len = field(uint(b, s7, 4), "data length")? as usize;

    let num_points = if bitmap.is_some() || grid_points > 0 {
        grid_points
    } else {
        packed_values
    };

    let header = RecordHeader {
        edition: 2,
        short_name: grib2_short_name(discipline, category, number, level_type, level),
        level,
        level_type,
        step,
        bits_per_value: nbits,
        reference_value: reference,
        spectral,
        num_points,
    };
    let packing = Packing {
        reference,
        binary_scale,
        decimal_scale,
        nbits,
        data: s7 + 5..s7 + s7_len,
        bitmap,
        num_points,
        unsupported,
    };
    Ok((header, packing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::fixtures::grib1_message;

    fn edition1(bytes: Vec<u8>) -> RawMessage {
        RawMessage {
            offset: 0,
            edition: 1,
            bytes,
        }
    }

    #[test]
    fn time_units_follow_the_edition() {
        assert_eq!(seconds_per_unit(1, 13), Ok(900));
        assert_eq!(seconds_per_unit(2, 13), Ok(1));
        assert_eq!(seconds_per_unit(1, 254), Ok(1));
        assert!(seconds_per_unit(2, 254).is_err());
        assert_eq!(seconds_per_unit(2, 11), seconds_per_unit(1, 11));
    }

    #[test]
    fn edition1_quarter_hour_steps() {
        let mut bytes = grib1_message(167, 1, 0, 4, &[280.0, 281.0]);
        // Octet 18 of the product definition section: unit of time range.
        bytes[8 + 17] = 13;
        let record = GribRecord::parse(edition1(bytes)).unwrap();
        assert_eq!(record.header().step.token(), 3600);
    }

    #[test]
    fn short_bitmap_section_is_a_decode_error() {
        let mut bytes = grib1_message(167, 1, 0, 6, &[280.0, 281.0]);
        // Announce a bitmap and insert a four-octet section 3 before the data.
        bytes[8 + 7] |= 0x40;
        let bms_at = 8 + 28;
        bytes.splice(bms_at..bms_at, [0, 0, 4, 0]);
        assert!(matches!(
            GribRecord::parse(edition1(bytes)),
            Err(CrosscheckError::Decode { offset: 0, .. })
        ));
    }
}
