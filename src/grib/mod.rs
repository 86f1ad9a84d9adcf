//! GRIB record stream decoding.
//!
//! The decoder frames messages, parses their headers eagerly and unpacks
//! field values only on request, so records that are not of interest cost a
//! header parse and nothing more.

mod bits;
mod message;
mod params;
mod record;

#[cfg(test)]
pub(crate) mod fixtures;

pub use message::{MessageReader, RawMessage};
pub use params::{grib1_short_name, grib2_short_name, LevelClass, LevelType};
pub use record::{DecodedRecord, GribRecord, RecordHeader, StepRange};

use crate::error::{CrosscheckError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Lazy, finite sequence of records in physical stream order.
///
/// Framing errors end the sequence; a message whose header cannot be parsed
/// yields an error for that position and decoding continues.
#[derive(Debug)]
pub struct RecordDecoder<R> {
    messages: MessageReader<R>,
}

impl<R: Read> RecordDecoder<R> {
    /// Decode records from any byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            messages: MessageReader::new(reader),
        }
    }
}

impl RecordDecoder<BufReader<File>> {
    /// Open a GRIB file.
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|e| CrosscheckError::file_open(path.to_path_buf(), e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = Result<GribRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let message = self.messages.next()?;
        Some(message.and_then(GribRecord::parse))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{grib1_message, Field};
    use super::*;

    #[test]
    fn decodes_simple_packed_edition2_field() {
        let field = Field::new("2t", &[271.5, 280.25, 300.0, 290.0]).bits(16);
        let bytes = field.encode();
        let mut decoder = RecordDecoder::new(bytes.as_slice());

        let record = decoder.next().unwrap().unwrap();
        let header = record.header();
        assert_eq!(header.edition, 2);
        assert_eq!(header.short_name, "2t");
        assert_eq!(header.level_type, LevelType::HeightAboveGround);
        assert_eq!(header.level, 2);
        assert_eq!(header.bits_per_value, 16);
        assert_eq!(header.num_points, 4);
        assert_eq!(header.step.token(), 6 * 3600);

        let decoded = record.decode().unwrap();
        assert_eq!(decoded.minimum, 271.5);
        assert_eq!(decoded.maximum, 300.0);
        for (got, want) in decoded.values.iter().zip([271.5, 280.25, 300.0, 290.0]) {
            assert!((got - want).abs() <= decoded.resolution(), "{} vs {}", got, want);
        }
        assert!(decoder.next().is_none());
    }

    #[test]
    fn bitmap_masks_points() {
        let field = Field::new("msl", &[101_325.0, f64::NAN, 99_000.0])
            .level_type(LevelType::MeanSea)
            .bits(24);
        let decoded = RecordDecoder::new(field.encode().as_slice())
            .next()
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(decoded.values.len(), 3);
        assert!(decoded.values[1].is_nan());
        assert_eq!(decoded.minimum, 99_000.0);
    }

    #[test]
    fn constant_field_with_zero_bits() {
        let field = Field::new("ci", &[0.5, 0.5, 0.5]).bits(0);
        let decoded = RecordDecoder::new(field.encode().as_slice())
            .next()
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(decoded.values, vec![0.5, 0.5, 0.5]);
        assert_eq!(decoded.resolution(), 0.0);
    }

    #[test]
    fn decodes_edition1_model_level_field() {
        let bytes = grib1_message(133, 109, 37, 12, &[1.0e-3, 2.0e-3, 4.0e-3, 3.0e-3]);
        let record = RecordDecoder::new(bytes.as_slice()).next().unwrap().unwrap();
        let header = record.header();
        assert_eq!(header.edition, 1);
        assert_eq!(header.short_name, "q");
        assert_eq!(header.level, 37);
        assert_eq!(header.level_type, LevelType::Hybrid);
        assert_eq!(header.step.end_hours(), 12);

        let decoded = record.decode().unwrap();
        assert_eq!(decoded.values.len(), 4);
        for (got, want) in decoded.values.iter().zip([1.0e-3, 2.0e-3, 4.0e-3, 3.0e-3]) {
            assert!((got - want).abs() < 1.0e-6, "{} vs {}", got, want);
        }
    }

    #[test]
    fn spectral_field_header_parses_but_does_not_unpack() {
        let field = Field::new("t", &[1.0, 2.0]).spectral();
        let record = RecordDecoder::new(field.encode().as_slice())
            .next()
            .unwrap()
            .unwrap();
        assert!(record.header().spectral);
        assert!(matches!(
            record.decode(),
            Err(CrosscheckError::UnsupportedPacking(_))
        ));
    }
}
