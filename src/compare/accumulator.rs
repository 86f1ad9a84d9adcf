//! Running worst-mismatch statistics.

use super::VariableKey;
use crate::grib::DecodedRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The worst mismatch seen for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Signed difference (decoded − target) at the point of largest magnitude.
    pub diff: f64,
    /// Encoding resolution of the record the difference came from.
    pub resolution: f64,
    /// Reference value used for normalisation (never zero).
    pub reference: f64,
    /// Step token (seconds) of the originating record.
    pub step: Option<i64>,
}

impl ErrorRecord {
    /// Difference relative to the reference value.
    pub fn relative_diff(&self) -> f64 {
        self.diff / self.reference
    }

    /// Resolution relative to the reference value.
    pub fn relative_resolution(&self) -> f64 {
        self.resolution / self.reference
    }
}

/// One decoded field paired with its target slice.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    /// Decoded field values.
    pub decoded: &'a [f64],
    /// Target values in the same point order.
    pub target: &'a [f64],
    /// Bits per packed value of the record.
    pub bits_per_value: u32,
    /// Smallest decoded value.
    pub minimum: f64,
    /// Largest decoded value.
    pub maximum: f64,
    /// Packing reference value of the record.
    pub reference_value: f64,
    /// Step token of the record.
    pub step: i64,
}

impl<'a> Sample<'a> {
    /// Pair a decoded record with its target values.
    pub fn from_record(record: &'a DecodedRecord, target: &'a [f64]) -> Self {
        Self {
            decoded: &record.values,
            target,
            bits_per_value: record.header.bits_per_value,
            minimum: record.minimum,
            maximum: record.maximum,
            reference_value: record.header.reference_value,
            step: record.header.step.token(),
        }
    }
}

/// What [`ErrorAccumulator::offer`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The sample became the key's worst mismatch.
    Replaced,
    /// An earlier sample was at least as bad.
    Kept,
    /// Decoded and target fields have different point counts.
    LengthMismatch {
        /// Points in the decoded field.
        decoded: usize,
        /// Points in the target slice.
        target: usize,
    },
    /// No point is finite on both sides.
    NoValidPoints,
}

/// Full difference field kept for map variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDifference {
    /// Decoded − target at every point.
    pub values: Vec<f64>,
    /// Step token of the sample.
    pub step: i64,
}

/// Tracks, per key, the largest-magnitude difference seen so far.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator {
    errors: BTreeMap<VariableKey, ErrorRecord>,
    differences: BTreeMap<VariableKey, RawDifference>,
    map_variables: BTreeSet<String>,
    normalize_resolution: bool,
}

impl ErrorAccumulator {
    /// Create an accumulator. Full difference fields are retained for the
    /// variables in `map_variables`.
    pub fn new(map_variables: impl IntoIterator<Item = String>, normalize_resolution: bool) -> Self {
        Self {
            errors: BTreeMap::new(),
            differences: BTreeMap::new(),
            map_variables: map_variables.into_iter().collect(),
            normalize_resolution,
        }
    }

    /// Compare one sample and keep it if it is the worst so far for `key`.
    pub fn offer(&mut self, key: &VariableKey, sample: Sample<'_>) -> Offer {
        if sample.decoded.len() != sample.target.len() {
            return Offer::LengthMismatch {
                decoded: sample.decoded.len(),
                target: sample.target.len(),
            };
        }

        let Some(index) = argmax_abs_diff(sample.decoded, sample.target) else {
            return Offer::NoValidPoints;
        };
        let diff = sample.decoded[index] - sample.target[index];

        if let Some(current) = self.errors.get(key) {
            if diff.abs() <= current.diff.abs() {
                return Offer::Kept;
            }
        }

        let reference = match sample.reference_value.abs() {
            r if r == 0.0 => 1.0,
            r => r,
        };
        let mut resolution =
            (sample.maximum - sample.minimum) / 2f64.powi(sample.bits_per_value as i32);
        if self.normalize_resolution {
            resolution /= reference;
        }

        self.errors.insert(
            key.clone(),
            ErrorRecord {
                diff,
                resolution,
                reference,
                step: Some(sample.step),
            },
        );

        if self.map_variables.contains(&key.name) {
            let values = sample
                .decoded
                .iter()
                .zip(sample.target)
                .map(|(d, t)| d - t)
                .collect();
            self.differences.insert(
                key.clone(),
                RawDifference {
                    values,
                    step: sample.step,
                },
            );
        }

        Offer::Replaced
    }

    /// Current worst mismatch for a key.
    pub fn get(&self, key: &VariableKey) -> Option<&ErrorRecord> {
        self.errors.get(key)
    }

    /// Consume the accumulator.
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<VariableKey, ErrorRecord>,
        BTreeMap<VariableKey, RawDifference>,
    ) {
        (self.errors, self.differences)
    }
}

/// Index of the largest |a − b| over points finite on both sides; the first
/// one wins ties.
fn argmax_abs_diff(a: &[f64], b: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        let d = (x - y).abs();
        if !d.is_finite() {
            continue;
        }
        match best {
            Some((_, current)) if d <= current => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample<'a>(decoded: &'a [f64], target: &'a [f64], step: i64) -> Sample<'a> {
        Sample {
            decoded,
            target,
            bits_per_value: 8,
            minimum: 0.0,
            maximum: 256.0,
            reference_value: 0.0,
            step,
        }
    }

    #[test]
    fn keeps_signed_difference_at_largest_magnitude() {
        let mut acc = ErrorAccumulator::new(Vec::new(), false);
        let key = VariableKey::surface("2t");

        assert_eq!(acc.offer(&key, sample(&[1.0, 2.0, 3.0], &[1.5, 2.0, 5.0], 0)), Offer::Replaced);
        let record = acc.get(&key).unwrap();
        assert_eq!(record.diff, -2.0);
        assert_eq!(record.resolution, 1.0);
        assert_eq!(record.reference, 1.0);

        assert_eq!(acc.offer(&key, sample(&[0.0], &[1.0], 1)), Offer::Kept);
        assert_eq!(acc.offer(&key, sample(&[0.0], &[2.0], 2)), Offer::Kept);
        assert_eq!(acc.offer(&key, sample(&[3.0], &[0.5], 3)), Offer::Replaced);
        assert_eq!(acc.get(&key).unwrap().diff, 2.5);
        assert_eq!(acc.get(&key).unwrap().step, Some(3));
    }

    #[test]
    fn normalizes_resolution_by_reference() {
        let mut acc = ErrorAccumulator::new(Vec::new(), true);
        let key = VariableKey::surface("sp");
        let s = Sample {
            reference_value: -4.0,
            ..sample(&[1.0], &[0.0], 0)
        };
        acc.offer(&key, s);
        let record = acc.get(&key).unwrap();
        assert_eq!(record.reference, 4.0);
        assert_eq!(record.resolution, 0.25);
        assert_eq!(record.relative_diff(), 0.25);
    }

    #[test]
    fn rejects_mismatched_and_empty_samples() {
        let mut acc = ErrorAccumulator::new(Vec::new(), false);
        let key = VariableKey::surface("cp");
        assert_eq!(
            acc.offer(&key, sample(&[1.0, 2.0], &[1.0], 0)),
            Offer::LengthMismatch { decoded: 2, target: 1 }
        );
        assert_eq!(
            acc.offer(&key, sample(&[f64::NAN], &[1.0], 0)),
            Offer::NoValidPoints
        );
        assert!(acc.get(&key).is_none());
    }

    #[test]
    fn map_variables_follow_the_worst_step() {
        let mut acc = ErrorAccumulator::new(vec!["10v".to_string()], false);
        let key = VariableKey::surface("10v");
        acc.offer(&key, sample(&[1.0, 1.0], &[0.0, 0.5], 0));
        acc.offer(&key, sample(&[1.0, 4.0], &[0.0, 0.0], 1));
        acc.offer(&key, sample(&[0.0, 0.0], &[1.0, 1.0], 2));

        let (_, maps) = acc.into_parts();
        let diff = &maps[&key];
        assert_eq!(diff.values, vec![1.0, 4.0]);
        assert_eq!(diff.step, 1);
    }

    #[test]
    fn non_map_variables_keep_no_field() {
        let mut acc = ErrorAccumulator::new(vec!["10v".to_string()], false);
        acc.offer(&VariableKey::surface("2t"), sample(&[1.0], &[0.0], 0));
        let (errors, maps) = acc.into_parts();
        assert_eq!(errors.len(), 1);
        assert!(maps.is_empty());
    }

    proptest! {
        #[test]
        fn stored_difference_dominates_every_candidate(
            fields in prop::collection::vec(
                prop::collection::vec((-1.0e6f64..1.0e6, -1.0e6f64..1.0e6), 4),
                1..20,
            )
        ) {
            let mut acc = ErrorAccumulator::new(Vec::new(), false);
            let key = VariableKey::at_level("q", 3);
            let mut candidates = Vec::new();
            for (step, field) in fields.iter().enumerate() {
                let decoded: Vec<f64> = field.iter().map(|p| p.0).collect();
                let target: Vec<f64> = field.iter().map(|p| p.1).collect();
                candidates.extend(decoded.iter().zip(&target).map(|(d, t)| (d - t).abs()));
                acc.offer(&key, sample(&decoded, &target, step as i64));
            }
            let stored = acc.get(&key).unwrap().diff.abs();
            for c in candidates {
                prop_assert!(stored >= c);
            }
        }
    }
}
