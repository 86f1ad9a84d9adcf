//! Single-pass comparison of a record stream against a target dataset.
//!
//! A run is three explicit steps: [`plan`] reads the cache and decides which
//! variables still need computing, [`compute`] makes one pass over the stream
//! for those, and [`merge`] combines both and writes back the fresh results.

use super::{
    Dimensionality, DifferenceField, ErrorAccumulator, ErrorRecord, Geometry,
    Offer, Sample, StepTracker, VariableKey,
};
use crate::cache::CacheStore;
use crate::config::CompareConfig;
use crate::data::TargetDataset;
use crate::error::{CrosscheckError, Result};
use crate::grib::{GribRecord, RecordDecoder};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Counters of one pass over the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Records framed and header-parsed.
    pub records: usize,
    /// Records compared against the target.
    pub compared: usize,
    /// Positions that could not be parsed.
    pub undecodable: usize,
    /// Logical steps seen.
    pub steps: usize,
}

/// Why a record of a requested variable was not compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    /// The target dataset has no such variable.
    Absent,
    /// The target variable exists but could not be read.
    Unreadable,
    /// Aligned time index past the end of the target's time axis.
    TimeOutOfRange,
    /// Level outside the target's vertical axis.
    LevelOutOfRange,
    /// Decoded and target fields differ in point count.
    GridMismatch,
    /// Packing the decoder cannot unpack.
    UnsupportedPacking,
    /// No point finite on both sides.
    NoValidPoints,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "variable absent from target",
            Self::Unreadable => "target variable unreadable",
            Self::TimeOutOfRange => "time index out of range",
            Self::LevelOutOfRange => "level out of range",
            Self::GridMismatch => "grid mismatch",
            Self::UnsupportedPacking => "unsupported packing",
            Self::NoValidPoints => "no valid points",
        };
        f.write_str(text)
    }
}

/// Skip counts per variable, reported once at the end of a pass.
#[derive(Debug, Clone, Default)]
pub struct SkipLog {
    counts: BTreeMap<(String, SkipReason), usize>,
}

impl SkipLog {
    fn note(&mut self, variable: &str, reason: SkipReason) {
        *self
            .counts
            .entry((variable.to_string(), reason))
            .or_default() += 1;
    }

    /// Number of skipped records of a variable for a reason.
    pub fn count(&self, variable: &str, reason: SkipReason) -> usize {
        self.counts
            .get(&(variable.to_string(), reason))
            .copied()
            .unwrap_or(0)
    }

    /// Whether nothing was skipped.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn report(&self) {
        for ((variable, reason), count) in &self.counts {
            tracing::warn!("Skipped {} record(s) of {}: {}", count, variable, reason);
        }
    }
}

/// What the cache already holds and what remains to compute.
#[derive(Debug, Clone, Default)]
pub struct CachePlan {
    /// Error records read from the cache.
    pub cached_errors: BTreeMap<VariableKey, ErrorRecord>,
    /// Difference fields read from the cache.
    pub cached_maps: BTreeMap<VariableKey, DifferenceField>,
    /// Variables the stream must be read for.
    pub pending: BTreeSet<String>,
}

/// Results of one pass over the stream.
#[derive(Debug, Clone, Default)]
pub struct FreshResults {
    /// Worst mismatch per key.
    pub errors: BTreeMap<VariableKey, ErrorRecord>,
    /// Difference fields of map variables.
    pub maps: BTreeMap<VariableKey, DifferenceField>,
    /// Pass counters.
    pub stats: PassStats,
    /// Records not compared, by variable and reason.
    pub skips: SkipLog,
}

/// Final, merged comparison result.
#[derive(Debug, Clone, Default)]
pub struct ComparisonResult {
    /// Worst mismatch per key.
    pub errors: BTreeMap<VariableKey, ErrorRecord>,
    /// Difference fields of map variables.
    pub maps: BTreeMap<VariableKey, DifferenceField>,
    /// Counters of the pass, zero when everything came from the cache.
    pub stats: PassStats,
    /// Number of keys served from the cache.
    pub cached: usize,
}

/// Read the cache and work out which requested variables are missing.
///
/// An unreadable cache entry counts as missing.
pub fn plan(cache: &dyn CacheStore, config: &CompareConfig) -> Result<CachePlan> {
    let mut plan = CachePlan::default();

    for variable in &config.variables {
        match cache.load_errors(variable, config.dims) {
            Ok(Some(errors)) => plan.cached_errors.extend(errors),
            Ok(None) => {
                plan.pending.insert(variable.clone());
            }
            Err(e) => {
                tracing::warn!("Ignoring cached errors of {}: {}", variable, e);
                plan.pending.insert(variable.clone());
            }
        }
    }

    for variable in &config.map_variables {
        let key = VariableKey::surface(variable.as_str());
        match cache.load_map(&key) {
            Ok(Some(field)) => {
                plan.cached_maps.insert(key, field);
            }
            Ok(None) => {
                plan.pending.insert(variable.clone());
            }
            Err(e) => {
                tracing::warn!("Ignoring cached map of {}: {}", variable, e);
                plan.pending.insert(variable.clone());
            }
        }
    }

    tracing::info!(
        "{} cached entries, {} variable(s) to compute",
        plan.cached_errors.len() + plan.cached_maps.len(),
        plan.pending.len()
    );
    Ok(plan)
}

/// One pass over `records` for the `pending` variables.
pub fn compute<I>(
    records: I,
    dataset: &dyn TargetDataset,
    pending: &BTreeSet<String>,
    config: &CompareConfig,
) -> Result<FreshResults>
where
    I: IntoIterator<Item = Result<GribRecord>>,
{
    let map_variables = config
        .map_variables
        .iter()
        .filter(|m| pending.contains(*m))
        .cloned();
    let mut accumulator = ErrorAccumulator::new(map_variables, config.normalize_resolution);
    let mut tracker = StepTracker::default();
    let mut skips = SkipLog::default();
    let mut stats = PassStats::default();

    for item in records {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping unreadable record: {}", e);
                stats.undecodable += 1;
                continue;
            }
        };
        stats.records += 1;

        let header = record.header();
        let counter = tracker.observe(header.step.token());
        stats.steps = counter;

        let name = header.short_name.as_str();
        if !pending.contains(name) {
            continue;
        }
        if config.level_type.is_some_and(|lt| lt != header.level_type) {
            continue;
        }
        let Some(t) = config.alignment.align(counter, config.dims) else {
            continue;
        };

        let target = match dataset.variable(name) {
            Ok(Some(target)) => target,
            Ok(None) => {
                skips.note(name, SkipReason::Absent);
                continue;
            }
            Err(e @ CrosscheckError::NetCDF(_)) => {
                if skips.count(name, SkipReason::Unreadable) == 0 {
                    tracing::warn!("Cannot read {} from {}: {}", name, dataset.describe(), e);
                }
                skips.note(name, SkipReason::Unreadable);
                continue;
            }
            Err(e) => return Err(e),
        };
        if t >= target.time_len() {
            skips.note(name, SkipReason::TimeOutOfRange);
            continue;
        }

        let (key, indices) = match config.dims {
            Dimensionality::TwoD => (VariableKey::surface(name), vec![t]),
            Dimensionality::ThreeD => {
                let Some(level_index) = header
                    .level
                    .checked_sub(1)
                    .and_then(|l| usize::try_from(l).ok())
                else {
                    skips.note(name, SkipReason::LevelOutOfRange);
                    continue;
                };
                (
                    VariableKey::at_level(name, header.level),
                    vec![t, level_index],
                )
            }
        };
        let Some(slice) = target.slice_leading(&indices) else {
            skips.note(name, SkipReason::LevelOutOfRange);
            continue;
        };

        let decoded = match record.decode() {
            Ok(decoded) => decoded,
            Err(CrosscheckError::UnsupportedPacking(_)) => {
                skips.note(name, SkipReason::UnsupportedPacking);
                continue;
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", key, e);
                stats.undecodable += 1;
                continue;
            }
        };
        let target_values: Vec<f64> = slice.iter().copied().collect();

        match accumulator.offer(&key, Sample::from_record(&decoded, &target_values)) {
            Offer::Replaced | Offer::Kept => {
                stats.compared += 1;
                tracing::debug!("Compared {} at step {} against time index {}", key, counter, t);
            }
            Offer::LengthMismatch { decoded, target } => {
                tracing::debug!("{}: {} decoded points vs {} target points", key, decoded, target);
                skips.note(name, SkipReason::GridMismatch);
            }
            Offer::NoValidPoints => skips.note(name, SkipReason::NoValidPoints),
        }
    }

    skips.report();
    tracing::info!(
        "Read {} records in {} steps, compared {}",
        stats.records,
        stats.steps,
        stats.compared
    );

    let (errors, raw) = accumulator.into_parts();
    let mut maps = BTreeMap::new();
    for (key, difference) in raw {
        match Geometry::from_dataset(dataset, difference.values.len()) {
            Ok(geometry) => {
                maps.insert(key, geometry.rasterize(&difference.values, Some(difference.step)));
            }
            Err(e) => tracing::warn!("No difference map for {}: {}", key, e),
        }
    }

    Ok(FreshResults {
        errors,
        maps,
        stats,
        skips,
    })
}

/// Combine cached and fresh results; fresh entries win. Only fresh entries
/// are written back.
pub fn merge(
    plan: CachePlan,
    fresh: FreshResults,
    cache: &mut dyn CacheStore,
    dims: Dimensionality,
) -> ComparisonResult {
    let variables: BTreeSet<&str> = fresh.errors.keys().map(|k| k.name.as_str()).collect();
    for variable in variables {
        if let Err(e) = cache.store_errors(variable, dims, &fresh.errors) {
            tracing::warn!("Could not cache errors of {}: {}", variable, e);
        }
    }
    for (key, field) in &fresh.maps {
        if let Err(e) = cache.store_map(key, field) {
            tracing::warn!("Could not cache map of {}: {}", key, e);
        }
    }

    let cached = plan
        .cached_errors
        .keys()
        .filter(|key| !fresh.errors.contains_key(*key))
        .count();
    let mut errors = plan.cached_errors;
    errors.extend(fresh.errors);
    let mut maps = plan.cached_maps;
    maps.extend(fresh.maps);

    ComparisonResult {
        errors,
        maps,
        stats: fresh.stats,
        cached,
    }
}

/// Plan, compute and merge. `open` is only called when something is missing
/// from the cache.
pub fn compare_stream<F, I>(
    open: F,
    dataset: &dyn TargetDataset,
    cache: &mut dyn CacheStore,
    config: &CompareConfig,
) -> Result<ComparisonResult>
where
    F: FnOnce() -> Result<I>,
    I: IntoIterator<Item = Result<GribRecord>>,
{
    let plan = plan(cache, config)?;
    let fresh = if plan.pending.is_empty() {
        tracing::info!("All requested variables cached, not reading the stream");
        FreshResults::default()
    } else {
        compute(open()?, dataset, &plan.pending, config)?
    };
    Ok(merge(plan, fresh, cache, config.dims))
}

/// Compare the concatenation of `grib_paths` against `dataset`.
///
/// Every file is opened before the pass starts, so an unopenable input fails
/// the run without partial results.
pub fn compare(
    grib_paths: &[PathBuf],
    dataset: &dyn TargetDataset,
    cache: &mut dyn CacheStore,
    config: &CompareConfig,
) -> Result<ComparisonResult> {
    tracing::info!(
        "Comparing {} GRIB file(s) against {} ({:?}, alignment {})",
        grib_paths.len(),
        dataset.describe(),
        config.dims,
        config.alignment
    );
    compare_stream(
        || {
            let decoders = grib_paths
                .iter()
                .map(|path| RecordDecoder::open(path))
                .collect::<Result<Vec<_>>>()?;
            Ok(decoders.into_iter().flatten())
        },
        dataset,
        cache,
        config,
    )
}
