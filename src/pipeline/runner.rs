//! Split, transform, diff and write.

use super::{prepare_staging, reconcile_diff, run_transforms, split_files};
use super::{FieldTransform, SplitEntry, TaskOutcome};
use crate::config::PipelineConfig;
use crate::data::{write_dataset, DatasetCollection, LoadedVariable, NetcdfDataset, TargetDataset};
use crate::error::{CrosscheckError, Result};
use std::path::{Path, PathBuf};

/// Attributes carried from the target variable onto its difference.
const CARRIED_ATTRIBUTES: [&str; 2] = ["long_name", "units"];

/// Outcome of one successfully differenced variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    /// Output variable name, `<variable>_<class>`.
    pub label: String,
    /// Largest finite |target − converted|.
    pub max_abs: f64,
    /// Reconciled shape.
    pub shape: Vec<usize>,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Differenced variables in manifest order.
    pub summaries: Vec<VariableSummary>,
    /// Variables that were skipped or failed, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Validation dataset, when anything was written.
    pub output: Option<PathBuf>,
}

/// Run the whole split-transform-diff pipeline.
///
/// The staging directory, the transform and every input are checked, in that
/// order, before any work is done; after that, problems with a single
/// variable only skip it.
pub fn run_pipeline(
    grib_paths: &[PathBuf],
    target_paths: &[PathBuf],
    transform: &dyn FieldTransform,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    prepare_staging(&config.staging_dir)?;
    transform.check()?;
    let targets = target_paths
        .iter()
        .map(|path| NetcdfDataset::open(path))
        .collect::<Result<Vec<_>>>()?;
    let target = DatasetCollection::new(targets);

    let manifest = split_files(grib_paths, config)?;
    let outcomes = run_transforms(&manifest.entries, transform, config)?;
    diff_stage(&manifest.entries, &outcomes, &target, &config.output)
}

/// Difference every converted file against the target, in manifest order,
/// and write the results to `output`.
pub fn diff_stage(
    entries: &[SplitEntry],
    outcomes: &[TaskOutcome],
    target: &dyn TargetDataset,
    output: &Path,
) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();
    let mut variables = Vec::new();

    for (entry, outcome) in entries.iter().zip(outcomes) {
        let path = match outcome {
            TaskOutcome::Converted(path) => path,
            TaskOutcome::Skipped(reason) | TaskOutcome::Failed(reason) => {
                report.skipped.push((entry.label(), reason.clone()));
                continue;
            }
        };

        match diff_entry(entry, path, target) {
            Ok(variable) => {
                let max_abs = variable
                    .data
                    .iter()
                    .filter(|v| v.is_finite())
                    .fold(0.0f64, |acc, v| acc.max(v.abs()));
                report.summaries.push(VariableSummary {
                    label: variable.name.clone(),
                    max_abs,
                    shape: variable.shape.clone(),
                });
                variables.push(variable);
            }
            Err(e) if e.is_per_variable() => {
                tracing::warn!("Skipping {}: {}", entry.label(), e);
                report.skipped.push((entry.label(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    if variables.is_empty() {
        tracing::warn!("No variable could be differenced, nothing written");
    } else {
        write_dataset(output, &variables)?;
        tracing::info!("Wrote {} variable(s) to {}", variables.len(), output.display());
        report.output = Some(output.to_path_buf());
    }
    Ok(report)
}

fn diff_entry(
    entry: &SplitEntry,
    converted_path: &Path,
    target: &dyn TargetDataset,
) -> Result<LoadedVariable> {
    let unreadable = |e: CrosscheckError| CrosscheckError::transform(&entry.variable, e.to_string());

    let converted = NetcdfDataset::open(converted_path).map_err(unreadable)?;
    let check = converted
        .variable(&entry.variable)
        .map_err(unreadable)?
        .ok_or_else(|| CrosscheckError::variable_missing(&entry.variable, converted.describe()))?;
    let reference = target
        .variable(&entry.variable)?
        .ok_or_else(|| CrosscheckError::variable_missing(&entry.variable, target.describe()))?;

    let diff = reconcile_diff(&reference, &check)?;
    let dims: Vec<&str> = reference.dim_names.iter().map(String::as_str).collect();
    let mut variable = LoadedVariable::new(entry.label(), &dims, diff);
    for key in CARRIED_ATTRIBUTES {
        if let Some(value) = reference.attributes.get(key) {
            variable = variable.with_attribute(key, value);
        }
    }
    Ok(variable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::fixtures::Field;
    use crate::grib::RecordDecoder;
    use crate::pipeline::Frequency;
    use ndarray::{ArrayD, IxDyn};
    use std::fs;

    /// Stacks the staged records into a `time × ncol` NetCDF file.
    struct Restack;

    impl FieldTransform for Restack {
        fn run(&self, entry: &SplitEntry, _frequency: Frequency, output: &Path) -> Result<()> {
            if entry.variable == "msl" {
                return Err(CrosscheckError::transform("msl", "exit status 1"));
            }
            let mut values = Vec::new();
            let mut width = 0;
            for record in RecordDecoder::open(&entry.path)? {
                let decoded = record?.decode()?;
                width = decoded.values.len();
                values.extend(decoded.values);
            }
            let rows = values.len() / width.max(1);
            let data = ArrayD::from_shape_vec(IxDyn(&[rows, width]), values)
                .map_err(|e| CrosscheckError::transform(&entry.variable, e.to_string()))?;
            let variable = LoadedVariable::new(entry.variable.as_str(), &["time", "ncol"], data);
            write_dataset(output, &[variable])
        }
    }

    #[test]
    fn converted_fields_are_differenced_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let grib = dir.path().join("ifs.grb");
        let bytes: Vec<u8> = [
            Field::new("2t", &[1.0, 2.0, 3.0]).bits(8).step(0),
            Field::new("msl", &[1.0e5, 1.0e5, 1.0e5]).step(0),
            Field::new("2t", &[2.0, 3.0, 4.0]).bits(8).step(6),
        ]
        .iter()
        .flat_map(Field::encode)
        .collect();
        fs::write(&grib, bytes).unwrap();

        let target_path = dir.path().join("xios.nc");
        let target = LoadedVariable::new(
            "2t",
            &["time", "ncol"],
            ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![2.5, 3.0, 4.5]).unwrap(),
        )
        .with_attribute("units", "K");
        write_dataset(&target_path, &[target]).unwrap();

        let config = PipelineConfig {
            staging_dir: dir.path().join("staging"),
            workers: 2,
            output: dir.path().join("validation.nc"),
            ..PipelineConfig::default()
        };
        let report = run_pipeline(&[grib], &[target_path], &Restack, &config).unwrap();

        assert_eq!(report.summaries.len(), 1);
        let summary = &report.summaries[0];
        assert_eq!(summary.label, "2t_sfc");
        assert_eq!(summary.shape, vec![1, 3]);
        assert_eq!(summary.max_abs, 0.5);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "msl_sfc");

        let written = NetcdfDataset::open(&config.output).unwrap();
        let diff = written.variable("2t_sfc").unwrap().unwrap();
        assert_eq!(diff.units(), "K");
        assert_eq!(diff.data.iter().copied().collect::<Vec<_>>(), vec![0.5, 0.0, 0.5]);
    }

    #[test]
    fn non_empty_staging_aborts_before_reading_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("old.grb"), b"GRIB").unwrap();
        let config = PipelineConfig {
            staging_dir: staging,
            ..PipelineConfig::default()
        };

        let err = run_pipeline(
            &[dir.path().join("missing.grb")],
            &[dir.path().join("missing.nc")],
            &Restack,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, CrosscheckError::StagingNotEmpty { .. }));
    }

    /// Transform whose program cannot be found.
    struct Unavailable;

    impl FieldTransform for Unavailable {
        fn check(&self) -> Result<()> {
            Err(CrosscheckError::transform("*", "cannot find cdo"))
        }

        fn run(&self, _entry: &SplitEntry, _frequency: Frequency, _output: &Path) -> Result<()> {
            unreachable!("never checked successfully")
        }
    }

    #[test]
    fn staging_is_checked_before_the_transform() {
        let dir = tempfile::tempdir().unwrap();
        let grib = dir.path().join("ifs.grb");
        fs::write(&grib, Field::new("2t", &[1.0, 2.0]).encode()).unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("old.grb"), b"GRIB").unwrap();
        let config = PipelineConfig {
            staging_dir: staging.clone(),
            ..PipelineConfig::default()
        };

        let err = run_pipeline(&[grib.clone()], &[], &Unavailable, &config).unwrap_err();
        assert!(matches!(err, CrosscheckError::StagingNotEmpty { .. }));

        fs::remove_file(staging.join("old.grb")).unwrap();
        let err = run_pipeline(&[grib], &[], &Unavailable, &config).unwrap_err();
        assert!(matches!(err, CrosscheckError::Transform { .. }));
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[test]
    fn nothing_converted_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("validation.nc");
        let entry = SplitEntry {
            variable: "cp".to_string(),
            class: crate::grib::LevelClass::Surface,
            path: dir.path().join("cp_sfc.grb"),
            spectral: false,
            records: 1,
        };
        let target = crate::data::MemoryDataset::new("empty");
        let report = diff_stage(
            &[entry],
            &[TaskOutcome::Skipped("Unknown output frequency: 5h".to_string())],
            &target,
            &output,
        )
        .unwrap();
        assert!(report.output.is_none());
        assert_eq!(report.skipped[0].0, "cp_sfc");
        assert!(!output.exists());
    }
}
