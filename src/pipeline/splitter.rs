//! Splitting record streams into per-variable staging files.

use crate::config::PipelineConfig;
use crate::error::{CrosscheckError, Result};
use crate::grib::{GribRecord, LevelClass, RecordDecoder};
use std::collections::hash_map::{Entry, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One staging file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEntry {
    /// Short name of the variable.
    pub variable: String,
    /// Vertical class of its records.
    pub class: LevelClass,
    /// Staging file holding the records.
    pub path: PathBuf,
    /// Whether any record is a spectral field.
    pub spectral: bool,
    /// Number of records written.
    pub records: usize,
}

impl SplitEntry {
    /// Name used for this entry in combined output.
    pub fn label(&self) -> String {
        format!("{}_{}", self.variable, self.class.tag())
    }
}

/// Staging files in the order their variables were first seen.
#[derive(Debug, Clone, Default)]
pub struct SplitManifest {
    /// Staging files.
    pub entries: Vec<SplitEntry>,
    /// Records that went to no file.
    pub dropped: usize,
}

/// Make sure `dir` exists and is empty.
pub fn prepare_staging(dir: &Path) -> Result<()> {
    if dir.exists() {
        let mut contents =
            fs::read_dir(dir).map_err(|e| CrosscheckError::file_open(dir.to_path_buf(), e))?;
        if contents.next().is_some() {
            return Err(CrosscheckError::StagingNotEmpty {
                path: dir.to_path_buf(),
            });
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Split the concatenation of `paths` into `config.staging_dir`.
///
/// Every input is opened before anything is written. The staging directory
/// must already be prepared.
pub fn split_files(paths: &[PathBuf], config: &PipelineConfig) -> Result<SplitManifest> {
    let decoders = paths
        .iter()
        .map(|path| RecordDecoder::open(path))
        .collect::<Result<Vec<_>>>()?;
    split_records(decoders.into_iter().flatten(), config)
}

/// Split records into `config.staging_dir`, which must already be prepared.
pub fn split_records<I>(records: I, config: &PipelineConfig) -> Result<SplitManifest>
where
    I: IntoIterator<Item = Result<GribRecord>>,
{
    let mut manifest = SplitManifest::default();
    let mut writers: HashMap<(String, LevelClass), (usize, BufWriter<File>)> = HashMap::new();

    for item in records {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping unreadable record: {}", e);
                manifest.dropped += 1;
                continue;
            }
        };
        let header = record.header();

        if config.excluded_level_types.contains(&header.level_type) {
            manifest.dropped += 1;
            continue;
        }
        let Some(class) = header.level_type.class() else {
            tracing::debug!("{} on {} has no level class", header.short_name, header.level_type);
            manifest.dropped += 1;
            continue;
        };
        if !config.wants(&header.short_name) {
            manifest.dropped += 1;
            continue;
        }

        let (index, writer) = match writers.entry((header.short_name.clone(), class)) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let path = config
                    .staging_dir
                    .join(format!("{}_{}.grb", header.short_name, class.tag()));
                let file = File::create(&path)
                    .map_err(|e| CrosscheckError::file_open(path.clone(), e))?;
                manifest.entries.push(SplitEntry {
                    variable: header.short_name.clone(),
                    class,
                    path,
                    spectral: false,
                    records: 0,
                });
                slot.insert((manifest.entries.len() - 1, BufWriter::new(file)))
            }
        };
        writer.write_all(record.bytes())?;
        let entry = &mut manifest.entries[*index];
        entry.records += 1;
        entry.spectral |= header.spectral;
    }

    for (_, (_, mut writer)) in writers {
        writer.flush()?;
    }

    tracing::info!(
        "Split into {} staging file(s), dropped {} record(s)",
        manifest.entries.len(),
        manifest.dropped
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::fixtures::Field;
    use crate::grib::LevelType;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            staging_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn refuses_a_non_empty_staging_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("leftover.grb"), b"x").unwrap();
        let err = prepare_staging(dir.path()).unwrap_err();
        assert!(matches!(err, CrosscheckError::StagingNotEmpty { .. }));

        let fresh = dir.path().join("new/staging");
        prepare_staging(&fresh).unwrap();
        assert!(fresh.is_dir());
    }

    #[test]
    fn partitions_by_variable_and_class() {
        let dir = tempfile::tempdir().unwrap();
        let fields = [
            Field::new("2t", &[1.0, 2.0]),
            Field::new("t", &[200.0, 210.0]).level(1).spectral(),
            Field::new("t", &[250.0, 260.0]).level_type(LevelType::Isobaric).level(500),
            Field::new("sp", &[1.0e5, 1.0e5]).level_type(LevelType::DepthBelowLandLayer),
            Field::new("2t", &[3.0, 4.0]).step(12),
            Field::new("t", &[201.0, 211.0]).level(2).spectral(),
        ];
        let mut bytes = Vec::new();
        let mut sizes = Vec::new();
        for field in &fields {
            let encoded = field.encode();
            sizes.push(encoded.len());
            bytes.extend(encoded);
        }

        let manifest =
            split_records(RecordDecoder::new(bytes.as_slice()), &config(dir.path())).unwrap();
        let labels: Vec<String> = manifest.entries.iter().map(SplitEntry::label).collect();
        assert_eq!(labels, vec!["2t_sfc", "t_ml", "t_pl"]);
        assert_eq!(manifest.dropped, 1);

        let t_ml = &manifest.entries[1];
        assert!(t_ml.spectral);
        assert_eq!(t_ml.records, 2);
        assert_eq!(t_ml.path, dir.path().join("t_ml.grb"));

        let staged = fs::read(dir.path().join("2t_sfc.grb")).unwrap();
        assert_eq!(staged.len(), sizes[0] + sizes[4]);
        assert_eq!(&staged[..sizes[0]], &bytes[..sizes[0]]);
    }

    #[test]
    fn variable_filter_restricts_the_split() {
        let dir = tempfile::tempdir().unwrap();
        let bytes: Vec<u8> = [Field::new("2t", &[1.0]), Field::new("msl", &[1.0e5])]
            .iter()
            .flat_map(Field::encode)
            .collect();
        let config = PipelineConfig {
            variables: vec!["msl".to_string()],
            ..config(dir.path())
        };
        let manifest = split_records(RecordDecoder::new(bytes.as_slice()), &config).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].variable, "msl");
        assert!(!dir.path().join("2t_sfc.grb").exists());
    }

    #[test]
    fn unopenable_input_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        prepare_staging(&staging).unwrap();
        let err = split_files(&[dir.path().join("missing.grb")], &config(&staging)).unwrap_err();
        assert!(matches!(err, CrosscheckError::FileOpen { .. }));
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }
}
