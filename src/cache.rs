//! Persisted comparison results.
//!
//! Error statistics are stored per variable as JSON (`<var>_errs.json`) and
//! difference fields as `bincode` blobs (`<var>_diff.bin`). A run reads what
//! is cached, computes only what is missing, and writes back only what it
//! computed.

use crate::compare::{DifferenceField, Dimensionality, ErrorRecord, VariableKey};
use crate::config::CompareConfig;
use crate::error::{CrosscheckError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where comparison results are kept between runs.
pub trait CacheStore {
    /// Cached error records of one variable, keyed by level for profiles.
    fn load_errors(
        &self,
        variable: &str,
        dims: Dimensionality,
    ) -> Result<Option<BTreeMap<VariableKey, ErrorRecord>>>;

    /// Cached difference field for a key.
    fn load_map(&self, key: &VariableKey) -> Result<Option<DifferenceField>>;

    /// Store all error records of one variable.
    fn store_errors(
        &mut self,
        variable: &str,
        dims: Dimensionality,
        errors: &BTreeMap<VariableKey, ErrorRecord>,
    ) -> Result<()>;

    /// Store the difference field of a key.
    fn store_map(&mut self, key: &VariableKey, field: &DifferenceField) -> Result<()>;
}

/// Build the cache a comparison run should use.
pub fn open_cache(config: &CompareConfig, dataset_path: &Path) -> Box<dyn CacheStore> {
    if !config.use_cache {
        return Box::new(NoCache);
    }
    let dir = config.cache_dir.clone().unwrap_or_else(|| {
        dataset_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    Box::new(JsonCacheStore::new(dir))
}

#[derive(Debug, Serialize, Deserialize)]
struct SurfaceErrors {
    absdiff: f64,
    resol: f64,
    refval: f64,
    #[serde(default)]
    step: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileErrors {
    levels: Vec<i64>,
    absdiff: Vec<f64>,
    resol: Vec<f64>,
    refval: Vec<f64>,
    #[serde(default)]
    steps: Vec<Option<i64>>,
}

/// Cache files in one directory.
#[derive(Debug, Clone)]
pub struct JsonCacheStore {
    dir: PathBuf,
}

impl JsonCacheStore {
    /// Use `dir` for cache files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory cache files are kept in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn errors_path(&self, variable: &str) -> PathBuf {
        self.dir.join(format!("{}_errs.json", variable))
    }

    fn map_path(&self, key: &VariableKey) -> PathBuf {
        match key.level {
            Some(level) => self.dir.join(format!("{}_{}_diff.bin", key.name, level)),
            None => self.dir.join(format!("{}_diff.bin", key.name)),
        }
    }

    fn open(path: &Path) -> Result<Option<BufReader<File>>> {
        match File::open(path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CrosscheckError::file_open(path.to_path_buf(), e)),
        }
    }

    fn create(&self, path: &Path) -> Result<BufWriter<File>> {
        fs::create_dir_all(&self.dir)?;
        let file =
            File::create(path).map_err(|e| CrosscheckError::file_open(path.to_path_buf(), e))?;
        Ok(BufWriter::new(file))
    }
}

impl CacheStore for JsonCacheStore {
    fn load_errors(
        &self,
        variable: &str,
        dims: Dimensionality,
    ) -> Result<Option<BTreeMap<VariableKey, ErrorRecord>>> {
        let path = self.errors_path(variable);
        let Some(reader) = Self::open(&path)? else {
            return Ok(None);
        };

        let mut errors = BTreeMap::new();
        match dims {
            Dimensionality::TwoD => {
                let entry: SurfaceErrors = serde_json::from_reader(reader)?;
                errors.insert(
                    VariableKey::surface(variable),
                    ErrorRecord {
                        diff: entry.absdiff,
                        resolution: entry.resol,
                        reference: entry.refval,
                        step: entry.step,
                    },
                );
            }
            Dimensionality::ThreeD => {
                let entry: ProfileErrors = serde_json::from_reader(reader)?;
                let n = entry.levels.len();
                if entry.absdiff.len() != n || entry.resol.len() != n || entry.refval.len() != n {
                    return Err(CrosscheckError::Cache(format!(
                        "{}: arrays of unequal length",
                        path.display()
                    )));
                }
                for i in 0..n {
                    errors.insert(
                        VariableKey::at_level(variable, entry.levels[i]),
                        ErrorRecord {
                            diff: entry.absdiff[i],
                            resolution: entry.resol[i],
                            reference: entry.refval[i],
                            step: entry.steps.get(i).copied().flatten(),
                        },
                    );
                }
            }
        }
        tracing::debug!("Read {} cached entries from {}", errors.len(), path.display());
        Ok(Some(errors))
    }

    fn load_map(&self, key: &VariableKey) -> Result<Option<DifferenceField>> {
        let path = self.map_path(key);
        let Some(reader) = Self::open(&path)? else {
            return Ok(None);
        };
        let field: DifferenceField = bincode::deserialize_from(reader)?;
        Ok(Some(field))
    }

    fn store_errors(
        &mut self,
        variable: &str,
        dims: Dimensionality,
        errors: &BTreeMap<VariableKey, ErrorRecord>,
    ) -> Result<()> {
        let entries: Vec<(&VariableKey, &ErrorRecord)> =
            errors.iter().filter(|(k, _)| k.name == variable).collect();
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.errors_path(variable);
        let mut writer = self.create(&path)?;

        match dims {
            Dimensionality::TwoD => {
                let (_, record) = entries[0];
                let entry = SurfaceErrors {
                    absdiff: record.diff,
                    resol: record.resolution,
                    refval: record.reference,
                    step: record.step,
                };
                serde_json::to_writer(&mut writer, &entry)?;
            }
            Dimensionality::ThreeD => {
                let entry = ProfileErrors {
                    levels: entries.iter().map(|(k, _)| k.level.unwrap_or(0)).collect(),
                    absdiff: entries.iter().map(|(_, r)| r.diff).collect(),
                    resol: entries.iter().map(|(_, r)| r.resolution).collect(),
                    refval: entries.iter().map(|(_, r)| r.reference).collect(),
                    steps: entries.iter().map(|(_, r)| r.step).collect(),
                };
                serde_json::to_writer(&mut writer, &entry)?;
            }
        }
        writer.flush()?;
        tracing::debug!("Cached {} entries in {}", entries.len(), path.display());
        Ok(())
    }

    fn store_map(&mut self, key: &VariableKey, field: &DifferenceField) -> Result<()> {
        let path = self.map_path(key);
        let mut writer = self.create(&path)?;
        bincode::serialize_into(&mut writer, field)?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory cache, mostly for tests and one-off runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    errors: HashMap<String, BTreeMap<VariableKey, ErrorRecord>>,
    maps: HashMap<VariableKey, DifferenceField>,
    /// Number of store calls seen.
    pub writes: usize,
}

impl CacheStore for MemoryCache {
    fn load_errors(
        &self,
        variable: &str,
        _dims: Dimensionality,
    ) -> Result<Option<BTreeMap<VariableKey, ErrorRecord>>> {
        Ok(self.errors.get(variable).cloned())
    }

    fn load_map(&self, key: &VariableKey) -> Result<Option<DifferenceField>> {
        Ok(self.maps.get(key).cloned())
    }

    fn store_errors(
        &mut self,
        variable: &str,
        _dims: Dimensionality,
        errors: &BTreeMap<VariableKey, ErrorRecord>,
    ) -> Result<()> {
        let entries = errors
            .iter()
            .filter(|(k, _)| k.name == variable)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        self.errors.insert(variable.to_string(), entries);
        self.writes += 1;
        Ok(())
    }

    fn store_map(&mut self, key: &VariableKey, field: &DifferenceField) -> Result<()> {
        self.maps.insert(key.clone(), field.clone());
        self.writes += 1;
        Ok(())
    }
}

/// Cache that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn load_errors(
        &self,
        _variable: &str,
        _dims: Dimensionality,
    ) -> Result<Option<BTreeMap<VariableKey, ErrorRecord>>> {
        Ok(None)
    }

    fn load_map(&self, _key: &VariableKey) -> Result<Option<DifferenceField>> {
        Ok(None)
    }

    fn store_errors(
        &mut self,
        _variable: &str,
        _dims: Dimensionality,
        _errors: &BTreeMap<VariableKey, ErrorRecord>,
    ) -> Result<()> {
        Ok(())
    }

    fn store_map(&mut self, _key: &VariableKey, _field: &DifferenceField) -> Result<()> {
        Ok(())
    }
}
