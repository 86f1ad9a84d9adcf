//! Run configuration.
//!
//! Both modes take their settings as plain structs built by the command line;
//! nothing is read from process-wide state.

use crate::compare::{AlignmentStrategy, Dimensionality};
use crate::error::{CrosscheckError, Result};
use crate::grib::LevelType;
use crate::pipeline::Frequency;
use std::collections::HashMap;
use std::path::PathBuf;

/// Two-dimensional variables compared by default.
pub const SURFACE_VARIABLES: [&str; 11] = [
    "2t", "10u", "10v", "msl", "sp", "tclv", "tcww", "tcc", "cp", "lsp", "ci",
];

/// Two-dimensional variables whose full difference field is kept.
pub const MAP_VARIABLES: [&str; 3] = ["10v", "sp", "cp"];

/// Three-dimensional variables compared by default.
pub const PROFILE_VARIABLES: [&str; 3] = ["q", "clwc", "cc"];

/// Settings of a streaming comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareConfig {
    /// Whether records are compared per map or per model level.
    pub dims: Dimensionality,
    /// Variables to compare.
    pub variables: Vec<String>,
    /// Variables whose full difference field is kept for maps.
    pub map_variables: Vec<String>,
    /// How stream steps map to dataset time indices.
    pub alignment: AlignmentStrategy,
    /// Divide the encoding resolution by the reference value.
    pub normalize_resolution: bool,
    /// Only compare records on this level type, when set.
    pub level_type: Option<LevelType>,
    /// Where cache files live; `None` means next to the target dataset.
    pub cache_dir: Option<PathBuf>,
    /// Read and write the cache at all.
    pub use_cache: bool,
}

impl CompareConfig {
    /// Defaults for two-dimensional fields.
    pub fn surface() -> Self {
        Self {
            dims: Dimensionality::TwoD,
            variables: SURFACE_VARIABLES.iter().map(|s| s.to_string()).collect(),
            map_variables: MAP_VARIABLES.iter().map(|s| s.to_string()).collect(),
            alignment: AlignmentStrategy::Xios,
            normalize_resolution: false,
            level_type: None,
            cache_dir: None,
            use_cache: true,
        }
    }

    /// Defaults for model-level profiles.
    pub fn profile() -> Self {
        Self {
            dims: Dimensionality::ThreeD,
            variables: PROFILE_VARIABLES.iter().map(|s| s.to_string()).collect(),
            map_variables: Vec::new(),
            level_type: Some(LevelType::Hybrid),
            ..Self::surface()
        }
    }

    /// Defaults for the given dimensionality.
    pub fn for_dims(dims: Dimensionality) -> Self {
        match dims {
            Dimensionality::TwoD => Self::surface(),
            Dimensionality::ThreeD => Self::profile(),
        }
    }

    /// Every variable the pass may need to read, compared or mapped.
    pub fn requested(&self) -> impl Iterator<Item = &String> {
        self.variables
            .iter()
            .chain(self.map_variables.iter().filter(|m| !self.variables.contains(m)))
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self::surface()
    }
}

/// Settings of a split-transform-diff run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory the stream is split into; must be empty.
    pub staging_dir: PathBuf,
    /// Number of concurrent transform tasks.
    pub workers: usize,
    /// Output frequency applied when a variable has no override.
    pub default_frequency: String,
    /// Per-variable output frequency tokens.
    pub frequency_overrides: HashMap<String, String>,
    /// Only split these variables, when non-empty.
    pub variables: Vec<String>,
    /// Level types dropped while splitting.
    pub excluded_level_types: Vec<LevelType>,
    /// Combined validation dataset written at the end.
    pub output: PathBuf,
    /// External transform executable.
    pub transform_program: PathBuf,
}

impl PipelineConfig {
    /// Frequency token configured for a variable.
    pub fn frequency_token(&self, variable: &str) -> &str {
        self.frequency_overrides
            .get(variable)
            .map(String::as_str)
            .unwrap_or(&self.default_frequency)
    }

    /// Parsed frequency for a variable.
    pub fn frequency(&self, variable: &str) -> Result<Frequency> {
        self.frequency_token(variable).parse()
    }

    /// Whether a variable passes the split filter.
    pub fn wants(&self, variable: &str) -> bool {
        self.variables.is_empty() || self.variables.iter().any(|v| v == variable)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./tmp"),
            workers: 1,
            default_frequency: "6h".to_string(),
            frequency_overrides: HashMap::new(),
            variables: Vec::new(),
            excluded_level_types: vec![LevelType::DepthBelowLandLayer],
            output: PathBuf::from("validation.nc"),
            transform_program: PathBuf::from("cdo"),
        }
    }
}

/// Expand command-line path arguments.
///
/// Arguments without glob metacharacters are taken literally; a pattern that
/// matches nothing is an error. Matches of one pattern are sorted.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if !pattern.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            paths.push(PathBuf::from(pattern));
            continue;
        }
        let mut matched = Vec::new();
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(path) => matched.push(path),
                Err(e) => tracing::warn!("Ignoring unreadable match of {}: {}", pattern, e),
            }
        }
        if matched.is_empty() {
            return Err(CrosscheckError::Pattern(format!("{} matches no files", pattern)));
        }
        matched.sort();
        paths.append(&mut matched);
    }
    Ok(paths)
}
