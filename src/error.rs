//! Error types for Crosscheck.
//!
//! This module provides a unified error handling approach using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Crosscheck operations.
pub type Result<T> = std::result::Result<T, CrosscheckError>;

/// Errors that can occur in Crosscheck.
#[derive(Debug, Error)]
pub enum CrosscheckError {
    /// Failed to open a file.
    #[error("Failed to open file: {path}")]
    FileOpen {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed GRIB message.
    #[error("GRIB decode error at byte {offset}: {reason}")]
    Decode {
        /// Byte offset of the message in its stream.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Packing scheme the decoder cannot unpack.
    #[error("Unsupported packing: {0}")]
    UnsupportedPacking(String),

    /// Failed to read or write a NetCDF file.
    #[error("NetCDF error: {0}")]
    NetCDF(String),

    /// Staging directory already holds files.
    #[error("Staging directory is not empty: {path}")]
    StagingNotEmpty {
        /// Offending directory.
        path: PathBuf,
    },

    /// Spatial grids of two fields cannot be matched without regridding.
    #[error("Grid mismatch for {variable}: target {target:?} vs check {check:?}")]
    GridMismatch {
        /// Variable being compared.
        variable: String,
        /// Spatial shape on the target side.
        target: Vec<usize>,
        /// Spatial shape on the converted side.
        check: Vec<usize>,
    },

    /// Variable not present in a dataset.
    #[error("Variable '{variable}' not found in {dataset}")]
    VariableMissing {
        /// Variable name.
        variable: String,
        /// Dataset description (usually a path).
        dataset: String,
    },

    /// Output frequency token not understood.
    #[error("Unknown output frequency: {0}")]
    UnknownFrequency(String),

    /// Alignment strategy name not understood.
    #[error("Unknown alignment strategy: {0}")]
    UnknownStrategy(String),

    /// External transform failed.
    #[error("Transform of {variable} failed: {reason}")]
    Transform {
        /// Variable being transformed.
        variable: String,
        /// Failure description.
        reason: String,
    },

    /// Worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Cache file could not be (de)serialized.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid input path pattern.
    #[error("Invalid path pattern: {0}")]
    Pattern(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrosscheckError {
    /// Create a FileOpen error.
    pub fn file_open(path: PathBuf, source: std::io::Error) -> Self {
        Self::FileOpen { path, source }
    }

    /// Create a Decode error.
    pub fn decode(offset: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a VariableMissing error.
    pub fn variable_missing(variable: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self::VariableMissing {
            variable: variable.into(),
            dataset: dataset.into(),
        }
    }

    /// Create a Transform error.
    pub fn transform(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            variable: variable.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure concerns a single variable rather than the run.
    pub fn is_per_variable(&self) -> bool {
        matches!(
            self,
            Self::GridMismatch { .. }
                | Self::VariableMissing { .. }
                | Self::UnknownFrequency(_)
                | Self::Transform { .. }
                | Self::UnsupportedPacking(_)
        )
    }
}

impl From<netcdf::Error> for CrosscheckError {
    fn from(err: netcdf::Error) -> Self {
        Self::NetCDF(err.to_string())
    }
}

impl From<serde_json::Error> for CrosscheckError {
    fn from(err: serde_json::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<bincode::Error> for CrosscheckError {
    fn from(err: bincode::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CrosscheckError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(err.to_string())
    }
}

impl From<glob::PatternError> for CrosscheckError {
    fn from(err: glob::PatternError) -> Self {
        Self::Pattern(err.to_string())
    }
}
