//! Crosscheck - cross-validation of GRIB model output against netCDF output.
//!
//! A weather model writes the same fields twice: as a GRIB record stream and
//! through its I/O server as time-indexed netCDF. Crosscheck compares the two
//! and reports, per variable (and per level for profiles), the largest
//! pointwise difference next to the GRIB encoding resolution.
//!
//! Two modes are provided:
//!
//! - [`compare`]: a single pass over the record stream, aligning each record
//!   to a time index of the netCDF dataset and keeping the worst mismatch.
//! - [`pipeline`]: split the stream per variable, convert each part with an
//!   external tool on a worker pool, and difference whole arrays.
//!
//! # Example
//!
//! ```ignore
//! use crosscheck::cache::NoCache;
//! use crosscheck::compare::compare;
//! use crosscheck::config::CompareConfig;
//! use crosscheck::data::NetcdfDataset;
//! use std::path::{Path, PathBuf};
//!
//! let dataset = NetcdfDataset::open(Path::new("xios_6h.nc"))?;
//! let result = compare(
//!     &[PathBuf::from("ICMGG+000000")],
//!     &dataset,
//!     &mut NoCache,
//!     &CompareConfig::surface(),
//! )?;
//! for (key, error) in &result.errors {
//!     println!("{} {}", key, error.diff);
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]

pub mod cache;
pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod grib;
pub mod pipeline;
pub mod report;

pub use error::{CrosscheckError, Result};
