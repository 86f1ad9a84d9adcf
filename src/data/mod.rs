//! Target dataset reading and result writing.
//!
//! This module handles reading the NetCDF side of a comparison into
//! `ndarray` arrays, and writing the combined validation dataset.

mod dataset;
mod reader;
mod variable_data;
mod writer;

pub use dataset::{DatasetCollection, MemoryDataset, TargetDataset};
pub use reader::NetcdfDataset;
pub use variable_data::{read_coordinate, read_variable, LoadedVariable};
pub use writer::write_dataset;
