//! Split-transform-diff validation.
//!
//! The record stream is split into one staging file per variable and level
//! class, each file is converted by an external tool on a worker pool, and
//! the converted fields are differenced against the target dataset.

mod differ;
mod pool;
mod runner;
mod splitter;
mod transform;

pub use differ::{reconcile_diff, AxisKind};
pub use pool::{run_transforms, TaskOutcome};
pub use runner::{diff_stage, run_pipeline, PipelineReport, VariableSummary};
pub use splitter::{prepare_staging, split_files, split_records, SplitEntry, SplitManifest};
pub use transform::{CdoTransform, FieldTransform, Frequency};
