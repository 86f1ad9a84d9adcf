//! Streaming comparison of GRIB records against a target dataset.
//!
//! Records are aligned to the target's time axis by a configurable
//! [`AlignmentStrategy`], compared pointwise, and reduced to the worst
//! mismatch per [`VariableKey`].

mod accumulator;
mod align;
mod engine;
mod key;
mod regrid;

pub use accumulator::{ErrorAccumulator, ErrorRecord, Offer, RawDifference, Sample};
pub use align::{AlignmentStrategy, Dimensionality, StepTracker};
pub use engine::{
    compare, compare_stream, compute, merge, plan, CachePlan, ComparisonResult, FreshResults,
    PassStats, SkipLog, SkipReason,
};
pub use key::VariableKey;
pub use regrid::{DifferenceField, Geometry};
