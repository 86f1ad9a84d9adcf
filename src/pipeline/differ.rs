//! Differences between arrays that describe the same field with slightly
//! different shapes.
//!
//! Converted fields and target fields may disagree on how many time steps or
//! levels they hold and on the direction of a spatial axis. Those differences
//! are reconciled; anything else is a grid mismatch.

use crate::data::LoadedVariable;
use crate::error::{CrosscheckError, Result};
use ndarray::{ArrayD, Axis, Slice};

/// Role of an axis, decided from its dimension name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    /// Time axis.
    Time,
    /// Vertical axis.
    Vertical,
    /// Horizontal axis.
    Spatial,
}

impl AxisKind {
    /// Classify a dimension name.
    pub fn of(dim_name: &str) -> Self {
        let name = dim_name.to_ascii_lowercase();
        if name == "t" || name.starts_with("time") || name == "valid_time" {
            return Self::Time;
        }
        let exact = ["z", "alt", "nlev", "hybrid", "isobaric", "isobaricinhpa"];
        let prefixes = ["lev", "plev", "height", "depth", "model_level"];
        if exact.contains(&name.as_str()) || prefixes.iter().any(|p| name.starts_with(p)) {
            return Self::Vertical;
        }
        Self::Spatial
    }
}

/// `target − check` after reconciling the two shapes.
///
/// Along time and vertical axes the longer side drops its leading excess.
/// A spatial axis whose coordinate ordering differs between the two is
/// reversed on the check side.
pub fn reconcile_diff(target: &LoadedVariable, check: &LoadedVariable) -> Result<ArrayD<f64>> {
    let mismatch = || CrosscheckError::GridMismatch {
        variable: target.name.clone(),
        target: spatial_shape(target),
        check: spatial_shape(check),
    };

    if target.ndim() != check.ndim() {
        return Err(mismatch());
    }

    let mut t = target.data.view();
    let mut c = check.data.view();

    for axis in 0..target.ndim() {
        let kind = AxisKind::of(&target.dim_names[axis]);
        if AxisKind::of(&check.dim_names[axis]) != kind {
            return Err(mismatch());
        }
        let (lt, lc) = (t.len_of(Axis(axis)), c.len_of(Axis(axis)));

        match kind {
            AxisKind::Time | AxisKind::Vertical => {
                let n = lt.min(lc);
                if lt != lc {
                    tracing::debug!(
                        "{}: dropping {} leading entries of {}",
                        target.name,
                        lt.max(lc) - n,
                        target.dim_names[axis]
                    );
                }
                t.slice_axis_inplace(Axis(axis), Slice::from(lt - n..));
                c.slice_axis_inplace(Axis(axis), Slice::from(lc - n..));
            }
            AxisKind::Spatial => {
                if lt != lc {
                    return Err(mismatch());
                }
                let order = |v: &LoadedVariable| {
                    v.coordinates[axis].as_deref().and_then(direction)
                };
                if let (Some(a), Some(b)) = (order(target), order(check)) {
                    if a != b {
                        tracing::debug!("{}: reversing {}", target.name, check.dim_names[axis]);
                        c.invert_axis(Axis(axis));
                    }
                }
            }
        }
    }

    Ok(&t - &c)
}

fn spatial_shape(var: &LoadedVariable) -> Vec<usize> {
    var.dim_names
        .iter()
        .zip(&var.shape)
        .filter(|(name, _)| AxisKind::of(name) == AxisKind::Spatial)
        .map(|(_, &len)| len)
        .collect()
}

/// `Some(true)` for ascending, `Some(false)` for descending values.
fn direction(values: &[f64]) -> Option<bool> {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if first != last => Some(last > first),
        _ => None,
    }
}
