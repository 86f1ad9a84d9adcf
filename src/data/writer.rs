//! NetCDF output for validation results.

use super::LoadedVariable;
use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

/// Attributes carried over from the target variable.
const COPIED_ATTRIBUTES: [&str; 2] = ["long_name", "units"];

/// Write variables into a new NetCDF file.
///
/// Dimensions are shared by name. When two variables disagree on the length
/// of a dimension, the later one gets a `<name>_<len>` dimension instead.
pub fn write_dataset(path: &Path, variables: &[LoadedVariable]) -> Result<()> {
    let mut file = netcdf::create(path)?;
    let mut dims: HashMap<String, usize> = HashMap::new();

    for var in variables {
        let mut names = Vec::with_capacity(var.dim_names.len());
        for (dim, &len) in var.dim_names.iter().zip(&var.shape) {
            let name = match dims.get(dim) {
                Some(&existing) if existing == len => dim.clone(),
                Some(_) => format!("{}_{}", dim, len),
                None => dim.clone(),
            };
            if !dims.contains_key(&name) {
                file.add_dimension(&name, len)?;
                dims.insert(name.clone(), len);
            }
            names.push(name);
        }

        let dim_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut nc_var = file.add_variable::<f64>(&var.name, &dim_refs)?;
        for key in COPIED_ATTRIBUTES {
            if let Some(value) = var.attributes.get(key) {
                nc_var.put_attribute(key, value.as_str())?;
            }
        }
        let values: Vec<f64> = var.data.iter().copied().collect();
        nc_var.put_values(&values, ..)?;
        tracing::debug!("Wrote {} {:?} to {}", var.name, var.shape, path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NetcdfDataset, TargetDataset};
    use ndarray::{Array, IxDyn};

    #[test]
    fn writes_and_reads_back_with_conflicting_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation.nc");

        let a = LoadedVariable::new(
            "2t",
            &["time", "lat"],
            Array::from_shape_fn(IxDyn(&[2, 3]), |ix| (ix[0] * 3 + ix[1]) as f64),
        )
        .with_attribute("units", "K");
        let b = LoadedVariable::new("sp", &["time", "lat"], Array::zeros(IxDyn(&[1, 3])));
        write_dataset(&path, &[a, b]).unwrap();

        let ds = NetcdfDataset::open(&path).unwrap();
        let t = ds.variable("2t").unwrap().unwrap();
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.units(), "K");
        assert_eq!(t.data[[1, 2]], 5.0);

        let sp = ds.variable("sp").unwrap().unwrap();
        assert_eq!(sp.dim_names, vec!["time_1".to_string(), "lat".to_string()]);
    }
}
