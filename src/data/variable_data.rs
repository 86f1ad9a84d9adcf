//! Variable data reading and manipulation.

use crate::error::{CrosscheckError, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use std::collections::HashMap;

/// Loaded variable with its data and metadata.
#[derive(Debug, Clone)]
pub struct LoadedVariable {
    /// Variable name.
    pub name: String,
    /// Shape of the data (redundant with data.shape(), but kept for convenience).
    pub shape: Vec<usize>,
    /// Dimension names.
    pub dim_names: Vec<String>,
    /// Variable attributes.
    pub attributes: HashMap<String, String>,
    /// Coordinate values per dimension, when a coordinate variable exists.
    pub coordinates: Vec<Option<Vec<f64>>>,
    /// The actual multi-dimensional data as f64, with fill values as NaN.
    pub data: ArrayD<f64>,
}

impl LoadedVariable {
    /// Wrap an in-memory array.
    pub fn new(name: impl Into<String>, dim_names: &[&str], data: ArrayD<f64>) -> Self {
        Self {
            name: name.into(),
            shape: data.shape().to_vec(),
            dim_names: dim_names.iter().map(|d| d.to_string()).collect(),
            attributes: HashMap::new(),
            coordinates: vec![None; data.ndim()],
            data,
        }
    }

    /// Attach coordinate values to the dimension called `dim`.
    pub fn with_coordinate(mut self, dim: &str, values: Vec<f64>) -> Self {
        if let Some(i) = self.dim_names.iter().position(|d| d == dim) {
            self.coordinates[i] = Some(values);
        }
        self
    }

    /// Attach an attribute.
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Get the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Length of the leading (time) axis.
    pub fn time_len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// `long_name` attribute, falling back to the variable name.
    pub fn long_name(&self) -> &str {
        self.attributes
            .get("long_name")
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// `units` attribute, empty when absent.
    pub fn units(&self) -> &str {
        self.attributes.get("units").map(String::as_str).unwrap_or("")
    }

    /// View with the leading axes fixed at `indices`.
    ///
    /// Returns `None` when an index is out of range.
    pub fn slice_leading(&self, indices: &[usize]) -> Option<ArrayViewD<'_, f64>> {
        let mut view = self.data.view();
        for &index in indices {
            if view.ndim() == 0 || index >= view.len_of(Axis(0)) {
                return None;
            }
            view = view.index_axis_move(Axis(0), index);
        }
        Some(view)
    }
}

/// Read variable data from an open NetCDF file.
///
/// Returns `Ok(None)` when the file has no variable of that name.
pub fn read_variable(file: &netcdf::File, var_name: &str) -> Result<Option<LoadedVariable>> {
    let Some(var) = file.variable(var_name) else {
        return Ok(None);
    };

    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();

    // Read attributes
    let mut attributes = HashMap::new();
    for attr in var.attributes() {
        attributes.insert(
            attr.name().to_string(),
            crate::data::reader::attr_value_to_string(&attr),
        );
    }

    // Extract scale_factor and add_offset (CF convention)
    let scale_factor = attributes
        .get("scale_factor")
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(1.0);

    let add_offset = attributes
        .get("add_offset")
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fill_value = attributes
        .get("_FillValue")
        .or_else(|| attributes.get("missing_value"))
        .and_then(|s| s.parse::<f64>().ok());

    let mut data = read_variable_array(&var, &shape)?;

    // Attribute strings round-trip through f32 formatting; compare loosely.
    if let Some(fill) = fill_value {
        let tolerance = fill.abs() * 1e-6;
        data.mapv_inplace(|v| if (v - fill).abs() <= tolerance { f64::NAN } else { v });
    }

    // Apply CF scale/offset if present
    if (scale_factor - 1.0).abs() > 0.0 || add_offset != 0.0 {
        data.mapv_inplace(|v| v * scale_factor + add_offset);
    }

    let mut coordinates = Vec::with_capacity(dim_names.len());
    for dim in &dim_names {
        coordinates.push(read_coordinate(file, dim)?);
    }

    Ok(Some(LoadedVariable {
        name: var_name.to_string(),
        shape,
        dim_names,
        attributes,
        coordinates,
        data,
    }))
}

/// Read a one-dimensional coordinate variable, if the file has one.
pub fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Option<Vec<f64>>> {
    let Some(var) = file.variable(name) else {
        return Ok(None);
    };
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    if shape.len() != 1 {
        return Ok(None);
    }
    match read_variable_array(&var, &shape) {
        Ok(values) => Ok(Some(values.iter().copied().collect())),
        // Character coordinates (e.g. labels) carry no ordering we can use.
        Err(CrosscheckError::NetCDF(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn read_variable_array(var: &netcdf::Variable<'_>, shape: &[usize]) -> Result<ArrayD<f64>> {
    let vartype = var.vartype();

    // Helper to build ArrayD<f64> from a Vec<f64> and the known shape
    let from_vec = |v: Vec<f64>| -> Result<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(shape), v)
            .map_err(|e| CrosscheckError::NetCDF(format!("Invalid shape/data size: {}", e)))
    };

    macro_rules! read_as {
        ($t:ty) => {{
            let values: Vec<$t> = var.get_values(..).map_err(|e| {
                CrosscheckError::NetCDF(format!(
                    "Failed to read {} data: {}",
                    stringify!($t),
                    e
                ))
            })?;
            from_vec(values.into_iter().map(|x| x as f64).collect())
        }};
    }

    match vartype {
        NcVariableType::Float(FloatType::F64) => read_as!(f64),
        NcVariableType::Float(FloatType::F32) => read_as!(f32),
        NcVariableType::Int(IntType::I64) => read_as!(i64),
        NcVariableType::Int(IntType::I32) => read_as!(i32),
        NcVariableType::Int(IntType::I16) => read_as!(i16),
        NcVariableType::Int(IntType::I8) => read_as!(i8),
        NcVariableType::Int(IntType::U64) => read_as!(u64),
        NcVariableType::Int(IntType::U32) => read_as!(u32),
        NcVariableType::Int(IntType::U16) => read_as!(u16),
        NcVariableType::Int(IntType::U8) => read_as!(u8),
        NcVariableType::Char | NcVariableType::String => Err(CrosscheckError::NetCDF(
            "Character/string data cannot be compared".to_string(),
        )),
        _ => Err(CrosscheckError::NetCDF(format!(
            "Unsupported variable type: {:?}",
            vartype
        ))),
    }
}
