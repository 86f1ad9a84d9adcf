//! NetCDF file reader.

use super::{read_coordinate, read_variable, LoadedVariable, TargetDataset};
use crate::error::{CrosscheckError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A NetCDF file opened for comparison.
///
/// Variables are read whole on first access and kept for the lifetime of
/// the dataset, since a comparison pass touches each one many times.
pub struct NetcdfDataset {
    path: PathBuf,
    file: netcdf::File,
    loaded: RefCell<HashMap<String, Rc<LoadedVariable>>>,
}

impl fmt::Debug for NetcdfDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcdfDataset")
            .field("path", &self.path)
            .field("loaded", &self.loaded.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NetcdfDataset {
    /// Open a NetCDF file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = netcdf::open(path).map_err(|e| {
            CrosscheckError::NetCDF(format!("Failed to open {}: {}", path.display(), e))
        })?;
        tracing::debug!("Opened target dataset {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            loaded: RefCell::new(HashMap::new()),
        })
    }

    /// Path the dataset was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all variables in the file.
    pub fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name().to_string()).collect()
    }
}

impl TargetDataset for NetcdfDataset {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn variable(&self, name: &str) -> Result<Option<Rc<LoadedVariable>>> {
        if let Some(var) = self.loaded.borrow().get(name) {
            return Ok(Some(Rc::clone(var)));
        }
        let Some(var) = read_variable(&self.file, name)? else {
            return Ok(None);
        };
        tracing::debug!("Loaded {} {:?} from {}", name, var.shape, self.path.display());
        let var = Rc::new(var);
        self.loaded
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&var));
        Ok(Some(var))
    }

    fn coordinate(&self, name: &str) -> Result<Option<Vec<f64>>> {
        read_coordinate(&self.file, name)
    }
}

/// Render an attribute value as text.
pub(crate) fn attr_value_to_string(attr: &netcdf::Attribute<'_>) -> String {
    use netcdf::AttributeValue;

    match attr.value() {
        Ok(AttributeValue::Uchar(v)) => format!("{}", v),
        Ok(AttributeValue::Schar(v)) => format!("{}", v),
        Ok(AttributeValue::Ushort(v)) => format!("{}", v),
        Ok(AttributeValue::Short(v)) => format!("{}", v),
        Ok(AttributeValue::Uint(v)) => format!("{}", v),
        Ok(AttributeValue::Int(v)) => format!("{}", v),
        Ok(AttributeValue::Ulonglong(v)) => format!("{}", v),
        Ok(AttributeValue::Longlong(v)) => format!("{}", v),
        Ok(AttributeValue::Float(v)) => format!("{}", v),
        Ok(AttributeValue::Double(v)) => format!("{}", v),
        Ok(AttributeValue::Str(v)) => v,
        Ok(AttributeValue::Uchars(v)) => format!("{:?}", v),
        Ok(AttributeValue::Schars(v)) => format!("{:?}", v),
        Ok(AttributeValue::Ushorts(v)) => format!("{:?}", v),
        Ok(AttributeValue::Shorts(v)) => format!("{:?}", v),
        Ok(AttributeValue::Uints(v)) => format!("{:?}", v),
        Ok(AttributeValue::Ints(v)) => format!("{:?}", v),
        Ok(AttributeValue::Ulonglongs(v)) => format!("{:?}", v),
        Ok(AttributeValue::Longlongs(v)) => format!("{:?}", v),
        Ok(AttributeValue::Floats(v)) => format!("{:?}", v),
        Ok(AttributeValue::Doubles(v)) => format!("{:?}", v),
        Ok(AttributeValue::Strs(v)) => v.join(", "),
        Err(_) => format!("{:?}", attr),
    }
}
