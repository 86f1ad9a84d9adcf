//! Target dataset abstraction.

use super::LoadedVariable;
use crate::error::Result;
use std::collections::HashMap;
use std::rc::Rc;

/// A time-indexed dataset variables can be looked up in by name.
pub trait TargetDataset {
    /// Human-readable description (usually the file path).
    fn describe(&self) -> String;

    /// Look up a variable. `Ok(None)` when it does not exist.
    fn variable(&self, name: &str) -> Result<Option<Rc<LoadedVariable>>>;

    /// Look up a one-dimensional coordinate variable.
    fn coordinate(&self, name: &str) -> Result<Option<Vec<f64>>>;
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    name: String,
    variables: HashMap<String, Rc<LoadedVariable>>,
    coordinates: HashMap<String, Vec<f64>>,
}

impl MemoryDataset {
    /// Create an empty dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a variable, replacing any with the same name.
    pub fn insert(&mut self, variable: LoadedVariable) {
        self.variables
            .insert(variable.name.clone(), Rc::new(variable));
    }

    /// Add a coordinate variable.
    pub fn insert_coordinate(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.coordinates.insert(name.into(), values);
    }
}

impl TargetDataset for MemoryDataset {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn variable(&self, name: &str) -> Result<Option<Rc<LoadedVariable>>> {
        Ok(self.variables.get(name).cloned())
    }

    fn coordinate(&self, name: &str) -> Result<Option<Vec<f64>>> {
        Ok(self.coordinates.get(name).cloned())
    }
}

/// Several datasets searched in order; the first one holding a name wins.
#[derive(Debug, Default)]
pub struct DatasetCollection<D> {
    members: Vec<D>,
}

impl<D: TargetDataset> DatasetCollection<D> {
    /// Wrap a list of datasets.
    pub fn new(members: Vec<D>) -> Self {
        Self { members }
    }

    /// Number of member datasets.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<D: TargetDataset> TargetDataset for DatasetCollection<D> {
    fn describe(&self) -> String {
        self.members
            .iter()
            .map(TargetDataset::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn variable(&self, name: &str) -> Result<Option<Rc<LoadedVariable>>> {
        for member in &self.members {
            if let Some(var) = member.variable(name)? {
                return Ok(Some(var));
            }
        }
        Ok(None)
    }

    fn coordinate(&self, name: &str) -> Result<Option<Vec<f64>>> {
        for member in &self.members {
            if let Some(values) = member.coordinate(name)? {
                return Ok(Some(values));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn single(name: &str, var: &str) -> MemoryDataset {
        let mut ds = MemoryDataset::new(name);
        ds.insert(LoadedVariable::new(var, &["time"], ArrayD::zeros(IxDyn(&[1]))));
        ds
    }

    #[test]
    fn collection_searches_members_in_order() {
        let mut first = single("a.nc", "2t");
        first.insert_coordinate("lat", vec![1.0]);
        let second = single("b.nc", "q");
        let collection = DatasetCollection::new(vec![first, second]);

        assert!(collection.variable("q").unwrap().is_some());
        assert!(collection.variable("2t").unwrap().is_some());
        assert!(collection.variable("cc").unwrap().is_none());
        assert_eq!(collection.coordinate("lat").unwrap(), Some(vec![1.0]));
        assert_eq!(collection.describe(), "a.nc, b.nc");
    }
}
