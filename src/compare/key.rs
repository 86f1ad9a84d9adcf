//! Comparison keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one comparison unit: a variable, and for three-dimensional
/// fields the model level.
///
/// Ordering is by name, then level, with two-dimensional keys first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableKey {
    /// Short name of the variable.
    pub name: String,
    /// Vertical level, absent for two-dimensional variables.
    pub level: Option<i64>,
}

impl VariableKey {
    /// Key of a two-dimensional variable.
    pub fn surface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: None,
        }
    }

    /// Key of one level of a three-dimensional variable.
    pub fn at_level(name: impl Into<String>, level: i64) -> Self {
        Self {
            name: name.into(),
            level: Some(level),
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) => write!(f, "{}@{}", self.name, level),
            None => f.write_str(&self.name),
        }
    }
}
