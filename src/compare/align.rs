//! Mapping stream steps onto the target dataset's time axis.
//!
//! The record stream has no explicit time index. Consecutive records sharing
//! a step token form one logical step, counted from 1, and a strategy maps
//! the step counter to a time index of the target dataset. The leading steps
//! of a stream are initialisation output with no counterpart in the target,
//! so the I/O server strategies report them as not yet alignable.

use crate::error::{CrosscheckError, Result};
use std::fmt;
use std::str::FromStr;

/// Whether a variable has one map per step or one profile of levels per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimensionality {
    /// One horizontal field per step.
    #[default]
    TwoD,
    /// One field per model level per step.
    ThreeD,
}

impl Dimensionality {
    /// Parse the `--dims` command-line value.
    pub fn from_count(dims: u8) -> Option<Self> {
        match dims {
            2 => Some(Self::TwoD),
            3 => Some(Self::ThreeD),
            _ => None,
        }
    }
}

/// Named convention for aligning the 1-based step counter with the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentStrategy {
    /// Step `c` is time index `c - 1`.
    Identity,
    /// The first `n` steps are skipped, then step `c` is index `c - 1 - n`.
    Offset(usize),
    /// Step `c` is index `c - 2` for 2-D fields. Profiles are written every
    /// other step: odd steps from 3 on map to `(c - 3) / 2`.
    Parity,
    /// `parity`, except that time index 0 (the initial state written by the
    /// I/O server) is never compared.
    #[default]
    Xios,
}

impl AlignmentStrategy {
    /// Target time index for a step, or `None` if the step is not alignable.
    pub fn align(self, counter: usize, dims: Dimensionality) -> Option<usize> {
        match self {
            Self::Identity => counter.checked_sub(1),
            Self::Offset(n) => counter.checked_sub(n + 1),
            Self::Parity => match dims {
                Dimensionality::TwoD => counter.checked_sub(2),
                Dimensionality::ThreeD if counter % 2 == 0 => None,
                Dimensionality::ThreeD => counter.checked_sub(3).map(|c| c / 2),
            },
            Self::Xios => Self::Parity.align(counter, dims).filter(|&t| t > 0),
        }
    }
}

impl FromStr for AlignmentStrategy {
    type Err = CrosscheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Self::Identity),
            "parity" => Ok(Self::Parity),
            "xios" => Ok(Self::Xios),
            "offset" => Ok(Self::Offset(2)),
            _ => s
                .strip_prefix("offset:")
                .and_then(|n| n.parse().ok())
                .map(Self::Offset)
                .ok_or_else(|| CrosscheckError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for AlignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Offset(n) => write!(f, "offset:{}", n),
            Self::Parity => write!(f, "parity"),
            Self::Xios => write!(f, "xios"),
        }
    }
}

/// Turns a sequence of step tokens into a 1-based logical step counter.
///
/// The first token opens step 1; every change of token opens the next step.
/// A counter of 0 means no record has been observed yet.
#[derive(Debug, Clone, Default)]
pub struct StepTracker {
    previous: Option<i64>,
    counter: usize,
}

impl StepTracker {
    /// Record the token of the next record and return its step counter.
    pub fn observe(&mut self, token: i64) -> usize {
        if self.previous != Some(token) {
            self.counter += 1;
        }
        self.previous = Some(token);
        self.counter
    }
}
