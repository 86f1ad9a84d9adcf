//! Parallel transform stage.

use super::{FieldTransform, SplitEntry};
use crate::config::PipelineConfig;
use crate::error::Result;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// Result of transforming one staging file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Converted file written to this path.
    Converted(PathBuf),
    /// Not attempted.
    Skipped(String),
    /// Attempted and failed.
    Failed(String),
}

impl TaskOutcome {
    /// Path of the converted file, if any.
    pub fn converted(&self) -> Option<&PathBuf> {
        match self {
            Self::Converted(path) => Some(path),
            _ => None,
        }
    }
}

/// Transform every manifest entry on a pool of `config.workers` threads.
///
/// Outcomes come back in manifest order. A failing or panicking task only
/// affects its own outcome.
pub fn run_transforms(
    entries: &[SplitEntry],
    transform: &dyn FieldTransform,
    config: &PipelineConfig,
) -> Result<Vec<TaskOutcome>> {
    let workers = config.workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("transform-{}", i))
        .build()?;
    tracing::info!("Transforming {} file(s) on {} worker(s)", entries.len(), workers);

    let outcomes: Vec<TaskOutcome> = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| run_task(entry, transform, config))
            .collect()
    });

    for (entry, outcome) in entries.iter().zip(&outcomes) {
        match outcome {
            TaskOutcome::Converted(path) => {
                tracing::debug!("{} -> {}", entry.path.display(), path.display())
            }
            TaskOutcome::Skipped(reason) => tracing::warn!("Skipped {}: {}", entry.label(), reason),
            TaskOutcome::Failed(reason) => tracing::warn!("Failed {}: {}", entry.label(), reason),
        }
    }
    Ok(outcomes)
}

fn run_task(entry: &SplitEntry, transform: &dyn FieldTransform, config: &PipelineConfig) -> TaskOutcome {
    let frequency = match config.frequency(&entry.variable) {
        Ok(frequency) => frequency,
        Err(e) => return TaskOutcome::Skipped(e.to_string()),
    };
    let output = entry.path.with_extension("nc");

    match panic::catch_unwind(AssertUnwindSafe(|| transform.run(entry, frequency, &output))) {
        Ok(Ok(())) => TaskOutcome::Converted(output),
        Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
        Err(payload) => TaskOutcome::Failed(format!("transform panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
