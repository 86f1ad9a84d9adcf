//! Plain-text result tables.

use crate::compare::{ComparisonResult, Dimensionality};
use crate::pipeline::PipelineReport;

/// Format a count with thousand separators.
pub fn format_count(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a difference or resolution with magnitude-dependent precision.
pub fn format_value(val: f64) -> String {
    if !val.is_finite() {
        return if val.is_nan() {
            "NaN".to_string()
        } else if val.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        };
    }
    let abs_val = val.abs();
    if abs_val == 0.0 {
        "0".to_string()
    } else if !(1e-3..1e6).contains(&abs_val) {
        format!("{:.3e}", val)
    } else if abs_val >= 100.0 {
        format!("{:.2}", val)
    } else if abs_val >= 1.0 {
        format!("{:.4}", val)
    } else {
        format!("{:.5}", val)
    }
}

/// Error table of a comparison, one line per key, header first.
pub fn error_table(result: &ComparisonResult, dims: Dimensionality) -> Vec<String> {
    let mut lines = Vec::with_capacity(result.errors.len() + 1);
    match dims {
        Dimensionality::TwoD => lines.push(format!(
            "{:>20}{:>20}{:>20}{:>20}",
            "variable", "abs. diff.", "grb. err.", "ref. val."
        )),
        Dimensionality::ThreeD => lines.push(format!(
            "{:>20}{:>20}{:>20}{:>20}{:>20}",
            "variable", "level", "abs. diff.", "grb. err.", "ref. val."
        )),
    }

    for (key, record) in &result.errors {
        let diff = format_value(record.diff);
        let resolution = format_value(record.resolution);
        let reference = format_value(record.reference);
        match (dims, key.level) {
            (Dimensionality::ThreeD, Some(level)) => lines.push(format!(
                "{:>20}{:>20}{:>20}{:>20}{:>20}",
                key.name, level, diff, resolution, reference
            )),
            _ => lines.push(format!(
                "{:>20}{:>20}{:>20}{:>20}",
                key.name, diff, resolution, reference
            )),
        }
    }
    lines
}

/// Summary of a pipeline run, one line per variable and per skip.
pub fn pipeline_table(report: &PipelineReport) -> Vec<String> {
    let mut lines = vec![format!("{:>20}{:>20}{:>20}", "variable", "max |diff|", "points")];
    for summary in &report.summaries {
        let points: usize = summary.shape.iter().product();
        lines.push(format!(
            "{:>20}{:>20}{:>20}",
            summary.label,
            format_value(summary.max_abs),
            format_count(points)
        ));
    }
    for (label, reason) in &report.skipped {
        lines.push(format!("{:>20}  skipped: {}", label, reason));
    }
    lines
}

/// Log the lines through `tracing` and print them.
pub fn emit(lines: &[String]) {
    for line in lines {
        tracing::info!("{}", line);
        println!("{}", line);
    }
}
