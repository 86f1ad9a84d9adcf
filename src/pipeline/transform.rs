//! External field transforms.
//!
//! Staged GRIB files are converted to NetCDF on a grid-point representation
//! and aggregated to the output frequency of the target dataset.

use super::SplitEntry;
use crate::error::{CrosscheckError, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Output frequency of a target variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Instantaneous output every `n` hours, `n` dividing 24.
    Hours(u32),
    /// Daily means.
    Daily,
    /// Monthly means.
    Monthly,
}

impl Frequency {
    /// CDO operator producing this frequency from hourly-or-finer input.
    pub fn operator(self) -> String {
        match self {
            Self::Hours(1) => "copy".to_string(),
            Self::Hours(n) => {
                let hours: Vec<String> = (0..24).step_by(n as usize).map(|h| h.to_string()).collect();
                format!("selhour,{}", hours.join(","))
            }
            Self::Daily => "daymean".to_string(),
            Self::Monthly => "monmean".to_string(),
        }
    }
}

impl FromStr for Frequency {
    type Err = CrosscheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" | "1d" | "daily" => return Ok(Self::Daily),
            "mon" | "1m" | "monthly" => return Ok(Self::Monthly),
            _ => {}
        }
        s.strip_suffix('h')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|&n| n > 0 && 24 % n == 0)
            .map(Self::Hours)
            .ok_or_else(|| CrosscheckError::UnknownFrequency(s.to_string()))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hours(n) => write!(f, "{}h", n),
            Self::Daily => write!(f, "day"),
            Self::Monthly => write!(f, "mon"),
        }
    }
}

/// Converts one staged file into a NetCDF file at `output`.
pub trait FieldTransform: Send + Sync {
    /// Verify the transform can run at all. Called once, before any work.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Run the conversion.
    fn run(&self, entry: &SplitEntry, frequency: Frequency, output: &Path) -> Result<()>;
}

/// Transform driven by the `cdo` command-line tool.
#[derive(Debug, Clone)]
pub struct CdoTransform {
    program: PathBuf,
}

impl CdoTransform {
    /// Transform running `program`, looked up on `PATH` unless it is a path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Executable the transform runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments of one invocation.
    pub fn arguments(
        frequency: Frequency,
        spectral: bool,
        input: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "nc4".into(),
            "-t".into(),
            "ecmwf".into(),
            frequency.operator().into(),
        ];
        if spectral {
            args.push("-sp2gpl".into());
        }
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl FieldTransform for CdoTransform {
    fn check(&self) -> Result<()> {
        let resolved = which::which(&self.program).map_err(|e| {
            CrosscheckError::transform(
                "*",
                format!("cannot find {}: {}", self.program.display(), e),
            )
        })?;
        tracing::info!("Using transform program {}", resolved.display());
        Ok(())
    }

    fn run(&self, entry: &SplitEntry, frequency: Frequency, output: &Path) -> Result<()> {
        let args = Self::arguments(frequency, entry.spectral, &entry.path, output);
        tracing::debug!("{} {:?}", self.program.display(), args);

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| CrosscheckError::transform(&entry.variable, e.to_string()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CrosscheckError::transform(
                &entry.variable,
                format!("{}: {}", result.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_tokens() {
        assert_eq!("6h".parse::<Frequency>().unwrap(), Frequency::Hours(6));
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("1d".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("1m".parse::<Frequency>().unwrap(), Frequency::Monthly);
        for bad in ["5h", "0h", "h", "weekly", ""] {
            assert!(matches!(
                bad.parse::<Frequency>(),
                Err(CrosscheckError::UnknownFrequency(_))
            ));
        }
    }

    #[test]
    fn operators() {
        assert_eq!(Frequency::Hours(1).operator(), "copy");
        assert_eq!(Frequency::Hours(6).operator(), "selhour,0,6,12,18");
        assert_eq!(Frequency::Hours(24).operator(), "selhour,0");
        assert_eq!(Frequency::Daily.operator(), "daymean");
        assert_eq!(Frequency::Monthly.operator(), "monmean");
    }

    #[test]
    fn spectral_input_gets_grid_conversion() {
        let args = CdoTransform::arguments(
            Frequency::Daily,
            true,
            Path::new("tmp/t_ml.grb"),
            Path::new("tmp/t_ml.nc"),
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-f", "nc4", "-t", "ecmwf", "daymean", "-sp2gpl", "tmp/t_ml.grb", "tmp/t_ml.nc"]
        );

        let plain = CdoTransform::arguments(
            Frequency::Hours(3),
            false,
            Path::new("a.grb"),
            Path::new("a.nc"),
        );
        assert_eq!(plain.len(), 7);
    }

    #[test]
    fn missing_program_fails_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let transform = CdoTransform::new(dir.path().join("no-such-cdo"));
        assert!(matches!(
            transform.check(),
            Err(CrosscheckError::Transform { .. })
        ));
    }
}
