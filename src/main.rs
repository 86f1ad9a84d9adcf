//! Crosscheck - compare GRIB model output with netCDF output.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crosscheck::cache::open_cache;
use crosscheck::compare::{compare, Dimensionality};
use crosscheck::config::{expand_patterns, CompareConfig, PipelineConfig};
use crosscheck::data::NetcdfDataset;
use crosscheck::pipeline::{run_pipeline, CdoTransform};
use crosscheck::report;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "crosscheck")]
#[command(about = "Cross-validate GRIB model output against netCDF output", long_about = None)]
struct Args {
    /// Write logs to the specified file instead of stderr
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare a GRIB stream with one netCDF dataset in a single pass
    Compare {
        /// GRIB files or glob patterns, read as one concatenated stream
        #[arg(long, required = true, num_args = 1..)]
        grb: Vec<String>,

        /// Target netCDF file
        #[arg(long)]
        nc: PathBuf,

        /// 2 for surface maps, 3 for model-level profiles
        #[arg(long, default_value_t = 2)]
        dims: u8,

        /// Variables to compare (defaults depend on --dims)
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        vars: Vec<String>,

        /// Variables whose full difference field is kept
        #[arg(long = "map-vars", num_args = 1.., value_delimiter = ',')]
        map_vars: Option<Vec<String>>,

        /// Step alignment: identity, offset[:N], parity or xios
        #[arg(long, default_value = "xios")]
        alignment: String,

        /// Cache directory (defaults to the netCDF file's directory)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Neither read nor write cached results
        #[arg(long)]
        no_cache: bool,

        /// Divide the GRIB resolution by the reference value
        #[arg(long)]
        normalize: bool,
    },

    /// Split the GRIB stream, convert each variable, and diff whole arrays
    Pipeline {
        /// GRIB files or glob patterns
        #[arg(long, required = true, num_args = 1..)]
        grb: Vec<String>,

        /// Target netCDF files or glob patterns
        #[arg(long, required = true, num_args = 1..)]
        nc: Vec<String>,

        /// Staging directory; must be empty
        #[arg(long, default_value = "./tmp")]
        tmpdir: PathBuf,

        /// Number of concurrent conversions
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Output frequency of the netCDF files (e.g. 6h, day, mon)
        #[arg(long)]
        freq: Option<String>,

        /// Per-variable output frequency, as VAR=TOKEN
        #[arg(long = "freq-for")]
        freq_for: Vec<String>,

        /// Only process these variables
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        vars: Vec<String>,

        /// Combined validation dataset
        #[arg(long, default_value = "validation.nc")]
        output: PathBuf,

        /// CDO executable
        #[arg(long, default_value = "cdo")]
        cdo: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_ref())?;
    tracing::info!("Starting Crosscheck");

    match args.command {
        Command::Compare {
            grb,
            nc,
            dims,
            vars,
            map_vars,
            alignment,
            cache_dir,
            no_cache,
            normalize,
        } => {
            let dims = Dimensionality::from_count(dims)
                .with_context(|| format!("--dims must be 2 or 3, got {}", dims))?;
            let mut config = CompareConfig::for_dims(dims);
            if !vars.is_empty() {
                config.variables = vars;
            }
            if let Some(map_vars) = map_vars {
                config.map_variables = map_vars;
            }
            config.alignment = alignment.parse()?;
            config.normalize_resolution = normalize;
            config.cache_dir = cache_dir;
            config.use_cache = !no_cache;

            let grib_paths = expand_patterns(&grb)?;
            let dataset = NetcdfDataset::open(&nc)
                .with_context(|| format!("Failed to open target dataset {}", nc.display()))?;
            let mut cache = open_cache(&config, &nc);

            let result = compare(&grib_paths, &dataset, cache.as_mut(), &config)?;
            report::emit(&report::error_table(&result, dims));
        }
        Command::Pipeline {
            grb,
            nc,
            tmpdir,
            workers,
            freq,
            freq_for,
            vars,
            output,
            cdo,
        } => {
            let mut config = PipelineConfig {
                staging_dir: tmpdir,
                workers,
                variables: vars,
                output,
                transform_program: cdo,
                ..PipelineConfig::default()
            };
            if let Some(freq) = freq {
                config.default_frequency = freq;
            }
            for item in &freq_for {
                let (variable, token) = item
                    .split_once('=')
                    .with_context(|| format!("--freq-for expects VAR=TOKEN, got {}", item))?;
                config
                    .frequency_overrides
                    .insert(variable.to_string(), token.to_string());
            }

            let grib_paths = expand_patterns(&grb)?;
            let nc_paths = expand_patterns(&nc)?;
            let transform = CdoTransform::new(&config.transform_program);

            let report = run_pipeline(&grib_paths, &nc_paths, &transform, &config)?;
            report::emit(&report::pipeline_table(&report));
        }
    }

    tracing::info!("Crosscheck finished");
    Ok(())
}

fn init_logging(log: Option<&PathBuf>) -> Result<()> {
    if let Some(log_path) = log {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
