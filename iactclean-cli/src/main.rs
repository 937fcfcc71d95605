//! iactclean CLI - Cherenkov camera image cleaning.
//!
//! Reads camera geometry, cleaning configuration and events as JSON and
//! writes the cleaning results as JSON.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand};
use iactclean_algorithms::{clean_and_summarize, ImageCleaner, IprCalibrationStore};
use iactclean_core::{
    CameraDescription, CameraGeometry, CleaningConfig, CleaningResult, CleaningStatistics,
    EventSignal, IprCurve, TelescopeType,
};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] iactclean_core::Error),

    #[error("{0}")]
    Usage(String),
}

/// IPR curves keyed by telescope type.
type IprTable = HashMap<TelescopeType, IprCurve>;

/// Image cleaning for imaging atmospheric Cherenkov telescope cameras.
#[derive(Parser)]
#[command(name = "iactclean")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every event of a JSON event list
    Clean {
        /// Cleaning configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Camera geometry (JSON)
        #[arg(short, long)]
        geometry: PathBuf,

        /// Events (JSON array)
        #[arg(short, long)]
        events: PathBuf,

        /// IPR curves by telescope type (JSON), required for NN cleaning
        #[arg(long)]
        ipr: Option<PathBuf>,

        /// Output file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print NN coincidence windows against charge
    Contour {
        /// Cleaning configuration with NN parameters (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Camera geometry (JSON)
        #[arg(short, long)]
        geometry: PathBuf,

        /// IPR curves by telescope type (JSON)
        #[arg(long)]
        ipr: PathBuf,

        /// Highest charge to tabulate
        #[arg(long, default_value = "30.0")]
        max_charge: f64,

        /// Charge step
        #[arg(long, default_value = "1.0")]
        step: f64,

        /// Pixels searched for boundary pixels
        #[arg(long, default_value = "20")]
        search_pixels: usize,
    },

    /// Write a hexagonal demo camera geometry
    HexCamera {
        /// Pixel rings around the central pixel
        #[arg(long, default_value = "10")]
        rings: usize,

        /// Distance between neighboring pixel centers
        #[arg(long, default_value = "1.0")]
        spacing: f64,

        /// Telescope type identifier
        #[arg(long, default_value = "1")]
        telescope_type: TelescopeType,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// JSON document written by `clean`.
#[derive(Serialize)]
struct CleanReport<'a> {
    method: &'a str,
    statistics: &'a CleaningStatistics,
    results: &'a [CleaningResult],
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn load_geometry(path: &Path) -> Result<CameraGeometry> {
    let description: CameraDescription = load_json(path)?;
    Ok(CameraGeometry::from_description(description)?)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn build_cleaner(config: CleaningConfig, ipr: Option<&Path>) -> Result<ImageCleaner> {
    match ipr {
        Some(path) => {
            let table: IprTable = load_json(path)?;
            Ok(ImageCleaner::with_ipr_source(config, table)?)
        }
        None => Ok(ImageCleaner::new(config)?),
    }
}

fn run_clean(
    config: &Path,
    geometry: &Path,
    events: &Path,
    ipr: Option<&Path>,
    output: Option<&Path>,
) -> Result<CleaningStatistics> {
    let config: CleaningConfig = load_json(config)?;
    let geometry = load_geometry(geometry)?;
    let events: Vec<EventSignal> = load_json(events)?;
    let cleaner = build_cleaner(config, ipr)?;
    info!(
        "cleaning {} events on a {}-pixel camera with {}",
        events.len(),
        geometry.len(),
        cleaner.config().method.name()
    );

    let start = Instant::now();
    let (results, statistics) = clean_and_summarize(&cleaner, &geometry, &events)?;
    info!("cleaned in {:.3}s", start.elapsed().as_secs_f64());

    let report = CleanReport {
        method: cleaner.config().method.name(),
        statistics: &statistics,
        results: &results,
    };
    write_json(&report, output)?;
    Ok(statistics)
}

fn run_contour(
    config: &Path,
    geometry: &Path,
    ipr: &Path,
    max_charge: f64,
    step: f64,
    search_pixels: usize,
) -> Result<()> {
    if step.is_nan() || step <= 0.0 {
        return Err(CliError::Usage("--step must be positive".into()));
    }
    let config: CleaningConfig = load_json(config)?;
    config.validate()?;
    let params = config
        .nn_params()
        .ok_or_else(|| CliError::Usage("contour needs a next_neighbor configuration".into()))?;
    let geometry = load_geometry(geometry)?;
    let table: IprTable = load_json(ipr)?;
    let store = IprCalibrationStore::new(table, params.clone());
    let calibration = store.get_or_build(&geometry)?;

    let classes: Vec<_> = calibration.classes().iter().collect();
    print!("{:>10} {:>12}", "charge", "rate_hz");
    for class in &classes {
        print!(" {:>10}", class.name());
    }
    println!(" {:>10}", "boundary");

    let live = geometry.len();
    let mut charge = 0.0;
    while charge <= max_charge {
        print!("{:>10.2} {:>12.4e}", charge, calibration.curve().rate_at(charge));
        for &class in &classes {
            print!(" {:>10.4}", calibration.group_window(class, charge, live));
        }
        println!(" {:>10.4}", calibration.boundary_window(charge, search_pixels));
        charge += step;
    }
    println!("pre-threshold: {:.3}", calibration.pre_threshold());
    Ok(())
}

fn run_hex_camera(
    rings: usize,
    spacing: f64,
    telescope_type: TelescopeType,
    output: &Path,
) -> Result<()> {
    if spacing.is_nan() || spacing <= 0.0 {
        return Err(CliError::Usage("--spacing must be positive".into()));
    }
    let geometry = CameraGeometry::hexagonal(telescope_type, rings, spacing);
    write_json(&geometry.to_description(), Some(output))?;
    info!("wrote {} pixels to {}", geometry.len(), output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Clean {
            config,
            geometry,
            events,
            ipr,
            output,
        } => {
            let statistics = run_clean(
                &config,
                &geometry,
                &events,
                ipr.as_deref(),
                output.as_deref(),
            )?;
            eprintln!("Events: {}", statistics.events);
            eprintln!("Empty images: {}", statistics.empty_images);
            eprintln!("Core pixels: {}", statistics.core_pixels);
            eprintln!("Border pixels: {}", statistics.border_pixels);
            eprintln!("Mean image size: {:.2}", statistics.mean_image_pixels());
        }

        Commands::Contour {
            config,
            geometry,
            ipr,
            max_charge,
            step,
            search_pixels,
        } => run_contour(&config, &geometry, &ipr, max_charge, step, search_pixels)?,

        Commands::HexCamera {
            rings,
            spacing,
            telescope_type,
            output,
        } => run_hex_camera(rings, spacing, telescope_type, &output)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use iactclean_core::{CleaningMethod, NnParams, TwoLevelParams};

    fn write_file<T: Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
        let path = dir.join(name);
        serde_json::to_writer(File::create(&path).unwrap(), value).unwrap();
        path
    }

    fn decade_table() -> IprTable {
        let curve = IprCurve::new(
            vec![0.0, 5.0, 10.0, 15.0, 20.0],
            vec![1e8, 1e6, 1e4, 1e2, 1.0],
        )
        .unwrap();
        [(1, curve)].into()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hex_camera_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        run_hex_camera(2, 1.5, 4, &path).unwrap();

        let geometry = load_geometry(&path).unwrap();
        assert_eq!(geometry.len(), 19);
        assert_eq!(geometry.telescope_type(), 4);
    }

    #[test]
    fn test_clean_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let center = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let mut bright = EventSignal::new(geometry.len());
        bright.charge[center] = 30.0;
        bright.charge[geometry.neighbors(center)[0]] = 8.0;
        let quiet = EventSignal::new(geometry.len());

        let config =
            CleaningConfig::new(CleaningMethod::TwoLevel(TwoLevelParams::fixed(10.0, 5.0)));
        let config_path = write_file(dir.path(), "config.json", &config);
        let geometry_path = write_file(dir.path(), "camera.json", &geometry.to_description());
        let events_path = write_file(dir.path(), "events.json", &vec![bright, quiet]);
        let output = dir.path().join("results.json");

        let statistics =
            run_clean(&config_path, &geometry_path, &events_path, None, Some(&output)).unwrap();
        assert_eq!(statistics.events, 2);
        assert_eq!(statistics.empty_images, 1);
        assert_eq!(statistics.core_pixels, 1);
        assert_eq!(statistics.border_pixels, 1);

        let report: serde_json::Value = load_json(&output).unwrap();
        assert_eq!(report["method"], "two-level-fixed");
        assert_eq!(report["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_traces_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = CameraGeometry::hexagonal(1, 1, 1.0);
        let mut event = serde_json::to_value(EventSignal::new(geometry.len())).unwrap();
        event["traces"] = serde_json::json!({ "n_samples": 0, "samples": [] });

        let config = CleaningConfig::default()
            .with_trace_correlation(iactclean_core::TraceCorrelationParams::default());
        let config_path = write_file(dir.path(), "config.json", &config);
        let geometry_path = write_file(dir.path(), "camera.json", &geometry.to_description());
        let events_path = write_file(dir.path(), "events.json", &vec![event]);

        let err = run_clean(&config_path, &geometry_path, &events_path, None, None).unwrap_err();
        assert!(matches!(err, CliError::Json(_)), "unexpected {err:?}");
    }

    #[test]
    fn test_nn_without_ipr_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = CameraGeometry::hexagonal(1, 2, 1.0);
        let config = CleaningConfig::new(CleaningMethod::NextNeighbor(NnParams::default()));
        let config_path = write_file(dir.path(), "config.json", &config);
        let geometry_path = write_file(dir.path(), "camera.json", &geometry.to_description());
        let events_path = write_file(dir.path(), "events.json", &Vec::<EventSignal>::new());

        let err = run_clean(&config_path, &geometry_path, &events_path, None, None).unwrap_err();
        assert!(matches!(err, CliError::Core(e) if e.is_configuration()));

        let ipr_path = write_file(dir.path(), "ipr.json", &decade_table());
        let output = dir.path().join("results.json");
        let statistics = run_clean(
            &config_path,
            &geometry_path,
            &events_path,
            Some(&ipr_path),
            Some(&output),
        )
        .unwrap();
        assert_eq!(statistics.events, 0);
    }

    #[test]
    fn test_contour_requires_nn_config() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = CameraGeometry::hexagonal(1, 2, 1.0);
        let config = CleaningConfig::default();
        let config_path = write_file(dir.path(), "config.json", &config);
        let geometry_path = write_file(dir.path(), "camera.json", &geometry.to_description());
        let ipr_path = write_file(dir.path(), "ipr.json", &decade_table());

        let err = run_contour(&config_path, &geometry_path, &ipr_path, 10.0, 1.0, 20).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }
}
