//! ═══════════════════════════════════════════════════════════════════════════════
//! HAZARD — Command Line Entry Point
//! ═══════════════════════════════════════════════════════════════════════════════
//! calibrate : learn thresholds and scalers from a hazard event log
//! forecast  : one forecast step from snapshot files
//! thresholds: show which thresholds a forecast would use, and why
//! ═══════════════════════════════════════════════════════════════════════════════

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hazard::calibration::{self, CalibrationConfig};
use hazard::hazard::{ForecastInputs, HazardConfig};
use hazard::history::SeriesState;
use hazard::record::{append_record, HazardRecord};
use hazard::snapshot::{from_json, Snapshot};
use hazard::thresholds::{
    default_calibration_path, load_feature_scalers, load_series_thresholds, load_thresholds,
    LoadedThresholds, ThresholdSource, DEFAULT_MIN_CALIBRATION_SAMPLES,
};

#[derive(Parser)]
#[command(name = "hazard")]
#[command(about = "Hazard - drift forecasting and threshold calibration", long_about = None)]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn thresholds and feature scalers from a JSONL hazard log
    Calibrate {
        /// Hazard event log (one JSON object per line)
        #[arg(short, long)]
        log: PathBuf,

        /// Artifact path (default: ~/.hazard/calibration.json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long, default_value = "0.85")]
        warn_percentile: f64,

        #[arg(long, default_value = "0.97")]
        crit_percentile: f64,

        #[arg(long, default_value = "20")]
        min_series_samples: usize,

        #[arg(long, default_value = "20")]
        min_snapshot_events: usize,

        #[arg(long, default_value = "20")]
        min_feature_samples: usize,

        #[arg(long, default_value = "0.8")]
        min_coverage: f64,

        #[arg(long, default_value = "12")]
        max_features: usize,

        #[arg(long, default_value = "10")]
        top_missing: usize,
    },

    /// Compute one hazard state from snapshot files
    Forecast {
        /// Current snapshot (JSON object)
        #[arg(long)]
        current: PathBuf,

        /// Reference snapshot (JSON object)
        #[arg(long)]
        reference: PathBuf,

        /// Stability metrics (JSON object); S is neutral when omitted
        #[arg(long)]
        stability: Option<PathBuf>,

        /// Prior T values, oldest first
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        history: Vec<f64>,

        /// HazardConfig JSON; absent fields take defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Calibration artifact (default: ~/.hazard/calibration.json)
        #[arg(long)]
        calibration: Option<PathBuf>,

        #[arg(long, default_value = "default")]
        series_id: String,

        /// Append the result to this JSONL log for later calibration
        #[arg(long)]
        append_log: Option<PathBuf>,

        /// Minimum samples for a calibration to be trusted
        #[arg(long, default_value_t = DEFAULT_MIN_CALIBRATION_SAMPLES)]
        min_samples: usize,
    },

    /// Show loaded thresholds and their source
    Thresholds {
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Look up a per-series entry first
        #[arg(long)]
        series_id: Option<String>,

        #[arg(long, default_value_t = DEFAULT_MIN_CALIBRATION_SAMPLES)]
        min_samples: usize,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Calibrate {
            log,
            out,
            warn_percentile,
            crit_percentile,
            min_series_samples,
            min_snapshot_events,
            min_feature_samples,
            min_coverage,
            max_features,
            top_missing,
        } => {
            let config = CalibrationConfig {
                warn_percentile,
                crit_percentile,
                min_series_samples,
                min_snapshot_events,
                min_feature_samples,
                min_coverage,
                max_features,
                top_missing,
            };
            let out = out.unwrap_or_else(default_calibration_path);
            run_calibrate(&log, &out, &config)
        }
        Commands::Forecast {
            current,
            reference,
            stability,
            history,
            config,
            calibration,
            series_id,
            append_log,
            min_samples,
        } => {
            let args = ForecastArgs {
                current,
                reference,
                stability,
                history,
                config,
                calibration: calibration.unwrap_or_else(default_calibration_path),
                series_id,
                append_log,
                min_samples,
            };
            run_forecast(&args)
        }
        Commands::Thresholds {
            calibration,
            series_id,
            min_samples,
        } => {
            let path = calibration.unwrap_or_else(default_calibration_path);
            let loaded = match series_id.as_deref() {
                Some(id) => load_series_thresholds(&path, id, min_samples),
                None => load_thresholds(&path, min_samples),
            };
            print_thresholds(&loaded);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALIBRATE
// ═══════════════════════════════════════════════════════════════════════════════

fn run_calibrate(log: &Path, out: &Path, config: &CalibrationConfig) -> Result<()> {
    let artifact = calibration::run_calibrate(log, out, config)
        .with_context(|| format!("calibration from {} failed", log.display()))?;
    calibration::print_summary(&artifact, out);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORECAST
// ═══════════════════════════════════════════════════════════════════════════════

struct ForecastArgs {
    current: PathBuf,
    reference: PathBuf,
    stability: Option<PathBuf>,
    history: Vec<f64>,
    config: Option<PathBuf>,
    calibration: PathBuf,
    series_id: String,
    append_log: Option<PathBuf>,
    min_samples: usize,
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(from_json(json))
}

fn run_forecast(args: &ForecastArgs) -> Result<()> {
    let current = read_snapshot(&args.current)?;
    let reference = read_snapshot(&args.reference)?;
    let stability = match &args.stability {
        Some(path) => read_snapshot(path)?,
        None => Snapshot::new(),
    };

    let mut config = match &args.config {
        Some(path) => HazardConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HazardConfig::default(),
    };

    let loaded = load_series_thresholds(&args.calibration, &args.series_id, args.min_samples);
    if loaded.is_calibrated() {
        config = config.with_thresholds(loaded.thresholds);
    }
    if config.feature_mode() && config.feature_scalers.is_empty() {
        config = config.with_feature_scalers(load_feature_scalers(&args.calibration));
    }

    let series = SeriesState::from_history(&args.series_id, &args.history, config.min_history);
    let inputs = ForecastInputs::new(&current, &reference, &stability);
    let (next, state) = series.advance(&inputs, &config);

    let output = serde_json::json!({
        "series_id": next.series_id,
        "hazard": state,
        "window": next.window.values(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if let Some(log_path) = &args.append_log {
        let record = HazardRecord::new(&args.series_id, state).with_snapshot(current);
        append_record(log_path, &record)
            .with_context(|| format!("appending to {}", log_path.display()))?;
        info!(path = %log_path.display(), "hazard record appended");
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// THRESHOLDS
// ═══════════════════════════════════════════════════════════════════════════════

fn print_thresholds(loaded: &LoadedThresholds) {
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ HAZARD THRESHOLDS                                           │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ warn: {:<53.4} │", loaded.thresholds.warn);
    println!("│ crit: {:<53.4} │", loaded.thresholds.crit);
    println!("└─────────────────────────────────────────────────────────────┘");
    match &loaded.source {
        ThresholdSource::Calibrated { path, samples } => {
            println!("Source: calibrated ({} samples) from {}", samples, path.display());
        }
        ThresholdSource::Default(reason) => {
            println!("Source: built-in defaults ({})", reason);
        }
    }
}
