//! ═══════════════════════════════════════════════════════════════════════════════
//! THRESHOLDS — Loading Calibrated Warn/Crit Levels
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The owning process calls `load_thresholds` once at startup and threads the
//! result into `HazardConfig`. There is no module-level cache.
//!
//! Two layers:
//! - `try_load_*` return an explicit `ThresholdLoadError` describing why an
//!   artifact cannot be trusted (missing, unreadable, corrupt, too few
//!   samples, invalid thresholds)
//! - `load_*` fail open to built-in defaults, log a warning, and keep the
//!   reason in `ThresholdSource` so callers can still tell the cases apart
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::scaler::ScalerMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Built-in warn threshold when no trustworthy calibration exists
pub const DEFAULT_WARN_THRESHOLD: f64 = 0.5;
/// Built-in crit threshold when no trustworthy calibration exists
pub const DEFAULT_CRIT_THRESHOLD: f64 = 1.0;
/// Minimum global sample count for an artifact to be trusted
pub const DEFAULT_MIN_CALIBRATION_SAMPLES: usize = 20;

/// Warn/crit pair applied to the hazard index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: f64,
    pub crit: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: DEFAULT_WARN_THRESHOLD,
            crit: DEFAULT_CRIT_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(warn: f64, crit: f64) -> Self {
        Self { warn, crit }
    }

    /// Finite and ordered 0 ≤ warn ≤ crit
    pub fn is_valid(&self) -> bool {
        self.warn.is_finite() && self.crit.is_finite() && self.warn >= 0.0 && self.warn <= self.crit
    }
}

/// Why a calibration artifact was not used
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdLoadError {
    #[error("calibration file not found: {0}")]
    Missing(PathBuf),
    #[error("calibration file unreadable: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("calibration file corrupt: {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("calibration has {found} samples, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },
    #[error("calibration thresholds invalid: warn={warn}, crit={crit}")]
    InvalidThresholds { warn: f64, crit: f64 },
}

/// Where the active thresholds came from
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdSource {
    Calibrated { path: PathBuf, samples: usize },
    Default(ThresholdLoadError),
}

/// Thresholds plus their provenance
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedThresholds {
    pub thresholds: Thresholds,
    pub source: ThresholdSource,
}

impl LoadedThresholds {
    pub fn is_calibrated(&self) -> bool {
        matches!(self.source, ThresholdSource::Calibrated { .. })
    }
}

// Minimal views so partially populated artifacts still load

#[derive(Deserialize)]
struct ArtifactView {
    global: ThresholdEntryView,
    #[serde(default)]
    per_series: BTreeMap<String, SeriesEntryView>,
}

#[derive(Deserialize)]
struct ThresholdEntryView {
    warn_threshold: f64,
    crit_threshold: f64,
    #[serde(default)]
    stats: Option<CountView>,
}

#[derive(Deserialize)]
struct CountView {
    #[serde(default)]
    count: usize,
}

#[derive(Deserialize)]
struct SeriesEntryView {
    warn_threshold: f64,
    crit_threshold: f64,
    #[serde(default)]
    count: usize,
}

#[derive(Deserialize)]
struct ScalerArtifactView {
    feature_scalers: ScalerBlockView,
}

#[derive(Deserialize)]
struct ScalerBlockView {
    #[serde(default)]
    features: ScalerMap,
}

/// Default artifact location: ~/.hazard/calibration.json
pub fn default_calibration_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".hazard").join("calibration.json")
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ThresholdLoadError> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ThresholdLoadError::Missing(path.to_path_buf())
        } else {
            ThresholdLoadError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;
    serde_json::from_str(&text).map_err(|e| ThresholdLoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn checked(warn: f64, crit: f64, count: usize, min_samples: usize) -> Result<Thresholds, ThresholdLoadError> {
    if count < min_samples {
        return Err(ThresholdLoadError::InsufficientSamples {
            found: count,
            required: min_samples,
        });
    }
    let thresholds = Thresholds { warn, crit };
    if !thresholds.is_valid() {
        return Err(ThresholdLoadError::InvalidThresholds { warn, crit });
    }
    Ok(thresholds)
}

/// Global thresholds from an artifact, or the reason they cannot be trusted
pub fn try_load_thresholds(path: &Path, min_samples: usize) -> Result<(Thresholds, usize), ThresholdLoadError> {
    let view: ArtifactView = read_artifact(path)?;
    let count = view.global.stats.map(|s| s.count).unwrap_or(0);
    let thresholds = checked(
        view.global.warn_threshold,
        view.global.crit_threshold,
        count,
        min_samples,
    )?;
    Ok((thresholds, count))
}

/// Series-specific thresholds when the artifact has a trusted entry for it,
/// otherwise the global ones
pub fn try_load_series_thresholds(
    path: &Path,
    series_id: &str,
    min_samples: usize,
) -> Result<(Thresholds, usize), ThresholdLoadError> {
    let view: ArtifactView = read_artifact(path)?;
    if let Some(entry) = view.per_series.get(series_id) {
        if let Ok(thresholds) = checked(entry.warn_threshold, entry.crit_threshold, entry.count, min_samples) {
            return Ok((thresholds, entry.count));
        }
    }
    let count = view.global.stats.map(|s| s.count).unwrap_or(0);
    let thresholds = checked(
        view.global.warn_threshold,
        view.global.crit_threshold,
        count,
        min_samples,
    )?;
    Ok((thresholds, count))
}

fn fail_open(path: &Path, result: Result<(Thresholds, usize), ThresholdLoadError>) -> LoadedThresholds {
    match result {
        Ok((thresholds, samples)) => {
            info!(
                path = %path.display(),
                warn_threshold = thresholds.warn,
                crit_threshold = thresholds.crit,
                samples,
                "loaded calibrated thresholds"
            );
            LoadedThresholds {
                thresholds,
                source: ThresholdSource::Calibrated {
                    path: path.to_path_buf(),
                    samples,
                },
            }
        }
        Err(reason) => {
            warn!(error = %reason, "using default hazard thresholds");
            LoadedThresholds {
                thresholds: Thresholds::default(),
                source: ThresholdSource::Default(reason),
            }
        }
    }
}

/// Load global thresholds, falling back to defaults on any problem
pub fn load_thresholds(path: &Path, min_samples: usize) -> LoadedThresholds {
    fail_open(path, try_load_thresholds(path, min_samples))
}

/// Load thresholds for one series, falling back to defaults on any problem
pub fn load_series_thresholds(path: &Path, series_id: &str, min_samples: usize) -> LoadedThresholds {
    fail_open(path, try_load_series_thresholds(path, series_id, min_samples))
}

/// Feature scalers from an artifact's `feature_scalers.features` block
pub fn try_load_feature_scalers(path: &Path) -> Result<ScalerMap, ThresholdLoadError> {
    let view: ScalerArtifactView = read_artifact(path)?;
    Ok(view.feature_scalers.features)
}

/// Feature scalers, or an empty map (raw deltas) on any problem
pub fn load_feature_scalers(path: &Path) -> ScalerMap {
    match try_load_feature_scalers(path) {
        Ok(scalers) => scalers,
        Err(reason) => {
            warn!(error = %reason, "feature scalers unavailable, using raw deltas");
            ScalerMap::new()
        }
    }
}
