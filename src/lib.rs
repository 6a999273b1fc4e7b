//! ═══════════════════════════════════════════════════════════════════════════════
//! HAZARD — Drift Forecasting and Threshold Calibration
//! ═══════════════════════════════════════════════════════════════════════════════
//! Online: snapshot pair + stability signal + T history → hazard state.
//! Offline: hazard event log → calibrated thresholds and feature scalers.
//! ═══════════════════════════════════════════════════════════════════════════════

#![allow(clippy::doc_lazy_continuation)]

// ═══════════════════════════════════════════════════════════════════════════════
// FOUNDATION — Values, statistics, errors
// ═══════════════════════════════════════════════════════════════════════════════

pub mod error;
pub mod snapshot;
pub mod stats;

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURES — Extraction, scaling, attribution
// ═══════════════════════════════════════════════════════════════════════════════

pub mod contribution;
pub mod feature;
pub mod scaler;

// ═══════════════════════════════════════════════════════════════════════════════
// FORECAST — Hazard index, zones, per-series history
// ═══════════════════════════════════════════════════════════════════════════════

pub mod hazard;
pub mod history;
pub mod record;
pub mod thresholds;

// ═══════════════════════════════════════════════════════════════════════════════
// CALIBRATION — Offline learning from event logs
// ═══════════════════════════════════════════════════════════════════════════════

pub mod artifact;
pub mod calibration;

pub use artifact::CalibrationArtifact;
pub use calibration::{calibrate, run_calibrate, CalibrationConfig};
pub use contribution::{ContributorSummary, FeatureContribution};
pub use error::{CalibrationError, ConfigError, HazardError, HazardResult, ValidationError};
pub use feature::{FeatureSpec, MissingPolicy, Transform};
pub use hazard::{compute_hazard_state, ForecastInputs, HazardConfig, HazardState, Zone};
pub use history::{HistoryWindow, SeriesState};
pub use record::{append_record, HazardRecord};
pub use scaler::{RobustScaler, ScalerMap};
pub use snapshot::{Snapshot, Value};
pub use thresholds::{
    load_feature_scalers, load_series_thresholds, load_thresholds, LoadedThresholds,
    ThresholdLoadError, ThresholdSource, Thresholds,
};
