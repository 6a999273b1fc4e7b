//! ═══════════════════════════════════════════════════════════════════════════════
//! ERROR — Unified Error Type for Hazard
//! ═══════════════════════════════════════════════════════════════════════════════
//! Only static configuration mistakes and offline calibration input problems
//! become errors. Malformed runtime data degrades to absent/neutral values.
//! ═══════════════════════════════════════════════════════════════════════════════

use thiserror::Error;

/// The unified error type for the hazard crate
#[derive(Debug, Error)]
pub enum HazardError {
    /// I/O error (artifact reads/writes, log files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Validation error (structurally invalid feature spec, scaler input)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// Calibration run rejected its inputs
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),
}

/// Configuration-specific errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    /// File not found
    #[error("Config file not found: {0}")]
    FileNotFound(String),
}

/// Validation-specific errors
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// Input validation failed
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput { field: String, message: String },
    /// Not enough usable data to compute a statistic
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

/// Operator-facing calibration errors (bad flags, unusable logs)
#[derive(Debug, Clone, Error)]
pub enum CalibrationError {
    /// The event log does not exist
    #[error("Event log not found: {0}")]
    LogNotFound(String),
    /// The event log contained no usable hazard values
    #[error("Event log has no usable hazard records: {0}")]
    EmptyLog(String),
    /// Percentile flags out of range or misordered
    #[error("Invalid percentiles: warn={warn}, crit={crit} (need 0 <= warn < crit <= 1)")]
    InvalidPercentiles { warn: f64, crit: f64 },
    /// Any other numeric flag out of range
    #[error("Invalid argument '{flag}': {message}")]
    InvalidArgument { flag: String, message: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl CalibrationError {
    pub fn invalid_argument(flag: impl Into<String>, message: impl Into<String>) -> Self {
        CalibrationError::InvalidArgument {
            flag: flag.into(),
            message: message.into(),
        }
    }
}

/// Type alias for Result with HazardError
pub type HazardResult<T> = Result<T, HazardError>;
