//! ═══════════════════════════════════════════════════════════════════════════════
//! HAZARD — Distance, Drift and Stability Folded into One Index
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Answers: "How far have we moved from the reference, how fast, and how much
//! do we trust the current stability signal?"
//!
//! ```text
//!   T = distance(current, reference)      legacy Euclidean or feature-space L2
//!   S = clamp(stability[key], 0, 1)       0.5 when absent
//!   D = mean |ΔT| over the last min_history values (including the new T)
//!   E = α·D + β·(1 − S)
//!
//!   E ≥ crit → RED    E ≥ warn → AMBER    else GREEN
//! ```
//!
//! Every call is a pure function of its inputs. Malformed runtime data
//! degrades to neutral values; nothing in here returns an error.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::contribution::{
    compute_feature_contributions, format_top_contributors_reason, top_contributors,
    weighted_l2_distance, ContributorSummary,
};
use crate::error::{ConfigError, HazardResult};
use crate::feature::{validate_specs, FeatureSpec};
use crate::scaler::ScalerMap;
use crate::snapshot::{resolve_f64, Snapshot, Value};
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default drift weight
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Default stability-loss weight
pub const DEFAULT_BETA: f64 = 1.0;
/// Default sliding window for drift estimation
pub const DEFAULT_MIN_HISTORY: usize = 3;
/// Default number of contributors kept for explainability
pub const DEFAULT_TOP_K: usize = 3;
/// Default stability metric path
pub const DEFAULT_STABILITY_KEY: &str = "signal";
/// Stability used when the signal is absent or invalid
pub const NEUTRAL_STABILITY: f64 = 0.5;

// ═══════════════════════════════════════════════════════════════════════════════
// ZONE
// ═══════════════════════════════════════════════════════════════════════════════

/// Three-zone classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Zone {
    Green,
    Amber,
    Red,
}

impl Zone {
    /// Monotonic in `e` for fixed thresholds
    pub fn classify(e: f64, warn_threshold: f64, crit_threshold: f64) -> Self {
        match e {
            e if e >= crit_threshold => Zone::Red,
            e if e >= warn_threshold => Zone::Amber,
            _ => Zone::Green,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "GREEN",
            Zone::Amber => "AMBER",
            Zone::Red => "RED",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-call forecast configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Weight on drift D
    pub alpha: f64,
    /// Weight on stability loss (1 - S)
    pub beta: f64,
    pub warn_threshold: f64,
    pub crit_threshold: f64,
    /// Sliding window size for D
    pub min_history: usize,
    /// Non-empty enables feature-space mode
    pub feature_specs: Vec<FeatureSpec>,
    pub feature_scalers: ScalerMap,
    pub top_k_contributors: usize,
    /// Dotted path of the stability signal inside the stability metrics
    pub stability_key: String,
}

impl Default for HazardConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            warn_threshold: thresholds.warn,
            crit_threshold: thresholds.crit,
            min_history: DEFAULT_MIN_HISTORY,
            feature_specs: Vec::new(),
            feature_scalers: ScalerMap::new(),
            top_k_contributors: DEFAULT_TOP_K,
            stability_key: DEFAULT_STABILITY_KEY.to_string(),
        }
    }
}

impl HazardConfig {
    /// Start from thresholds loaded once by the owning process
    pub fn from_thresholds(thresholds: Thresholds) -> Self {
        Self::default().with_thresholds(thresholds)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.warn_threshold = thresholds.warn;
        self.crit_threshold = thresholds.crit;
        self
    }

    pub fn with_feature_specs(mut self, specs: Vec<FeatureSpec>) -> Self {
        self.feature_specs = specs;
        self
    }

    pub fn with_feature_scalers(mut self, scalers: ScalerMap) -> Self {
        self.feature_scalers = scalers;
        self
    }

    /// Read a JSON config; absent fields take their defaults
    pub fn load(path: &Path) -> HazardResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string()).into()
            } else {
                crate::error::HazardError::from(e)
            }
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Config-build-time check; the forecast path never validates
    pub fn validate(&self) -> HazardResult<()> {
        for (field, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be finite, got {}", value),
                }
                .into());
            }
        }
        if !Thresholds::new(self.warn_threshold, self.crit_threshold).is_valid() {
            return Err(ConfigError::InvalidValue {
                field: "warn_threshold".to_string(),
                message: format!(
                    "need finite 0 <= warn <= crit, got warn={} crit={}",
                    self.warn_threshold, self.crit_threshold
                ),
            }
            .into());
        }
        validate_specs(&self.feature_specs)
    }

    pub fn feature_mode(&self) -> bool {
        !self.feature_specs.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of one forecast call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardState {
    #[serde(rename = "T")]
    pub t: f64,
    #[serde(rename = "S")]
    pub s: f64,
    #[serde(rename = "D")]
    pub d: f64,
    #[serde(rename = "E")]
    pub e: f64,
    pub zone: Zone,
    pub reason: String,
    pub contributors_top: Vec<ContributorSummary>,
    /// True when any feature contribution used a robust scaler
    #[serde(rename = "T_scaled")]
    pub t_scaled: bool,
}

/// Borrowed inputs for one forecast call
#[derive(Debug, Clone, Copy)]
pub struct ForecastInputs<'a> {
    pub current: &'a Snapshot,
    pub reference: &'a Snapshot,
    pub stability_metrics: &'a Snapshot,
}

impl<'a> ForecastInputs<'a> {
    pub fn new(
        current: &'a Snapshot,
        reference: &'a Snapshot,
        stability_metrics: &'a Snapshot,
    ) -> Self {
        Self {
            current,
            reference,
            stability_metrics,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Euclidean distance over the top-level numeric keys of `current`.
///
/// Invalid current values are skipped; missing or invalid reference values
/// count as 0.
pub fn legacy_distance(current: &Snapshot, reference: &Snapshot) -> f64 {
    current
        .iter()
        .filter_map(|(key, value)| {
            let cur = value.as_finite_f64()?;
            let reference = reference
                .get(key)
                .and_then(Value::as_finite_f64)
                .unwrap_or(0.0);
            Some((cur - reference).powi(2))
        })
        .sum::<f64>()
        .sqrt()
}

/// Stability signal clamped to [0, 1]; neutral 0.5 when absent
pub fn stability_index(stability_metrics: &Snapshot, key: &str) -> f64 {
    resolve_f64(stability_metrics, key)
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(NEUTRAL_STABILITY)
}

/// Mean absolute successive difference; 0 with fewer than 2 points
pub fn drift_estimate(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let total: f64 = window.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (window.len() - 1) as f64
}

/// E = α·D + β·(1 − S)
pub fn hazard_index(alpha: f64, beta: f64, d: f64, s: f64) -> f64 {
    alpha * d + beta * (1.0 - s)
}

/// Append `t` to history and keep the newest `min_history` finite values
pub fn extend_window(history: &[f64], t: f64, min_history: usize) -> Vec<f64> {
    let mut window: Vec<f64> = history
        .iter()
        .copied()
        .chain(std::iter::once(t))
        .filter(|v| v.is_finite())
        .collect();
    let excess = window.len().saturating_sub(min_history);
    window.drain(..excess);
    window
}

fn zone_reason(zone: Zone, state: (f64, f64, f64, f64), config: &HazardConfig) -> String {
    let (t, s, d, e) = state;
    match zone {
        Zone::Green => format!(
            "stable: E={:.3} below warn {:.3} (T={:.3}, S={:.3}, D={:.3})",
            e, config.warn_threshold, t, s, d
        ),
        Zone::Amber => format!(
            "pre-hazard drift: E={:.3} at or above warn {:.3} (T={:.3}, S={:.3}, D={:.3})",
            e, config.warn_threshold, t, s, d
        ),
        Zone::Red => format!(
            "hazard: E={:.3} at or above crit {:.3} (T={:.3}, S={:.3}, D={:.3})",
            e, config.crit_threshold, t, s, d
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORECAST
// ═══════════════════════════════════════════════════════════════════════════════

/// Forecast and also return the windowed history the drift was computed on
pub fn forecast_with_window(
    inputs: &ForecastInputs<'_>,
    history: &[f64],
    config: &HazardConfig,
) -> (HazardState, Vec<f64>) {
    let (t, t_scaled, top, suffix) = if config.feature_mode() {
        let contributions = compute_feature_contributions(
            inputs.current,
            inputs.reference,
            &config.feature_specs,
            &config.feature_scalers,
        );
        let t = weighted_l2_distance(&contributions);
        let t_scaled = contributions.iter().any(|c| c.scaled);
        let top = top_contributors(&contributions, config.top_k_contributors, 0.0);
        let suffix = format_top_contributors_reason(&top);
        let summaries = top.iter().map(ContributorSummary::from).collect();
        (t, t_scaled, summaries, Some(suffix))
    } else {
        (legacy_distance(inputs.current, inputs.reference), false, Vec::new(), None)
    };

    let s = stability_index(inputs.stability_metrics, &config.stability_key);
    let window = extend_window(history, t, config.min_history);
    let d = drift_estimate(&window);
    let e = hazard_index(config.alpha, config.beta, d, s);
    let zone = Zone::classify(e, config.warn_threshold, config.crit_threshold);

    let mut reason = zone_reason(zone, (t, s, d, e), config);
    if let Some(suffix) = suffix {
        reason.push_str("; ");
        reason.push_str(&suffix);
    }

    debug!(t, s, d, e, zone = zone.as_str(), "hazard state computed");

    let state = HazardState {
        t,
        s,
        d,
        e,
        zone,
        reason,
        contributors_top: top,
        t_scaled,
    };
    (state, window)
}

/// One forecast call against a caller-owned history
pub fn compute_hazard_state(
    current: &Snapshot,
    reference: &Snapshot,
    stability_metrics: &Snapshot,
    history: &[f64],
    config: &HazardConfig,
) -> HazardState {
    let inputs = ForecastInputs::new(current, reference, stability_metrics);
    forecast_with_window(&inputs, history, config).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::RobustScaler;
    use crate::snapshot::from_json;
    use serde_json::json;

    fn snap(v: serde_json::Value) -> Snapshot {
        from_json(v)
    }

    #[test]
    fn test_zone_thresholds() {
        assert_eq!(Zone::classify(0.1, 0.5, 1.0), Zone::Green);
        assert_eq!(Zone::classify(0.5, 0.5, 1.0), Zone::Amber);
        assert_eq!(Zone::classify(0.99, 0.5, 1.0), Zone::Amber);
        assert_eq!(Zone::classify(1.0, 0.5, 1.0), Zone::Red);
    }

    #[test]
    fn test_zone_monotonic_in_e() {
        let mut prev = Zone::Green;
        for i in 0..300 {
            let e = i as f64 * 0.01;
            let zone = Zone::classify(e, 0.7, 1.3);
            assert!(zone >= prev, "zone regressed at E={}", e);
            prev = zone;
        }
        assert_eq!(prev, Zone::Red);
    }

    #[test]
    fn test_legacy_distance_identical_is_zero() {
        let a = snap(json!({"x": 1.0, "y": -2.5, "flag": true, "name": "svc"}));
        assert_eq!(legacy_distance(&a, &a.clone()), 0.0);
    }

    #[test]
    fn test_legacy_distance_defaults_and_skips() {
        let current = snap(json!({"a": 3.0, "b": 4.0, "bad": "x", "nested": {"c": 100}}));
        let reference = snap(json!({"a": 0.0, "b": "not-a-number"}));
        // a: 3, b: 4 against default 0, bad and nested skipped
        assert_eq!(legacy_distance(&current, &reference), 5.0);
    }

    #[test]
    fn test_stability_index_clamps_and_defaults() {
        assert_eq!(stability_index(&snap(json!({"signal": 0.9})), "signal"), 0.9);
        assert_eq!(stability_index(&snap(json!({"signal": 7})), "signal"), 1.0);
        assert_eq!(stability_index(&snap(json!({"signal": -1})), "signal"), 0.0);
        assert_eq!(stability_index(&snap(json!({"signal": "x"})), "signal"), 0.5);
        assert_eq!(stability_index(&snap(json!({})), "signal"), 0.5);
        assert_eq!(
            stability_index(&snap(json!({"conf": {"c": 0.25}})), "conf.c"),
            0.25
        );
    }

    #[test]
    fn test_drift_estimate() {
        assert_eq!(drift_estimate(&[]), 0.0);
        assert_eq!(drift_estimate(&[4.0]), 0.0);
        assert!((drift_estimate(&[1.0, 1.8, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(drift_estimate(&[2.0, 1.0, 2.0]), 1.0);
    }

    #[test]
    fn test_extend_window() {
        assert_eq!(extend_window(&[0.5, 1.0, 1.8], 3.0, 3), vec![1.0, 1.8, 3.0]);
        assert_eq!(extend_window(&[], 2.0, 3), vec![2.0]);
        assert!(extend_window(&[1.0], 2.0, 0).is_empty());
    }

    #[test]
    fn test_scenario_identical_snapshots_green() {
        let state = compute_hazard_state(
            &snap(json!({"m": 1.0})),
            &snap(json!({"m": 1.0})),
            &snap(json!({"signal": 0.9})),
            &[],
            &HazardConfig::default(),
        );
        assert_eq!(state.t, 0.0);
        assert_eq!(state.s, 0.9);
        assert_eq!(state.d, 0.0);
        assert!((state.e - 0.1).abs() < 1e-12);
        assert_eq!(state.zone, Zone::Green);
        assert!(!state.t_scaled);
        assert!(state.contributors_top.is_empty());
        assert!(state.reason.starts_with("stable: E=0.100"));
    }

    #[test]
    fn test_scenario_fast_drift_red() {
        let config = HazardConfig {
            min_history: 3,
            ..HazardConfig::default()
        };
        let state = compute_hazard_state(
            &snap(json!({"m": 3.0})),
            &snap(json!({"m": 0.0})),
            &snap(json!({"signal": 0.1})),
            &[0.5, 1.0, 1.8],
            &config,
        );
        assert_eq!(state.t, 3.0);
        assert!((state.d - 1.0).abs() < 1e-12);
        assert!((state.e - 1.9).abs() < 1e-12);
        assert_eq!(state.zone, Zone::Red);
        assert!(state.reason.contains("E=1.900"));
        assert!(state.reason.contains("T=3.000"));
    }

    #[test]
    fn test_amber_reason() {
        let state = compute_hazard_state(
            &snap(json!({})),
            &snap(json!({})),
            &snap(json!({"signal": 0.3})),
            &[],
            &HazardConfig::default(),
        );
        assert_eq!(state.zone, Zone::Amber);
        assert!(state.reason.starts_with("pre-hazard drift: E=0.700"));
    }

    #[test]
    fn test_feature_mode_distance_and_reason() {
        let mut scalers = ScalerMap::new();
        scalers.insert("lat".to_string(), RobustScaler::new(10.0, 2.0));
        let config = HazardConfig::default()
            .with_feature_specs(vec![FeatureSpec::new("lat"), FeatureSpec::new("err")])
            .with_feature_scalers(scalers);

        let state = compute_hazard_state(
            &snap(json!({"lat": 16.0, "err": 3.0, "ignored": 100.0})),
            &snap(json!({"lat": 10.0, "err": 0.0})),
            &snap(json!({"signal": 1.0})),
            &[],
            &config,
        );
        // lat: (16-10)/2 = 3 scaled, err: 3 raw
        assert!((state.t - 18f64.sqrt()).abs() < 1e-12);
        assert!(state.t_scaled);
        assert_eq!(state.contributors_top.len(), 2);
        assert_eq!(state.contributors_top[0].key, "err");
        assert_eq!(state.contributors_top[1].key, "lat");
        assert!(state.reason.ends_with("; top: err(3.000), lat(3.000)"));
    }

    #[test]
    fn test_feature_mode_without_overlap_reports_none() {
        let config = HazardConfig::default().with_feature_specs(vec![FeatureSpec::new("absent")]);
        let state = compute_hazard_state(
            &snap(json!({"m": 1.0})),
            &snap(json!({"m": 5.0})),
            &snap(json!({})),
            &[],
            &config,
        );
        assert_eq!(state.t, 0.0);
        assert!(!state.t_scaled);
        assert!(state.reason.ends_with("; top: none"));
    }

    #[test]
    fn test_state_serializes_with_wire_names() {
        let state = compute_hazard_state(
            &snap(json!({"m": 1.0})),
            &snap(json!({"m": 1.0})),
            &snap(json!({"signal": 0.9})),
            &[],
            &HazardConfig::default(),
        );
        let json = serde_json::to_value(&state).unwrap();
        for field in ["T", "S", "D", "E", "zone", "reason", "contributors_top", "T_scaled"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["zone"], "GREEN");
    }

    #[test]
    fn test_config_validate_and_deserialize() {
        let config: HazardConfig = serde_json::from_value(json!({
            "alpha": 2.0,
            "feature_specs": [{"key": "lat"}],
            "feature_scalers": {"lat": {"median": 1.0, "mad": 0.5}}
        }))
        .unwrap();
        assert_eq!(config.alpha, 2.0);
        assert_eq!(config.beta, DEFAULT_BETA);
        assert_eq!(config.min_history, DEFAULT_MIN_HISTORY);
        assert!(config.validate().is_ok());
        assert_eq!(config.feature_scalers["lat"].mad(), 0.5);

        let bad = HazardConfig::default().with_feature_specs(vec![FeatureSpec::new("")]);
        assert!(bad.validate().is_err());

        let inverted = HazardConfig::from_thresholds(Thresholds::new(2.0, 1.0));
        assert!(matches!(
            inverted.validate(),
            Err(crate::error::HazardError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_non_finite_history_is_dropped() {
        let state = compute_hazard_state(
            &snap(json!({"m": 50.0})),
            &snap(json!({"m": 0.0})),
            &snap(json!({"signal": 0.0})),
            &[f64::NAN, 1.0, f64::INFINITY],
            &HazardConfig::default(),
        );
        // window [1, 50] → D = 49
        assert!((state.d - 49.0).abs() < 1e-12);
        assert!(state.e.is_finite());
        assert_eq!(state.zone, Zone::Red);

        let window = extend_window(&[f64::NAN, 2.0, f64::NEG_INFINITY], 3.0, 3);
        assert_eq!(window, vec![2.0, 3.0]);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"min_history": 5, "stability_key": "health.score"}"#).unwrap();

        let config = HazardConfig::load(&path).unwrap();
        assert_eq!(config.min_history, 5);
        assert_eq!(config.stability_key, "health.score");
        assert_eq!(config.warn_threshold, 0.5);

        let missing = HazardConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(
            missing,
            Err(crate::error::HazardError::Config(ConfigError::FileNotFound(_)))
        ));
    }
}
