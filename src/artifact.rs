//! ═══════════════════════════════════════════════════════════════════════════════
//! ARTIFACT — Calibration Output Schema
//! ═══════════════════════════════════════════════════════════════════════════════
//! Written once per calibration run, read by the threshold/scaler loaders.
//! All maps are BTreeMaps so the emitted JSON is byte-stable across runs.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::scaler::RobustScaler;
use crate::stats::SummaryStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema tag for the feature scaler block
pub const SCALER_SCHEMA: &str = "robust_scaler/v1";

/// Ranking rule recorded alongside recommendations
pub const RANKING_RULE: &str = "coverage_desc,iqr_desc,key_asc";

/// Provenance of a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub generated_at: String,
    pub source: String,
    pub total_lines: usize,
    pub parsed_events: usize,
    pub skipped_lines: usize,
    pub warn_percentile: f64,
    pub crit_percentile: f64,
}

/// Thresholds computed over all series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalThresholds {
    pub warn_threshold: f64,
    pub crit_threshold: f64,
    pub stats: SummaryStats,
}

/// Thresholds for one series with enough samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesThresholds {
    pub warn_threshold: f64,
    pub crit_threshold: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerStats {
    pub snapshot_events: usize,
    pub min_snapshot_events: usize,
    pub min_feature_samples: usize,
    pub fitted: usize,
    /// False when too few snapshot-bearing events existed to fit anything
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScalerBlock {
    pub schema: String,
    pub stats: ScalerStats,
    pub features: BTreeMap<String, RobustScaler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCoverage {
    pub present: usize,
    pub missing: usize,
    pub coverage: f64,
}

/// Entry of the most-missing hotspot list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingHotspot {
    pub key: String,
    pub missing: usize,
    pub coverage: f64,
}

/// How the recommended feature list was selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationMeta {
    pub min_coverage: f64,
    pub max_features: usize,
    pub fallback_used: bool,
    pub candidate_count: usize,
    pub eligible_count: usize,
    pub ranking: String,
}

/// The full calibration artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub meta: ArtifactMeta,
    pub global: GlobalThresholds,
    pub per_series: BTreeMap<String, SeriesThresholds>,
    pub feature_scalers: FeatureScalerBlock,
    pub feature_coverage: BTreeMap<String, FeatureCoverage>,
    pub feature_coverage_top_missing: Vec<MissingHotspot>,
    pub recommended_features: Vec<String>,
    pub recommendation: RecommendationMeta,
}
