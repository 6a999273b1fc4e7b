//! ═══════════════════════════════════════════════════════════════════════════════
//! CALIBRATION — Offline Threshold and Feature-Scaler Learning
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Reads a JSONL event log of past forecasts and learns:
//!
//! - **Thresholds**: warn/crit as percentiles of historical E, globally and
//!   per series (series below the sample minimum are omitted, not defaulted)
//! - **Feature scalers**: median/MAD per flattened snapshot key
//! - **Coverage**: how often each feature key was present
//! - **Recommendations**: a bounded, ranked list of feature keys worth using
//!
//! ## Input line shape
//!
//! ```text
//! {"series_id": "gate-a", "hazard": {"E": 0.42, ...}, "snapshot": {...}}
//! ```
//!
//! Unparseable lines, and lines without a finite `hazard.E`, are skipped.
//!
//! ## Failure policy
//!
//! Operator mistakes (missing log, empty log, bad percentiles or limits) are
//! errors. Once inputs validate, a complete artifact is always written, and
//! written atomically.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::artifact::{
    ArtifactMeta, CalibrationArtifact, FeatureCoverage, FeatureScalerBlock, GlobalThresholds,
    MissingHotspot, RecommendationMeta, ScalerStats, SeriesThresholds, RANKING_RULE, SCALER_SCHEMA,
};
use crate::error::{CalibrationError, HazardResult};
use crate::scaler::{RobustScaler, ScalerMap};
use crate::snapshot::{flatten_numeric, from_json, Snapshot};
use crate::stats::{self, SummaryStats};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Calibration knobs (all exposed as CLI flags)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Percentile of E used as warn threshold
    pub warn_percentile: f64,
    /// Percentile of E used as crit threshold
    pub crit_percentile: f64,
    /// Minimum E values before a series gets its own thresholds
    pub min_series_samples: usize,
    /// Minimum snapshot-bearing events before any scaler is fitted
    pub min_snapshot_events: usize,
    /// Minimum samples of one key before its scaler is fitted
    pub min_feature_samples: usize,
    /// Coverage floor for recommended features
    pub min_coverage: f64,
    /// Maximum recommended features
    pub max_features: usize,
    /// Length of the most-missing hotspot list
    pub top_missing: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warn_percentile: 0.85,
            crit_percentile: 0.97,
            min_series_samples: 20,
            min_snapshot_events: 20,
            min_feature_samples: 20,
            min_coverage: 0.8,
            max_features: 12,
            top_missing: 10,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> HazardResult<()> {
        let (warn, crit) = (self.warn_percentile, self.crit_percentile);
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        if !in_unit(warn) || !in_unit(crit) || warn >= crit {
            return Err(CalibrationError::InvalidPercentiles { warn, crit }.into());
        }
        if !in_unit(self.min_coverage) {
            return Err(CalibrationError::invalid_argument(
                "min-coverage",
                format!("must be within [0, 1], got {}", self.min_coverage),
            )
            .into());
        }
        if self.max_features == 0 {
            return Err(CalibrationError::invalid_argument("max-features", "must be at least 1").into());
        }
        for (flag, value) in [
            ("min-series-samples", self.min_series_samples),
            ("min-snapshot-events", self.min_snapshot_events),
            ("min-feature-samples", self.min_feature_samples),
        ] {
            if value == 0 {
                return Err(CalibrationError::invalid_argument(flag, "must be at least 1").into());
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// One usable historical forecast
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// None keeps the event in the global pool only
    pub series_id: Option<String>,
    pub e: f64,
    pub snapshot: Option<Snapshot>,
}

/// Parsed log with line accounting
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub events: Vec<LogEvent>,
    /// Non-blank lines seen
    pub total_lines: usize,
    pub skipped_lines: usize,
}

/// Parse one JSONL line; None for anything unusable
pub fn parse_event(line: &str) -> Option<LogEvent> {
    let json: serde_json::Value = serde_json::from_str(line).ok()?;
    let obj = json.as_object()?;
    let e = obj
        .get("hazard")?
        .get("E")?
        .as_f64()
        .filter(|e| e.is_finite())?;
    let series_id = obj
        .get("series_id")
        .and_then(|s| s.as_str())
        .map(str::to_string);
    let snapshot = obj
        .get("snapshot")
        .filter(|s| s.is_object())
        .map(|s| from_json(s.clone()));
    Some(LogEvent {
        series_id,
        e,
        snapshot,
    })
}

/// Parse a whole log, skipping bad lines. Only real I/O failures error.
pub fn parse_log<R: BufRead>(reader: R) -> HazardResult<ParsedLog> {
    let mut parsed = ParsedLog::default();
    for raw in reader.split(b'\n') {
        let raw = raw?;
        let Ok(line) = String::from_utf8(raw) else {
            parsed.total_lines += 1;
            parsed.skipped_lines += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        parsed.total_lines += 1;
        match parse_event(line) {
            Some(event) => parsed.events.push(event),
            None => parsed.skipped_lines += 1,
        }
    }
    Ok(parsed)
}

/// Open and parse a log file
pub fn read_log(path: &Path) -> HazardResult<ParsedLog> {
    let file = fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CalibrationError::LogNotFound(path.display().to_string()).into()
        } else {
            crate::error::HazardError::from(e)
        }
    })?;
    parse_log(BufReader::new(file))
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURE COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Flattened snapshot samples and per-key presence
#[derive(Debug, Clone, Default)]
pub struct FeatureCollector {
    samples: BTreeMap<String, Vec<f64>>,
    presence: BTreeMap<String, usize>,
    snapshot_events: usize,
}

impl FeatureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one snapshot; each flattened key yields one sample and one presence
    pub fn observe(&mut self, snapshot: &Snapshot) {
        self.snapshot_events += 1;
        for (key, value) in flatten_numeric(snapshot) {
            self.samples.entry(key.clone()).or_default().push(value);
            *self.presence.entry(key).or_insert(0) += 1;
        }
    }

    pub fn snapshot_events(&self) -> usize {
        self.snapshot_events
    }

    pub fn samples(&self, key: &str) -> Option<&[f64]> {
        self.samples.get(key).map(Vec::as_slice)
    }

    /// Fit a scaler per key with enough samples, if enough snapshots exist
    pub fn fit_scalers(&self, min_snapshot_events: usize, min_feature_samples: usize) -> ScalerMap {
        if self.snapshot_events < min_snapshot_events {
            return ScalerMap::new();
        }
        self.samples
            .iter()
            .filter(|(_, values)| values.len() >= min_feature_samples)
            .filter_map(|(key, values)| RobustScaler::fit(values).ok().map(|s| (key.clone(), s)))
            .collect()
    }

    /// Presence ratio per key over snapshot-bearing events
    pub fn coverage(&self) -> BTreeMap<String, FeatureCoverage> {
        let events = self.snapshot_events;
        self.presence
            .iter()
            .map(|(key, &present)| {
                let coverage = if events == 0 {
                    0.0
                } else {
                    present as f64 / events as f64
                };
                let entry = FeatureCoverage {
                    present,
                    missing: events.saturating_sub(present),
                    coverage,
                };
                (key.clone(), entry)
            })
            .collect()
    }
}

/// Most-missing keys, `(missing desc, key asc)`, only keys with missing > 0
pub fn top_missing(coverage: &BTreeMap<String, FeatureCoverage>, limit: usize) -> Vec<MissingHotspot> {
    let mut hotspots: Vec<MissingHotspot> = coverage
        .iter()
        .filter(|(_, c)| c.missing > 0)
        .map(|(key, c)| MissingHotspot {
            key: key.clone(),
            missing: c.missing,
            coverage: c.coverage,
        })
        .collect();
    hotspots.sort_by(|a, b| b.missing.cmp(&a.missing).then_with(|| a.key.cmp(&b.key)));
    hotspots.truncate(limit);
    hotspots
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOMMENDATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rank scaler-bearing features for future forecast configs.
///
/// Candidates passing `coverage >= min_coverage` are ranked by
/// `(coverage desc, IQR desc, key asc)`. If none pass but candidates exist,
/// all candidates are ranked instead and `fallback_used` is set.
pub fn recommend_features(
    collector: &FeatureCollector,
    scalers: &ScalerMap,
    coverage: &BTreeMap<String, FeatureCoverage>,
    min_coverage: f64,
    max_features: usize,
) -> (Vec<String>, RecommendationMeta) {
    let ranked: Vec<(String, f64, f64)> = scalers
        .keys()
        .map(|key| {
            let cov = coverage.get(key).map(|c| c.coverage).unwrap_or(0.0);
            let spread = collector
                .samples(key)
                .and_then(stats::iqr)
                .unwrap_or(0.0);
            (key.clone(), cov, spread)
        })
        .collect();

    let eligible: Vec<(String, f64, f64)> = ranked
        .iter()
        .filter(|(_, cov, _)| *cov >= min_coverage)
        .cloned()
        .collect();
    let eligible_count = eligible.len();
    let fallback_used = eligible.is_empty() && !ranked.is_empty();

    let mut pool = if fallback_used { ranked.clone() } else { eligible };
    pool.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
            .then_with(|| a.0.cmp(&b.0))
    });
    pool.truncate(max_features);

    if fallback_used {
        warn!(
            candidates = ranked.len(),
            min_coverage, "no feature meets the coverage floor, ranking all candidates"
        );
    }

    let meta = RecommendationMeta {
        min_coverage,
        max_features,
        fallback_used,
        candidate_count: ranked.len(),
        eligible_count,
        ranking: RANKING_RULE.to_string(),
    };
    (pool.into_iter().map(|(key, _, _)| key).collect(), meta)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALIBRATE
// ═══════════════════════════════════════════════════════════════════════════════

fn thresholds_at(values: &[f64], config: &CalibrationConfig) -> (f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(stats::float_cmp);
    let warn = stats::percentile_sorted(&sorted, config.warn_percentile).unwrap_or(0.0);
    let crit = stats::percentile_sorted(&sorted, config.crit_percentile).unwrap_or(0.0);
    (warn, crit)
}

/// Build the artifact from parsed events
pub fn calibrate(
    parsed: &ParsedLog,
    source: &str,
    config: &CalibrationConfig,
) -> HazardResult<CalibrationArtifact> {
    config.validate()?;
    if parsed.events.is_empty() {
        return Err(CalibrationError::EmptyLog(source.to_string()).into());
    }

    let mut all_e = Vec::with_capacity(parsed.events.len());
    let mut by_series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut collector = FeatureCollector::new();

    for event in &parsed.events {
        all_e.push(event.e);
        if let Some(id) = event.series_id.as_deref() {
            by_series.entry(id).or_default().push(event.e);
        }
        if let Some(snapshot) = &event.snapshot {
            collector.observe(snapshot);
        }
    }

    let (warn_threshold, crit_threshold) = thresholds_at(&all_e, config);
    let global = GlobalThresholds {
        warn_threshold,
        crit_threshold,
        stats: SummaryStats::from_samples(&all_e),
    };

    let per_series: BTreeMap<String, SeriesThresholds> = by_series
        .iter()
        .filter(|(_, values)| values.len() >= config.min_series_samples)
        .map(|(id, values)| {
            let (warn_threshold, crit_threshold) = thresholds_at(values, config);
            let entry = SeriesThresholds {
                warn_threshold,
                crit_threshold,
                count: values.len(),
            };
            (id.to_string(), entry)
        })
        .collect();
    debug!(
        series = by_series.len(),
        calibrated = per_series.len(),
        "per-series thresholds computed"
    );

    let scalers = collector.fit_scalers(config.min_snapshot_events, config.min_feature_samples);
    let coverage = collector.coverage();
    let hotspots = top_missing(&coverage, config.top_missing);
    let (recommended, recommendation) = recommend_features(
        &collector,
        &scalers,
        &coverage,
        config.min_coverage,
        config.max_features,
    );

    let feature_scalers = FeatureScalerBlock {
        schema: SCALER_SCHEMA.to_string(),
        stats: ScalerStats {
            snapshot_events: collector.snapshot_events(),
            min_snapshot_events: config.min_snapshot_events,
            min_feature_samples: config.min_feature_samples,
            fitted: scalers.len(),
            enabled: collector.snapshot_events() >= config.min_snapshot_events,
        },
        features: scalers,
    };

    Ok(CalibrationArtifact {
        meta: ArtifactMeta {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: source.to_string(),
            total_lines: parsed.total_lines,
            parsed_events: parsed.events.len(),
            skipped_lines: parsed.skipped_lines,
            warn_percentile: config.warn_percentile,
            crit_percentile: config.crit_percentile,
        },
        global,
        per_series,
        feature_scalers,
        feature_coverage: coverage,
        feature_coverage_top_missing: hotspots,
        recommended_features: recommended,
        recommendation,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE I/O
// ═══════════════════════════════════════════════════════════════════════════════

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "calibration.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the artifact via temp file + rename so readers never see a partial file
pub fn write_artifact(path: &Path, artifact: &CalibrationArtifact) -> HazardResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(artifact)?;
    let tmp = temp_path_for(path);
    if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Load a previously written artifact
pub fn load_artifact(path: &Path) -> HazardResult<CalibrationArtifact> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_summary(artifact: &CalibrationArtifact, out_path: &Path) {
    let meta = &artifact.meta;
    let global = &artifact.global;

    println!("═══════════════════════════════════════════════════════════════════════════════");
    println!("                         CALIBRATION COMPLETE");
    println!("═══════════════════════════════════════════════════════════════════════════════");
    println!();
    println!("Source:        {}", meta.source);
    println!(
        "Lines:         {} total, {} events, {} skipped",
        meta.total_lines, meta.parsed_events, meta.skipped_lines
    );
    println!("Artifact:      {}", out_path.display());
    println!();
    println!("┌─────────────────────────────────────────────────────────────────────────────┐");
    println!(
        "│ SCOPE               COUNT      WARN (p{:<4})   CRIT (p{:<4})                  │",
        pct(meta.warn_percentile),
        pct(meta.crit_percentile)
    );
    println!("├─────────────────────────────────────────────────────────────────────────────┤");
    println!(
        "│ {:<18} {:>6}      {:>10.4}     {:>10.4}                        │",
        "global", global.stats.count, global.warn_threshold, global.crit_threshold
    );
    for (id, entry) in &artifact.per_series {
        println!(
            "│ {:<18} {:>6}      {:>10.4}     {:>10.4}                        │",
            truncate(id, 18),
            entry.count,
            entry.warn_threshold,
            entry.crit_threshold
        );
    }
    println!("└─────────────────────────────────────────────────────────────────────────────┘");
    println!();

    let scalers = &artifact.feature_scalers;
    if scalers.stats.enabled {
        println!(
            "Feature scalers: {} fitted from {} snapshot events",
            scalers.stats.fitted, scalers.stats.snapshot_events
        );
    } else {
        println!(
            "Feature scalers: omitted ({} snapshot events, need {})",
            scalers.stats.snapshot_events, scalers.stats.min_snapshot_events
        );
    }

    if !artifact.feature_coverage_top_missing.is_empty() {
        println!("Most-missing features:");
        for hotspot in &artifact.feature_coverage_top_missing {
            println!(
                "  {:<40} missing={:<6} coverage={:.2}",
                hotspot.key, hotspot.missing, hotspot.coverage
            );
        }
    }

    let rec = &artifact.recommendation;
    if artifact.recommended_features.is_empty() {
        println!("Recommended features: none (no scaler-bearing candidates)");
    } else {
        println!(
            "Recommended features ({} of {} candidates, min coverage {:.2}):",
            artifact.recommended_features.len(),
            rec.candidate_count,
            rec.min_coverage
        );
        for key in &artifact.recommended_features {
            println!("  - {}", key);
        }
        if rec.fallback_used {
            println!();
            println!("⚠ WARNING: no feature met the coverage floor; list ranks all candidates.");
        }
    }
}

fn pct(p: f64) -> String {
    format!("{:.0}", p * 100.0)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let head: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate, read, calibrate and write. Returns the artifact for display.
pub fn run_calibrate(
    log_path: &Path,
    out_path: &Path,
    config: &CalibrationConfig,
) -> HazardResult<CalibrationArtifact> {
    config.validate()?;
    let parsed = read_log(log_path)?;
    if parsed.skipped_lines > 0 {
        warn!(
            skipped = parsed.skipped_lines,
            total = parsed.total_lines,
            "skipped unusable log lines"
        );
    }
    let artifact = calibrate(&parsed, &log_path.display().to_string(), config)?;
    write_artifact(out_path, &artifact)?;
    info!(
        path = %out_path.display(),
        events = artifact.meta.parsed_events,
        series = artifact.per_series.len(),
        scalers = artifact.feature_scalers.stats.fitted,
        "calibration artifact written"
    );
    Ok(artifact)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
