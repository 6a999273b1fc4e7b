//! ═══════════════════════════════════════════════════════════════════════════════
//! STATS — Order Statistics for Scaling and Calibration
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Core statistical tools:
//! - Median/MAD for robust central tendency and scale
//! - Linear-interpolated percentiles for threshold calibration
//! - Welford variance for summary blocks
//!
//! Every function here sorts a private copy and never panics on NaN.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Total order for f64 sorting (NaN sorts as equal, use on finite data)
pub fn float_cmp(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Keep only finite samples
pub fn finite_only(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(float_cmp);
    sorted
}

fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    Some(median)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROBUST STATS — Median and MAD
// ═══════════════════════════════════════════════════════════════════════════════

/// Median of the samples
pub fn median(values: &[f64]) -> Option<f64> {
    median_of_sorted(&sorted_copy(values))
}

/// Median absolute deviation from the median.
///
/// Unscaled: no 1.4826 normal-consistency factor is applied.
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|&x| (x - center).abs()).collect();
    median(&deviations)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERCENTILES — Linear interpolation between closest ranks
// ═══════════════════════════════════════════════════════════════════════════════

/// Percentile of already-sorted data, `p` in [0, 1].
///
/// Position is `p * (n - 1)`, interpolated linearly between the neighbouring
/// ranks. `p` is clamped to [0, 1].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }
    let pos = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Percentile of unsorted data
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    percentile_sorted(&sorted_copy(values), p)
}

/// Interquartile spread (p75 - p25)
pub fn iqr(values: &[f64]) -> Option<f64> {
    let sorted = sorted_copy(values);
    Some(percentile_sorted(&sorted, 0.75)? - percentile_sorted(&sorted, 0.25)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VARIANCE TRACKER — Online variance estimation
// ═══════════════════════════════════════════════════════════════════════════════

/// Welford's online variance algorithm
#[derive(Debug, Clone, Default)]
pub struct VarianceTracker {
    count: u64,
    mean: f64,
    m2: f64, // Sum of squared deviations
}

impl VarianceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with new sample
    pub fn update(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Current variance (population)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUMMARY — Descriptive block stored in calibration artifacts
// ═══════════════════════════════════════════════════════════════════════════════

/// Statistical summary of a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl SummaryStats {
    /// Compute stats from samples; non-finite samples are ignored
    pub fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted_copy(&finite_only(samples));
        if sorted.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                median: 0.0,
                std_dev: 0.0,
            };
        }

        let mut tracker = VarianceTracker::new();
        for &s in &sorted {
            tracker.update(s);
        }

        Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: tracker.mean(),
            median: median_of_sorted(&sorted).unwrap_or(0.0),
            std_dev: tracker.std_dev(),
        }
    }
}
