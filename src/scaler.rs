//! ═══════════════════════════════════════════════════════════════════════════════
//! SCALER — Median/MAD Robust Scaling
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! z(x) = (x - median) / max(|mad|, eps)
//!
//! The MAD is unscaled (no 1.4826 factor), so scores are in units of the
//! historical spread rather than a normal sigma. The eps floor keeps
//! near-constant features finite.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::error::{HazardResult, ValidationError};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Floor for the MAD denominator
pub const DEFAULT_EPS: f64 = 1e-9;

/// Per-feature scalers keyed by feature key
pub type ScalerMap = BTreeMap<String, RobustScaler>;

/// Persisted form of a scaler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactScaler {
    pub median: f64,
    pub mad: f64,
}

/// Robust location/scale fitted from historical samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CompactScaler", into = "CompactScaler")]
pub struct RobustScaler {
    median: f64,
    mad: f64,
    eps: f64,
}

impl RobustScaler {
    pub fn new(median: f64, mad: f64) -> Self {
        Self {
            median,
            mad,
            eps: DEFAULT_EPS,
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps.abs().max(f64::MIN_POSITIVE);
        self
    }

    /// Fit median and MAD over the finite samples.
    ///
    /// Errors only if no finite sample exists.
    pub fn fit(values: &[f64]) -> HazardResult<Self> {
        let finite = stats::finite_only(values);
        let median = stats::median(&finite).ok_or_else(|| {
            ValidationError::InsufficientData("robust scaler needs at least one finite sample".into())
        })?;
        let mad = stats::mad(&finite, median).unwrap_or(0.0);
        Ok(Self::new(median, mad))
    }

    pub fn median(&self) -> f64 {
        self.median
    }

    pub fn mad(&self) -> f64 {
        self.mad
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Robust z-like score
    pub fn z(&self, x: f64) -> f64 {
        (x - self.median) / self.mad.abs().max(self.eps)
    }

    pub fn to_compact(&self) -> CompactScaler {
        CompactScaler {
            median: self.median,
            mad: self.mad,
        }
    }

    pub fn from_compact(compact: CompactScaler) -> Self {
        Self::new(compact.median, compact.mad)
    }
}

impl From<CompactScaler> for RobustScaler {
    fn from(compact: CompactScaler) -> Self {
        Self::from_compact(compact)
    }
}

impl From<RobustScaler> for CompactScaler {
    fn from(scaler: RobustScaler) -> Self {
        scaler.to_compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_constant_values() {
        let scaler = RobustScaler::fit(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(scaler.median(), 1.0);
        assert_eq!(scaler.mad(), 0.0);
        assert_eq!(scaler.z(1.0), 0.0);

        let z2 = scaler.z(2.0);
        assert!(z2.is_finite());
        assert!(z2 > 1e6);
    }

    #[test]
    fn test_fit_ignores_non_finite() {
        let scaler = RobustScaler::fit(&[f64::NAN, 1.0, 2.0, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(scaler.median(), 2.0);
        assert_eq!(scaler.mad(), 1.0);
        assert_eq!(scaler.z(4.0), 2.0);
    }

    #[test]
    fn test_fit_requires_finite_sample() {
        assert!(RobustScaler::fit(&[]).is_err());
        assert!(RobustScaler::fit(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_z_finite_for_any_finite_input() {
        let scaler = RobustScaler::fit(&[5.0; 10]).unwrap();
        for x in [-1e12, -1.0, 0.0, 5.0, 1e12] {
            assert!(scaler.z(x).is_finite());
        }
    }

    #[test]
    fn test_compact_round_trip() {
        let scaler = RobustScaler::fit(&[0.1, 0.7, 0.3, 0.9, 0.2]).unwrap();
        let json = serde_json::to_string(&scaler).unwrap();
        let restored: RobustScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.median(), scaler.median());
        assert_eq!(restored.mad(), scaler.mad());

        let compact = scaler.to_compact();
        assert_eq!(RobustScaler::from_compact(compact), scaler);
    }

    #[test]
    fn test_serialized_shape_is_median_mad() {
        let json = serde_json::to_value(RobustScaler::new(2.0, 0.5)).unwrap();
        assert_eq!(json, serde_json::json!({"median": 2.0, "mad": 0.5}));
    }
}
