//! ═══════════════════════════════════════════════════════════════════════════════
//! CONTRIBUTION — Per-Feature Explainability for the Distance T
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Decomposes the feature-space distance into weighted per-feature deltas so
//! an operator can see which features moved the hazard index.
//!
//! All orderings are deterministic: contributions keep spec declaration order,
//! top-k ties break on ascending key.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::feature::FeatureSpec;
use crate::scaler::ScalerMap;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Full per-feature bookkeeping for one forecast call
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContribution {
    pub key: String,
    pub current: f64,
    pub reference: f64,
    pub delta: f64,
    pub z_current: f64,
    pub z_reference: f64,
    pub delta_z: f64,
    pub weight: f64,
    pub weighted_delta_z: f64,
    /// |weighted_delta_z|
    pub contrib: f64,
    /// Whether a robust scaler was applied
    pub scaled: bool,
}

/// Compact record of a contribution, the only form that gets logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorSummary {
    pub key: String,
    pub delta: f64,
    pub delta_z: f64,
    pub weighted_delta_z: f64,
    pub contrib: f64,
    pub scaled: bool,
}

impl From<&FeatureContribution> for ContributorSummary {
    fn from(c: &FeatureContribution) -> Self {
        Self {
            key: c.key.clone(),
            delta: c.delta,
            delta_z: c.delta_z,
            weighted_delta_z: c.weighted_delta_z,
            contrib: c.contrib,
            scaled: c.scaled,
        }
    }
}

/// Compute contributions for every spec present in both snapshots.
///
/// A feature absent on either side is dropped entirely.
pub fn compute_feature_contributions(
    current: &Snapshot,
    reference: &Snapshot,
    specs: &[FeatureSpec],
    scalers: &ScalerMap,
) -> Vec<FeatureContribution> {
    specs
        .iter()
        .filter_map(|spec| {
            let cur = spec.extract(current)?;
            let reference = spec.extract(reference)?;

            let (z_current, z_reference, scaled) = match scalers.get(&spec.key) {
                Some(scaler) => (scaler.z(cur), scaler.z(reference), true),
                None => (cur, reference, false),
            };
            let delta_z = z_current - z_reference;
            let weighted_delta_z = spec.weight * delta_z;

            Some(FeatureContribution {
                key: spec.key.clone(),
                current: cur,
                reference,
                delta: cur - reference,
                z_current,
                z_reference,
                delta_z,
                weight: spec.weight,
                weighted_delta_z,
                contrib: weighted_delta_z.abs(),
                scaled,
            })
        })
        .collect()
}

/// sqrt(Σ weighted_delta_z²), 0 for no contributions
pub fn weighted_l2_distance(contributions: &[FeatureContribution]) -> f64 {
    contributions
        .iter()
        .map(|c| c.weighted_delta_z * c.weighted_delta_z)
        .sum::<f64>()
        .sqrt()
}

/// Largest contributors strictly above `min_contrib`, ties on ascending key
pub fn top_contributors(
    contributions: &[FeatureContribution],
    k: usize,
    min_contrib: f64,
) -> Vec<FeatureContribution> {
    if k == 0 {
        return Vec::new();
    }
    let mut top: Vec<FeatureContribution> = contributions
        .iter()
        .filter(|c| c.contrib > min_contrib)
        .cloned()
        .collect();
    top.sort_by(|a, b| {
        b.contrib
            .partial_cmp(&a.contrib)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    top.truncate(k);
    top
}

/// `"top: key1(v1), key2(v2)"` or `"top: none"`
pub fn format_top_contributors_reason(top: &[FeatureContribution]) -> String {
    if top.is_empty() {
        return "top: none".to_string();
    }
    let parts: Vec<String> = top
        .iter()
        .map(|c| format!("{}({:.3})", c.key, c.contrib))
        .collect();
    format!("top: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::RobustScaler;
    use crate::snapshot::from_json;
    use serde_json::json;

    fn contribution(key: &str, contrib: f64) -> FeatureContribution {
        FeatureContribution {
            key: key.to_string(),
            current: contrib,
            reference: 0.0,
            delta: contrib,
            z_current: contrib,
            z_reference: 0.0,
            delta_z: contrib,
            weight: 1.0,
            weighted_delta_z: contrib,
            contrib,
            scaled: false,
        }
    }

    #[test]
    fn test_contributions_raw_and_scaled() {
        let current = from_json(json!({"lat": 12.0, "err": {"rate": 0.3}}));
        let reference = from_json(json!({"lat": 10.0, "err": {"rate": 0.1}}));
        let specs = vec![
            FeatureSpec::new("lat").with_weight(2.0),
            FeatureSpec::new("err.rate"),
        ];
        let mut scalers = ScalerMap::new();
        scalers.insert("err.rate".to_string(), RobustScaler::new(0.1, 0.1));

        let contribs = compute_feature_contributions(&current, &reference, &specs, &scalers);
        assert_eq!(contribs.len(), 2);

        let lat = &contribs[0];
        assert_eq!(lat.key, "lat");
        assert!(!lat.scaled);
        assert_eq!(lat.delta, 2.0);
        assert_eq!(lat.weighted_delta_z, 4.0);
        assert_eq!(lat.contrib, 4.0);

        let err = &contribs[1];
        assert!(err.scaled);
        assert!((err.z_current - 2.0).abs() < 1e-9);
        assert!(err.z_reference.abs() < 1e-9);
        assert!((err.delta_z - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_contributions_drop_absent_features_in_order() {
        let current = from_json(json!({"a": 1.0, "b": 2.0, "c": 3.0}));
        let reference = from_json(json!({"a": 0.0, "c": 1.0}));
        let specs = vec![FeatureSpec::new("c"), FeatureSpec::new("b"), FeatureSpec::new("a")];
        let contribs = compute_feature_contributions(&current, &reference, &specs, &ScalerMap::new());
        let keys: Vec<&str> = contribs.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn test_negative_delta_gives_positive_contrib() {
        let current = from_json(json!({"a": 1.0}));
        let reference = from_json(json!({"a": 4.0}));
        let contribs = compute_feature_contributions(
            &current,
            &reference,
            &[FeatureSpec::new("a").with_weight(0.5)],
            &ScalerMap::new(),
        );
        assert_eq!(contribs[0].weighted_delta_z, -1.5);
        assert_eq!(contribs[0].contrib, 1.5);
    }

    #[test]
    fn test_weighted_l2_distance() {
        assert_eq!(weighted_l2_distance(&[]), 0.0);
        let contribs = vec![contribution("a", 3.0), contribution("b", 4.0)];
        assert_eq!(weighted_l2_distance(&contribs), 5.0);
    }

    #[test]
    fn test_top_contributors_deterministic_ties() {
        let contribs = vec![
            contribution("zeta", 2.0),
            contribution("alpha", 2.0),
            contribution("mid", 5.0),
            contribution("tiny", 0.5),
        ];
        let top = top_contributors(&contribs, 3, 0.0);
        let keys: Vec<&str> = top.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["mid", "alpha", "zeta"]);
    }

    #[test]
    fn test_top_contributors_k_zero_and_min_filter() {
        let contribs = vec![contribution("a", 1.0), contribution("b", 0.5)];
        assert!(top_contributors(&contribs, 0, 0.0).is_empty());

        // strictly greater than min_contrib
        let top = top_contributors(&contribs, 5, 0.5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "a");

        let zero = vec![contribution("z", 0.0)];
        assert!(top_contributors(&zero, 5, 0.0).is_empty());
    }

    #[test]
    fn test_format_reason() {
        assert_eq!(format_top_contributors_reason(&[]), "top: none");
        let top = vec![contribution("lat", 4.0), contribution("err.rate", 1.23456)];
        assert_eq!(
            format_top_contributors_reason(&top),
            "top: lat(4.000), err.rate(1.235)"
        );
    }

    #[test]
    fn test_summary_is_compact_copy() {
        let c = contribution("a", 2.0);
        let summary = ContributorSummary::from(&c);
        assert_eq!(summary.key, "a");
        assert_eq!(summary.contrib, 2.0);
        assert!(!summary.scaled);
    }
}
