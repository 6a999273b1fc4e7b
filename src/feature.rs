//! ═══════════════════════════════════════════════════════════════════════════════
//! FEATURE — Declarative Numeric Extraction from Snapshots
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! A FeatureSpec says how to pull one number out of a nested snapshot:
//!
//! ```text
//!   resolve(key) → coerce → transform → clip
//! ```
//!
//! If a stage yields nothing, the missing policy decides: `Skip` returns None,
//! `Default` substitutes the configured default and continues with the
//! remaining stages. Runtime data never produces an error; only a structurally
//! broken spec does, and only from `validate()`.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::error::{HazardResult, ValidationError};
use crate::snapshot::{resolve, Snapshot, Value};
use serde::{Deserialize, Serialize};

/// Transform applied after coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Identity,
    /// ln(1 + x), defined for x > -1
    Log1p,
}

impl Transform {
    pub fn apply(&self, x: f64) -> Option<f64> {
        match self {
            Transform::Identity => Some(x),
            Transform::Log1p => {
                if x > -1.0 {
                    Some(x.ln_1p()).filter(|v| v.is_finite())
                } else {
                    None
                }
            }
        }
    }
}

/// What to do when a value is absent or invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    #[default]
    Skip,
    Default,
}

/// Extraction rule for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Dotted path into the snapshot
    pub key: String,
    #[serde(default)]
    pub transform: Transform,
    /// Optional [low, high] bounds applied after the transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<(f64, f64)>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub default: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl FeatureSpec {
    /// Identity transform, no clip, weight 1, skip on missing
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            transform: Transform::Identity,
            clip: None,
            weight: default_weight(),
            missing: MissingPolicy::Skip,
            default: 0.0,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_clip(mut self, low: f64, high: f64) -> Self {
        self.clip = Some((low, high));
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Substitute `default` whenever the value is absent or invalid
    pub fn with_default(mut self, default: f64) -> Self {
        self.missing = MissingPolicy::Default;
        self.default = default;
        self
    }

    /// Reject specs that can never be evaluated meaningfully
    pub fn validate(&self) -> HazardResult<()> {
        if self.key.trim().is_empty() {
            return Err(ValidationError::invalid("key", "feature key must not be empty").into());
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ValidationError::invalid(
                format!("{}.weight", self.key),
                format!("weight must be finite and >= 0, got {}", self.weight),
            )
            .into());
        }
        if let Some((low, high)) = self.clip {
            if low.is_nan() || high.is_nan() || low > high {
                return Err(ValidationError::invalid(
                    format!("{}.clip", self.key),
                    format!("clip range [{}, {}] is inverted or NaN", low, high),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Extract the feature value from a snapshot
    pub fn extract(&self, snapshot: &Snapshot) -> Option<f64> {
        let raw = resolve(snapshot, &self.key).and_then(Value::as_finite_f64);
        let coerced = self.or_default(raw)?;
        let transformed = self.or_default(self.transform.apply(coerced))?;
        Some(self.apply_clip(transformed))
    }

    fn or_default(&self, value: Option<f64>) -> Option<f64> {
        match (value, self.missing) {
            (Some(x), _) => Some(x),
            (None, MissingPolicy::Skip) => None,
            (None, MissingPolicy::Default) => Some(self.default),
        }
    }

    fn apply_clip(&self, x: f64) -> f64 {
        match self.clip {
            // clamp panics on inverted bounds
            Some((low, high)) => x.max(low).min(high),
            None => x,
        }
    }
}

/// Validate every spec, failing on the first broken one
pub fn validate_specs(specs: &[FeatureSpec]) -> HazardResult<()> {
    specs.iter().try_for_each(FeatureSpec::validate)
}
