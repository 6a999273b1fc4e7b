//! ═══════════════════════════════════════════════════════════════════════════════
//! SNAPSHOT — Typed JSON-like State Trees
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Snapshots arrive as arbitrary nested maps. Instead of inspecting loose
//! types at runtime, every node is one of six tagged variants and all access
//! goes through an explicit recursive accessor.
//!
//! Numeric coercion rules (shared by extraction, stability and calibration):
//! - Number → itself when finite
//! - Bool   → 1.0 / 0.0
//! - Text   → parsed after trimming, when finite
//! - anything else → absent
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A nested snapshot: ordered key → value map
pub type Snapshot = BTreeMap<String, Value>;

/// One node of a snapshot tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(Snapshot),
}

impl Value {
    /// Coerce to a finite float, or None
    pub fn as_finite_f64(&self) -> Option<f64> {
        let x = match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            Value::Null | Value::List(_) | Value::Map(_) => return None,
        };
        x.is_finite().then_some(x)
    }

    pub fn as_map(&self) -> Option<&Snapshot> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            // u64/i64 beyond f64 precision still convert; as_f64 is None only
            // for arbitrary-precision numbers, which we treat as absent
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build a snapshot from a JSON value. Non-object input yields an empty snapshot.
pub fn from_json(json: serde_json::Value) -> Snapshot {
    match Value::from(json) {
        Value::Map(m) => m,
        _ => Snapshot::new(),
    }
}

/// Resolve a dotted path (`a.b.c`) against a snapshot.
///
/// An exact top-level key wins over traversal, so flattened snapshots whose
/// keys already contain dots resolve too. A missing level, or a level that is
/// not a map, yields None.
pub fn resolve<'a>(root: &'a Snapshot, path: &str) -> Option<&'a Value> {
    if let Some(v) = root.get(path) {
        return Some(v);
    }
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut node = root.get(first)?;
    for segment in segments {
        node = node.as_map()?.get(segment)?;
    }
    Some(node)
}

/// Resolve a path and coerce the value to a finite float
pub fn resolve_f64(root: &Snapshot, path: &str) -> Option<f64> {
    resolve(root, path).and_then(Value::as_finite_f64)
}

/// Flatten numeric leaves (finite numbers and booleans) into dotted keys.
///
/// Text, lists and nulls are not treated as features. Output is sorted by key
/// and each key appears once: when an exact dotted key collides with a nested
/// path, the value `resolve` would return wins.
pub fn flatten_numeric(root: &Snapshot) -> Vec<(String, f64)> {
    let mut leaves = Vec::new();
    flatten_into(root, "", &mut leaves);

    let mut flat: BTreeMap<String, f64> = BTreeMap::new();
    for (key, x) in leaves {
        match flat.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(x);
            }
            Entry::Occupied(mut slot) => {
                if let Some(resolved) = resolve_f64(root, slot.key()) {
                    slot.insert(resolved);
                }
            }
        }
    }
    flat.into_iter().collect()
}

fn flatten_into(map: &Snapshot, prefix: &str, out: &mut Vec<(String, f64)>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Map(inner) => flatten_into(inner, &path, out),
            Value::Number(_) | Value::Bool(_) => {
                if let Some(x) = value.as_finite_f64() {
                    out.push((path, x));
                }
            }
            Value::Null | Value::Text(_) | Value::List(_) => {}
        }
    }
}
