//! ═══════════════════════════════════════════════════════════════════════════════
//! HISTORY — Per-Series Distance Window
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The forecast engine never owns history. Each monitored series carries its
//! own `SeriesState`, and a forecast step is a pure transition:
//!
//! ```text
//!   (SeriesState, inputs) → (SeriesState', HazardState)
//! ```
//!
//! One state per series; never share a state between threads mutably.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::hazard::{forecast_with_window, ForecastInputs, HazardConfig, HazardState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Persisted form of a window, re-bounded on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredWindow {
    values: Vec<f64>,
    capacity: usize,
}

/// Bounded ring buffer of recent finite T values, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredWindow", into = "StoredWindow")]
pub struct HistoryWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from a sequence, keeping only the newest `capacity` entries
    pub fn from_values(values: impl IntoIterator<Item = f64>, capacity: usize) -> Self {
        let mut window = Self::with_capacity(capacity);
        for v in values {
            window.push(v);
        }
        window
    }

    /// Append, evicting the oldest entries beyond capacity. Non-finite values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}

impl From<StoredWindow> for HistoryWindow {
    fn from(stored: StoredWindow) -> Self {
        let mut window = Self {
            values: VecDeque::new(),
            capacity: stored.capacity,
        };
        for v in stored.values {
            window.push(v);
        }
        window
    }
}

impl From<HistoryWindow> for StoredWindow {
    fn from(window: HistoryWindow) -> Self {
        Self {
            values: window.values(),
            capacity: window.capacity,
        }
    }
}

/// Runtime state for one monitored series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesState {
    pub series_id: String,
    pub window: HistoryWindow,
}

impl SeriesState {
    pub fn new(series_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            series_id: series_id.into(),
            window: HistoryWindow::with_capacity(capacity),
        }
    }

    /// Resume a series from persisted T values
    pub fn from_history(series_id: impl Into<String>, history: &[f64], capacity: usize) -> Self {
        Self {
            series_id: series_id.into(),
            window: HistoryWindow::from_values(history.iter().copied(), capacity),
        }
    }

    /// Pure forecast step; `self` is left untouched
    pub fn advance(&self, inputs: &ForecastInputs<'_>, config: &HazardConfig) -> (SeriesState, HazardState) {
        let (state, window) = forecast_with_window(inputs, &self.window.values(), config);
        let next = SeriesState {
            series_id: self.series_id.clone(),
            window: HistoryWindow::from_values(window, config.min_history),
        };
        (next, state)
    }

    /// In-place convenience over `advance`
    pub fn record(&mut self, inputs: &ForecastInputs<'_>, config: &HazardConfig) -> HazardState {
        let (next, state) = self.advance(inputs, config);
        *self = next;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::from_json;
    use serde_json::json;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = HistoryWindow::with_capacity(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.values(), vec![2.0, 3.0, 4.0]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_window_zero_capacity_stays_empty() {
        let mut window = HistoryWindow::with_capacity(0);
        window.push(1.0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_push_ignores_non_finite() {
        let mut window = HistoryWindow::with_capacity(3);
        for v in [1.0, f64::NAN, 2.0, f64::INFINITY] {
            window.push(v);
        }
        assert_eq!(window.values(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_deserialize_rebounds_oversized_window() {
        let state: SeriesState = serde_json::from_value(json!({
            "series_id": "gate-a",
            "window": {"values": [0.1, 0.2, 0.3, 0.4, 0.5], "capacity": 3}
        }))
        .unwrap();
        assert_eq!(state.window.values(), vec![0.3, 0.4, 0.5]);
        assert_eq!(state.window.capacity(), 3);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["window"]["values"], json!([0.3, 0.4, 0.5]));
        assert_eq!(json["window"]["capacity"], 3);
    }

    #[test]
    fn test_from_values_keeps_newest() {
        let window = HistoryWindow::from_values([0.5, 1.0, 1.8], 2);
        assert_eq!(window.values(), vec![1.0, 1.8]);
    }

    #[test]
    fn test_advance_is_pure() {
        let config = HazardConfig {
            min_history: 3,
            ..HazardConfig::default()
        };
        let current = from_json(json!({"m": 3.0}));
        let reference = from_json(json!({"m": 0.0}));
        let stability = from_json(json!({"signal": 0.1}));
        let inputs = ForecastInputs::new(&current, &reference, &stability);

        let state = SeriesState::from_history("gate-a", &[0.5, 1.0, 1.8], 3);
        let (next, out) = state.advance(&inputs, &config);

        assert_eq!(state.window.values(), vec![0.5, 1.0, 1.8]);
        assert_eq!(next.window.values(), vec![1.0, 1.8, 3.0]);
        assert_eq!(next.series_id, "gate-a");
        assert!((out.d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_record_threads_history() {
        let config = HazardConfig::default();
        let reference = from_json(json!({"m": 0.0}));
        let stability = from_json(json!({"signal": 1.0}));
        let mut series = SeriesState::new("s", config.min_history);

        for m in [1.0, 2.0, 4.0, 8.0] {
            let current = from_json(json!({ "m": m }));
            series.record(&ForecastInputs::new(&current, &reference, &stability), &config);
        }
        assert_eq!(series.window.values(), vec![2.0, 4.0, 8.0]);
    }
}
