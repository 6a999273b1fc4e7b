//! Forecast Scenarios - Does the public API produce the documented states?
//!
//! Run with: cargo test --test forecast_scenarios

use serde_json::json;

use hazard::feature::{FeatureSpec, Transform};
use hazard::hazard::{compute_hazard_state, ForecastInputs, HazardConfig, Zone};
use hazard::history::SeriesState;
use hazard::scaler::{RobustScaler, ScalerMap};
use hazard::snapshot::{from_json, Snapshot};

fn snap(v: serde_json::Value) -> Snapshot {
    from_json(v)
}

/// F1: identical snapshots with a healthy signal stay GREEN
#[test]
fn scenario_identical_snapshots_green() {
    let state = compute_hazard_state(
        &snap(json!({"m": 1.0})),
        &snap(json!({"m": 1.0})),
        &snap(json!({"signal": 0.9})),
        &[],
        &HazardConfig::default(),
    );
    assert_eq!(state.t, 0.0);
    assert!((state.s - 0.9).abs() < 1e-12);
    assert_eq!(state.d, 0.0);
    assert!((state.e - 0.1).abs() < 1e-12);
    assert_eq!(state.zone, Zone::Green);
    assert!(state.contributors_top.is_empty());
    assert!(!state.t_scaled);
}

/// F2: a jump with a weak signal goes RED and the window slides
#[test]
fn scenario_jump_goes_red_and_window_slides() {
    let config = HazardConfig::default();
    let series = SeriesState::from_history("gate-a", &[0.5, 1.0, 1.8], config.min_history);
    let current = snap(json!({"m": 3.0}));
    let reference = snap(json!({"m": 0.0}));
    let stability = snap(json!({"signal": 0.1}));

    let (next, state) = series.advance(
        &ForecastInputs::new(&current, &reference, &stability),
        &config,
    );

    assert_eq!(state.t, 3.0);
    assert_eq!(next.window.values(), vec![1.0, 1.8, 3.0]);
    assert!((state.d - 1.0).abs() < 1e-12);
    assert!((state.e - 1.9).abs() < 1e-12);
    assert_eq!(state.zone, Zone::Red);
    assert!(state.reason.starts_with("hazard"));

    // the previous state is untouched
    assert_eq!(series.window.values(), vec![0.5, 1.0, 1.8]);
}

/// F3: constant-value scaler stays finite
#[test]
fn scenario_constant_scaler_finite() {
    let scaler = RobustScaler::fit(&[1.0, 1.0, 1.0, 1.0]).unwrap();
    assert_eq!(scaler.median(), 1.0);
    assert_eq!(scaler.mad(), 0.0);
    assert_eq!(scaler.z(1.0), 0.0);
    let z = scaler.z(2.0);
    assert!(z.is_finite());
    assert!(z > 1.0);
}

/// F4: repeated forecasts over a series accumulate drift
#[test]
fn series_drift_accumulates_over_steps() {
    let config = HazardConfig::default();
    let mut series = SeriesState::new("gate-b", config.min_history);
    let reference = snap(json!({"m": 0.0}));
    let stability = snap(json!({"signal": 1.0}));

    let mut zones = Vec::new();
    for m in [0.0, 0.0, 2.0, 0.0, 2.0] {
        let current = snap(json!({"m": m}));
        let state = series.record(&ForecastInputs::new(&current, &reference, &stability), &config);
        zones.push(state.zone);
    }

    assert_eq!(zones[0], Zone::Green);
    assert_eq!(zones[1], Zone::Green);
    // window [0, 0, 2] → D = 1.0
    assert_eq!(zones[2], Zone::Red);
    assert_eq!(series.window.len(), config.min_history);
}

/// F5: feature mode ranks contributors and notes scaling
#[test]
fn feature_mode_reports_top_contributors() {
    let mut scalers = ScalerMap::new();
    scalers.insert("lat.p99".to_string(), RobustScaler::new(100.0, 10.0));

    let config = HazardConfig::default()
        .with_feature_specs(vec![
            FeatureSpec::new("lat.p99"),
            FeatureSpec::new("errors").with_transform(Transform::Log1p),
            FeatureSpec::new("queue").with_default(0.0),
        ])
        .with_feature_scalers(scalers);
    config.validate().unwrap();

    let state = compute_hazard_state(
        &snap(json!({"lat": {"p99": 130.0}, "errors": 0.0})),
        &snap(json!({"lat": {"p99": 100.0}, "errors": 0.0, "queue": 4.0})),
        &snap(json!({"signal": 0.5})),
        &[],
        &config,
    );

    // lat.p99: z = 3.0; errors: 0; queue: default 0 vs 4 → 4
    assert!((state.t - 5.0).abs() < 1e-9);
    assert!(state.t_scaled);
    assert_eq!(state.contributors_top[0].key, "queue");
    assert_eq!(state.contributors_top[1].key, "lat.p99");
    assert!(state.contributors_top[1].scaled);
    assert!(!state.contributors_top[0].scaled);
    assert!(state.reason.contains("; top: "));
}

/// F6: state serializes with the documented field names
#[test]
fn hazard_state_wire_shape() {
    let state = compute_hazard_state(
        &snap(json!({"m": 2.0})),
        &snap(json!({"m": 1.0})),
        &Snapshot::new(),
        &[],
        &HazardConfig::default(),
    );
    let wire = serde_json::to_value(&state).unwrap();
    assert_eq!(wire["T"], 1.0);
    assert_eq!(wire["S"], 0.5);
    assert_eq!(wire["zone"], "AMBER");
    assert_eq!(wire["T_scaled"], false);
}
