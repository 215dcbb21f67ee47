//! Behavioural guarantees of the step model sets.
//!
//! Tests:
//! 1. Determinism: identical inputs give identical wide output, across thread counts
//! 2. Horizon independence: a horizon's predictions ignore which other steps exist
//! 3. Serialization round-trip for plain and hurdle sets
//! 4. Sink events for a normal fit
//! 5. Configuration-from-TOML drives a hurdle run

use std::sync::Arc;

use stepcast_core::sink::RecordingSink;
use stepcast_core::{
    ForecastConfig, ForecastModel, HurdleStepModelSet, Panel, PanelRow, Partition, RunType,
    StepForecaster, StepModelSet, Steps,
};

// ── Helpers ──────────────────────────────────────────────────────────

/// 40 months × 6 entities, two covariates, sparse event counts.
fn panel() -> Panel {
    let mut rows = Vec::new();
    for t in 1..=40i64 {
        for e in 1..=6i64 {
            let a = ((t * 31 + e * 17) % 23) as f64 / 23.0;
            let b = ((t + e) % 5) as f64;
            let y = if (t + e) % 4 == 0 { a * 20.0 + b } else { 0.0 };
            rows.push(PanelRow::new(t, e, y, vec![a, b]));
        }
    }
    Panel::new("month_id", "priogrid_gid", "ged_sb", vec!["a".into(), "b".into()]).with_rows(rows)
}

fn partition() -> Partition {
    Partition::new(RunType::Testing, (5, 30), (31, 40)).unwrap()
}

fn forest_config(steps: Vec<i64>) -> ForecastConfig {
    let mut config = ForecastConfig::new(Steps::new(steps).unwrap(), "ged_sb", "random_forest");
    config.seed = 2024;
    config.parameters.insert("n_trees".into(), 15.0);
    config.parameters.insert("min_samples_leaf".into(), 2.0);
    config.parameters.insert("max_features".into(), 1.0);
    config
}

fn hurdle_config() -> ForecastConfig {
    let mut config =
        ForecastConfig::hurdle(Steps::range(4).unwrap(), "ged_sb", "random_forest", "ridge");
    config.seed = 11;
    config.clf_parameters.insert("n_trees".into(), 10.0);
    config.reg_parameters.insert("alpha".into(), 0.5);
    config
}

// ── 1. Determinism ───────────────────────────────────────────────────

#[test]
fn repeated_runs_are_identical() {
    let run = |threads: Option<usize>| {
        let mut config = forest_config(vec![1, 2, 3, 6]);
        config.max_threads = threads;
        let mut set = StepModelSet::new(&config, partition()).unwrap();
        set.fit(&panel()).unwrap();
        let wide = set.predict_wide(&panel()).unwrap();
        serde_json::to_vec(&wide).unwrap()
    };
    let first = run(None);
    assert_eq!(first, run(None));
    assert_eq!(first, run(Some(1)));
    assert_eq!(first, run(Some(3)));
}

// ── 2. Horizon independence ──────────────────────────────────────────

#[test]
fn horizon_predictions_do_not_depend_on_other_steps() {
    let mut all = StepModelSet::new(&forest_config(vec![1, 2, 3, 4, 5]), partition()).unwrap();
    all.fit(&panel()).unwrap();
    let mut only = StepModelSet::new(&forest_config(vec![3]), partition()).unwrap();
    only.fit(&panel()).unwrap();

    let from_all = all.predict_wide(&panel()).unwrap().predictions_for(3).unwrap();
    let from_only = only.predict_wide(&panel()).unwrap().predictions_for(3).unwrap();
    assert_eq!(from_all, from_only);
    assert_eq!(all.model(3), only.model(3));
}

// ── 3. Round-trip ────────────────────────────────────────────────────

#[test]
fn restored_step_set_predicts_identically() {
    let mut set = StepModelSet::new(&forest_config(vec![1, 2, 3]), partition()).unwrap();
    set.fit(&panel()).unwrap();
    let restored = StepModelSet::from_bytes(&set.to_bytes().unwrap()).unwrap();

    assert_eq!(
        set.predict_wide(&panel()).unwrap(),
        restored.predict_wide(&panel()).unwrap()
    );
    assert_eq!(restored.partition(), &partition());
    assert_eq!(
        set.predict_diagonal(&panel()).unwrap(),
        restored.predict_diagonal(&panel()).unwrap()
    );
}

#[test]
fn restored_hurdle_set_predicts_identically() {
    let mut set = HurdleStepModelSet::new(&hurdle_config(), partition()).unwrap();
    set.fit(&panel()).unwrap();
    let restored = HurdleStepModelSet::from_bytes(&set.to_bytes().unwrap()).unwrap();
    assert_eq!(
        set.predict_wide(&panel()).unwrap(),
        restored.predict_wide(&panel()).unwrap()
    );
}

#[test]
fn artifact_kinds_are_not_interchangeable() {
    let mut set = StepModelSet::new(&forest_config(vec![1]), partition()).unwrap();
    set.fit(&panel()).unwrap();
    let bytes = set.to_bytes().unwrap();
    assert!(HurdleStepModelSet::from_bytes(&bytes).is_err());
    assert!(ForecastModel::from_bytes(&bytes).is_err());
}

// ── 4. Sink ──────────────────────────────────────────────────────────

#[test]
fn sink_sees_every_horizon() {
    let sink = Arc::new(RecordingSink::new());
    let mut set = HurdleStepModelSet::new(&hurdle_config(), partition())
        .unwrap()
        .with_sink(sink.clone());
    set.fit(&panel()).unwrap();
    set.predict_wide(&panel()).unwrap();

    let events = sink.events();
    assert!(events[0].starts_with("fit_start testing horizons=4"));
    for h in 1..=4 {
        let rows = (31 - (h + 1).max(5)) * 6;
        assert!(events.contains(&format!("fitted testing h={h} presence rows={rows}")));
        assert!(events
            .iter()
            .any(|e| e.starts_with(&format!("fitted testing h={h} magnitude"))));
    }
    assert!(events.contains(&"fit_complete testing fitted=4 failed=0".to_string()));
    assert_eq!(events.last().unwrap(), "predict testing wide rows=60");
}

// ── 5. TOML configuration ────────────────────────────────────────────

#[test]
fn toml_config_builds_a_hurdle_model() {
    let toml = r#"
        steps = [1, 2, 3]
        depvar = "ged_sb"
        algorithm = "hurdle"
        model_clf = "random_forest"
        model_reg = "linear"
        threshold = 0.5
        seed = 3
        target_as_covariate = true

        [clf_parameters]
        n_trees = 5
        max_depth = 3

        [partitions]
        forecast_train_start = 5
    "#;
    let config = ForecastConfig::from_toml(toml).unwrap();
    assert_eq!(config.entity_keys, vec!["country_id", "priogrid_gid"]);
    let mut model = ForecastModel::new(&config, partition()).unwrap();
    assert_eq!(model.kind(), "hurdle");
    model.fit(&panel()).unwrap();
    let wide = model.predict_wide(&panel()).unwrap();
    assert_eq!(wide.horizons, vec![1, 2, 3]);
    assert!(wide
        .rows
        .iter()
        .all(|r| r.predictions.iter().all(|p| p.is_finite())));
}
