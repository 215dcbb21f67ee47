//! Injected logging sink.
//!
//! Model sets report progress through a `ForecastSink` handed to them by the
//! caller instead of reaching for process-wide state. `TracingSink` forwards
//! events to `tracing`; `NullSink` drops them.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crate::partition::RunType;
use crate::stepshift::ModelRole;

/// Progress and failure callbacks for fit/predict runs.
pub trait ForecastSink: Send + Sync {
    /// Called once before horizons are dispatched.
    fn on_fit_start(&self, run_type: RunType, horizons: &[u32], rows: usize, entities: usize);

    /// Called when a horizon's estimator has been fitted.
    fn on_horizon_fitted(&self, run_type: RunType, horizon: u32, role: ModelRole, rows: usize);

    /// Called when a horizon's estimator failed.
    fn on_horizon_failed(&self, run_type: RunType, horizon: u32, role: ModelRole, message: &str);

    /// Called after all horizons have been merged into the set.
    fn on_fit_complete(&self, run_type: RunType, fitted: usize, failed: usize);

    /// Called after a prediction table has been assembled.
    fn on_predict(&self, run_type: RunType, mode: &'static str, rows: usize);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ForecastSink for TracingSink {
    fn on_fit_start(&self, run_type: RunType, horizons: &[u32], rows: usize, entities: usize) {
        tracing::info!(
            partition = %run_type,
            horizons = horizons.len(),
            rows,
            entities,
            "fitting step models"
        );
    }

    fn on_horizon_fitted(&self, run_type: RunType, horizon: u32, role: ModelRole, rows: usize) {
        tracing::debug!(partition = %run_type, horizon, role = %role, rows, "horizon fitted");
    }

    fn on_horizon_failed(&self, run_type: RunType, horizon: u32, role: ModelRole, message: &str) {
        tracing::warn!(
            partition = %run_type,
            horizon,
            role = %role,
            error = message,
            "horizon failed"
        );
    }

    fn on_fit_complete(&self, run_type: RunType, fitted: usize, failed: usize) {
        tracing::info!(partition = %run_type, fitted, failed, "fit complete");
    }

    fn on_predict(&self, run_type: RunType, mode: &'static str, rows: usize) {
        tracing::info!(partition = %run_type, mode, rows, "predictions assembled");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ForecastSink for NullSink {
    fn on_fit_start(&self, _: RunType, _: &[u32], _: usize, _: usize) {}
    fn on_horizon_fitted(&self, _: RunType, _: u32, _: ModelRole, _: usize) {}
    fn on_horizon_failed(&self, _: RunType, _: u32, _: ModelRole, _: &str) {}
    fn on_fit_complete(&self, _: RunType, _: usize, _: usize) {}
    fn on_predict(&self, _: RunType, _: &'static str, _: usize) {}
}

/// Records events in memory. Used by tests to assert on alerts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ForecastSink for RecordingSink {
    fn on_fit_start(&self, run_type: RunType, horizons: &[u32], rows: usize, entities: usize) {
        self.push(format!(
            "fit_start {run_type} horizons={} rows={rows} entities={entities}",
            horizons.len()
        ));
    }

    fn on_horizon_fitted(&self, run_type: RunType, horizon: u32, role: ModelRole, rows: usize) {
        self.push(format!("fitted {run_type} h={horizon} {role} rows={rows}"));
    }

    fn on_horizon_failed(&self, run_type: RunType, horizon: u32, role: ModelRole, message: &str) {
        self.push(format!("failed {run_type} h={horizon} {role}: {message}"));
    }

    fn on_fit_complete(&self, run_type: RunType, fitted: usize, failed: usize) {
        self.push(format!("fit_complete {run_type} fitted={fitted} failed={failed}"));
    }

    fn on_predict(&self, run_type: RunType, mode: &'static str, rows: usize) {
        self.push(format!("predict {run_type} {mode} rows={rows}"));
    }
}

/// Default sink for freshly built or deserialized model sets.
pub fn default_sink() -> Arc<dyn ForecastSink> {
    Arc::new(TracingSink)
}

/// Shared sink held by a model set. Not persisted; defaults to [`TracingSink`].
#[derive(Clone)]
pub struct SinkHandle(Arc<dyn ForecastSink>);

impl SinkHandle {
    pub fn new(sink: Arc<dyn ForecastSink>) -> Self {
        Self(sink)
    }
}

impl Default for SinkHandle {
    fn default() -> Self {
        Self(default_sink())
    }
}

impl Deref for SinkHandle {
    type Target = dyn ForecastSink;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SinkHandle")
    }
}
