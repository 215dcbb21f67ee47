//! Run orchestration — wires the validation gate, partition plan and model
//! sets together.
//!
//! Three entry points:
//! - `run_from_frame()`: takes a pre-loaded frame, no I/O. Used by tests and
//!   embedding callers.
//! - `run()`: loads the panel named by the spec, runs, then writes artifacts.
//! - `run_spec_file()`: `run()` from a TOML path, with `anyhow` context.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use polars::prelude::DataFrame;
use thiserror::Error;

use stepcast_core::{
    DiagonalTable, ForecastError, ForecastModel, ForecastSink, Partition, StepForecaster,
    TracingSink, ValidationGate, WideTable,
};

use crate::config::{ConfigError, RunId, RunSpec};
use crate::export::{save_artifacts, RunArtifacts};
use crate::loader::{load_panel, LoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("forecast error: {0}")]
    Forecast(#[from] ForecastError),
    #[error("export error: {0:#}")]
    Export(#[from] anyhow::Error),
}

/// The table a run produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Calibration/testing: every horizon at every predicted month, with actuals.
    Wide(WideTable),
    /// Forecasting: one true forecast per entity and horizon.
    Diagonal(DiagonalTable),
}

impl RunOutput {
    pub fn mode(&self) -> &'static str {
        match self {
            RunOutput::Wide(_) => "wide",
            RunOutput::Diagonal(_) => "diagonal",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RunOutput::Wide(t) => t.len(),
            RunOutput::Diagonal(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_wide(&self) -> Option<&WideTable> {
        match self {
            RunOutput::Wide(t) => Some(t),
            RunOutput::Diagonal(_) => None,
        }
    }

    pub fn as_diagonal(&self) -> Option<&DiagonalTable> {
        match self {
            RunOutput::Diagonal(t) => Some(t),
            RunOutput::Wide(_) => None,
        }
    }
}

/// Complete result of a single fit/predict run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: RunId,
    pub spec: RunSpec,
    pub partition: Partition,
    /// The fitted model, ready to persist.
    pub model: ForecastModel,
    pub output: RunOutput,
    /// Horizons dropped under the degraded failure policy.
    pub failed_horizons: BTreeMap<u32, String>,
    /// Rows in the validated input panel.
    pub input_rows: usize,
}

/// A run that has been loaded, executed and written to disk.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub result: RunResult,
    pub dataset_hash: String,
    pub artifacts: RunArtifacts,
}

/// Run from a pre-loaded frame with the default tracing sink.
pub fn run_from_frame(spec: &RunSpec, frame: &DataFrame) -> Result<RunResult, RunError> {
    run_from_frame_with_sink(spec, frame, Arc::new(TracingSink))
}

/// Run from a pre-loaded frame (no I/O).
///
/// Evaluation runs produce the wide table over the predict window;
/// forecasting runs cut the panel at the latest observed month and produce
/// the diagonal table.
pub fn run_from_frame_with_sink(
    spec: &RunSpec,
    frame: &DataFrame,
    sink: Arc<dyn ForecastSink>,
) -> Result<RunResult, RunError> {
    spec.validate()?;
    let partition = spec.partition()?;
    let run_id = spec.run_id();

    tracing::info!(
        run_id = %&run_id[..12],
        run_type = %spec.run_type,
        algorithm = %spec.forecast.algorithm,
        train = ?(partition.train_start, partition.train_end),
        predict = ?(partition.predict_start, partition.predict_end),
        "starting run"
    );

    let validated = ValidationGate::from_config(&spec.forecast).validate_frame(frame)?;
    let input_rows = validated.len();
    let panel = if spec.run_type.is_evaluation() {
        validated
    } else {
        // Months past the observation edge must not decide the active entity set.
        let latest = spec.plan().latest_fully_observed();
        let cut = validated.truncated(latest);
        if cut.len() < input_rows {
            tracing::debug!(
                latest_observed = latest,
                dropped = input_rows - cut.len(),
                "truncated panel at the observation edge"
            );
        }
        cut
    };
    let mut model = ForecastModel::new(&spec.forecast, partition)?.with_sink(sink);
    model.fit(&panel)?;

    let output = if spec.run_type.is_evaluation() {
        RunOutput::Wide(model.predict_wide(&panel)?)
    } else {
        RunOutput::Diagonal(model.predict_diagonal(&panel)?)
    };

    let failed_horizons = model.failed_horizons().clone();
    if !failed_horizons.is_empty() {
        tracing::warn!(
            run_id = %&run_id[..12],
            failed = ?failed_horizons.keys().collect::<Vec<_>>(),
            "run completed with failed horizons"
        );
    }
    tracing::info!(
        run_id = %&run_id[..12],
        mode = output.mode(),
        rows = output.len(),
        "run complete"
    );

    Ok(RunResult {
        run_id,
        spec: spec.clone(),
        partition,
        model,
        output,
        failed_horizons,
        input_rows,
    })
}

/// Load the spec's panel, run, and write artifacts under `output_dir`.
pub fn run(spec: &RunSpec) -> Result<CompletedRun, RunError> {
    spec.validate()?;
    let forecast = &spec.forecast;
    let keys: Vec<&str> = std::iter::once(forecast.time_key.as_str())
        .chain(forecast.entity_keys.iter().map(String::as_str))
        .collect();
    let loaded = load_panel(&spec.input)?.with_float_values(&keys)?;
    let result = run_from_frame(spec, &loaded.frame)?;
    let artifacts = save_artifacts(&result, &loaded.dataset_hash, &spec.output_dir)?;
    Ok(CompletedRun {
        result,
        dataset_hash: loaded.dataset_hash,
        artifacts,
    })
}

/// Read a TOML run spec and execute it.
pub fn run_spec_file(path: &Path) -> anyhow::Result<CompletedRun> {
    let spec = RunSpec::from_file(path)
        .with_context(|| format!("failed to load run spec {}", path.display()))?;
    run(&spec).with_context(|| format!("run from {} failed", path.display()))
}
