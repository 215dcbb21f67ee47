//! Plain step-shift model set: one estimator of a single kind per horizon.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::shared::StepCore;
use super::{ModelRole, StepForecaster, StepModel};
use crate::assemble::{DiagonalTable, WideTable};
use crate::config::{ForecastConfig, ModelSpec, Steps, HURDLE_ALGORITHM};
use crate::error::{ConfigurationError, ForecastError, NotFittedError};
use crate::estimator::EstimatorFactory;
use crate::panel::{Panel, ValidationGate};
use crate::partition::Partition;
use crate::persist;
use crate::sink::ForecastSink;

const MODEL_NAME: &str = "StepModelSet";

/// Artifact kind written into the persistence envelope.
pub const STEP_MODEL_SET_KIND: &str = "step_model_set";

/// Horizon → fitted model, plus everything needed to refit or predict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepModelSet {
    core: StepCore,
    factory: EstimatorFactory,
    models: BTreeMap<u32, StepModel>,
}

impl StepModelSet {
    /// Resolve the estimator and check the partition. No fitting happens here.
    pub fn new(config: &ForecastConfig, partition: Partition) -> Result<Self, ForecastError> {
        let factory = match config.validate()? {
            ModelSpec::Point(factory) => factory,
            ModelSpec::Hurdle { .. } => {
                return Err(ConfigurationError::Invalid(format!(
                    "'{HURDLE_ALGORITHM}' configurations build a HurdleStepModelSet"
                ))
                .into())
            }
        };
        Ok(Self {
            core: StepCore::new(config, partition)?,
            factory,
            models: BTreeMap::new(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ForecastSink>) -> Self {
        self.set_sink(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ForecastSink>) {
        self.core.set_sink(sink);
    }

    pub fn factory(&self) -> &EstimatorFactory {
        &self.factory
    }

    pub fn models(&self) -> &BTreeMap<u32, StepModel> {
        &self.models
    }

    pub fn model(&self, horizon: u32) -> Option<&StepModel> {
        self.models.get(&horizon)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(persist::to_bytes(STEP_MODEL_SET_KIND, self)?)
    }

    /// Restore a set written by [`to_bytes`](Self::to_bytes). The sink resets to the default.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        Ok(persist::from_bytes(STEP_MODEL_SET_KIND, bytes)?)
    }

    fn predict_horizon(&self, horizon: u32, x: ArrayView2<f64>) -> Result<Array1<f64>, ForecastError> {
        let model = self.models.get(&horizon).ok_or(NotFittedError {
            model: MODEL_NAME,
            run_type: self.core.partition.run_type,
        })?;
        self.core.predict_step(model, x)
    }
}

impl StepForecaster for StepModelSet {
    fn steps(&self) -> &Steps {
        &self.core.steps
    }

    fn partition(&self) -> &Partition {
        &self.core.partition
    }

    fn gate(&self) -> &ValidationGate {
        &self.core.gate
    }

    fn is_fitted(&self) -> bool {
        !self.models.is_empty() && self.models.values().all(StepModel::is_fitted)
    }

    fn fitted_horizons(&self) -> Vec<u32> {
        self.models.keys().copied().collect()
    }

    fn failed_horizons(&self) -> &BTreeMap<u32, String> {
        &self.core.failed
    }

    fn fit(&mut self, panel: &Panel) -> Result<(), ForecastError> {
        let norm = self.core.prepare_fit(panel)?;
        let (models, failed) = self.core.fit_horizons(&norm, |h| {
            self.core
                .fit_step(&norm, &self.factory, h, ModelRole::Point, None, |y| y)
        })?;
        self.models = models;
        self.core.failed = failed;
        self.core.covariate_names = Some(norm.covariate_names);
        Ok(())
    }

    fn predict_wide(&self, panel: &Panel) -> Result<WideTable, ForecastError> {
        let norm = self.core.prepare_predict(panel, MODEL_NAME, self.is_fitted())?;
        self.core
            .predict_wide(&norm, &self.fitted_horizons(), |h, x| self.predict_horizon(h, x))
    }

    fn predict_diagonal(&self, panel: &Panel) -> Result<DiagonalTable, ForecastError> {
        self.core.check_diagonal()?;
        let norm = self.core.prepare_predict(panel, MODEL_NAME, self.is_fitted())?;
        self.core
            .predict_diagonal(&norm, &self.fitted_horizons(), |h, x| self.predict_horizon(h, x))
    }
}
