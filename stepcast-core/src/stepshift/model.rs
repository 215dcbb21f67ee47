//! Configuration-driven choice between the plain and hurdle model sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{HurdleStepModelSet, StepForecaster, StepModelSet};
use crate::assemble::{DiagonalTable, WideTable};
use crate::config::{ForecastConfig, Steps};
use crate::error::ForecastError;
use crate::panel::{Panel, ValidationGate};
use crate::partition::Partition;
use crate::persist;
use crate::sink::ForecastSink;

/// Artifact kind written into the persistence envelope.
pub const FORECAST_MODEL_KIND: &str = "forecast_model";

/// Either model set, chosen by `algorithm` (`"hurdle"` or a registry key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    Step(StepModelSet),
    Hurdle(HurdleStepModelSet),
}

impl ForecastModel {
    pub fn new(config: &ForecastConfig, partition: Partition) -> Result<Self, ForecastError> {
        if config.is_hurdle() {
            Ok(ForecastModel::Hurdle(HurdleStepModelSet::new(config, partition)?))
        } else {
            Ok(ForecastModel::Step(StepModelSet::new(config, partition)?))
        }
    }

    pub fn with_sink(self, sink: Arc<dyn ForecastSink>) -> Self {
        match self {
            ForecastModel::Step(m) => ForecastModel::Step(m.with_sink(sink)),
            ForecastModel::Hurdle(m) => ForecastModel::Hurdle(m.with_sink(sink)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ForecastModel::Step(_) => "step",
            ForecastModel::Hurdle(_) => "hurdle",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(persist::to_bytes(FORECAST_MODEL_KIND, self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        Ok(persist::from_bytes(FORECAST_MODEL_KIND, bytes)?)
    }

    fn inner(&self) -> &dyn StepForecaster {
        match self {
            ForecastModel::Step(m) => m,
            ForecastModel::Hurdle(m) => m,
        }
    }
}

impl StepForecaster for ForecastModel {
    fn steps(&self) -> &Steps {
        self.inner().steps()
    }

    fn partition(&self) -> &Partition {
        self.inner().partition()
    }

    fn gate(&self) -> &ValidationGate {
        self.inner().gate()
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn fitted_horizons(&self) -> Vec<u32> {
        self.inner().fitted_horizons()
    }

    fn failed_horizons(&self) -> &BTreeMap<u32, String> {
        self.inner().failed_horizons()
    }

    fn fit(&mut self, panel: &Panel) -> Result<(), ForecastError> {
        match self {
            ForecastModel::Step(m) => m.fit(panel),
            ForecastModel::Hurdle(m) => m.fit(panel),
        }
    }

    fn predict_wide(&self, panel: &Panel) -> Result<WideTable, ForecastError> {
        self.inner().predict_wide(panel)
    }

    fn predict_diagonal(&self, panel: &Panel) -> Result<DiagonalTable, ForecastError> {
        self.inner().predict_diagonal(panel)
    }
}
