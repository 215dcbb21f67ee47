//! Step-shift forecasting: one independent model per horizon.
//!
//! [`StepModelSet`] fits a single estimator kind for every configured step;
//! [`HurdleStepModelSet`] splits each horizon into presence and magnitude
//! models. [`ForecastModel`] picks between them from a [`ForecastConfig`].
//!
//! [`ForecastConfig`]: crate::config::ForecastConfig

pub mod design;
pub mod hurdle;
pub mod model;
pub mod model_set;
pub(crate) mod pool;
pub(crate) mod shared;

use std::collections::BTreeMap;
use std::fmt;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::assemble::{DiagonalTable, WideTable};
use crate::config::Steps;
use crate::error::ForecastError;
use crate::estimator::{Estimator, Regressor};
use crate::panel::{Panel, ValidationGate};
use crate::partition::Partition;

pub use hurdle::{HurdleStepModel, HurdleStepModelSet};
pub use model::ForecastModel;
pub use model_set::StepModelSet;

/// Which sub-model of a horizon an estimator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// The only model of a plain step set.
    Point,
    /// Hurdle stage one: probability-like score of `target > threshold`.
    Presence,
    /// Hurdle stage two: size given presence.
    Magnitude,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Point => "point",
            ModelRole::Presence => "presence",
            ModelRole::Magnitude => "magnitude",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted estimator bound to one horizon. Never shared across horizons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepModel {
    pub horizon: u32,
    pub role: ModelRole,
    pub estimator: Estimator,
    pub fitted: bool,
    /// Rows in the lagged design the estimator was fitted on.
    pub training_rows: usize,
}

impl StepModel {
    pub fn is_fitted(&self) -> bool {
        self.fitted && self.estimator.is_fitted()
    }
}

/// The surface shared by every step-shift model set.
pub trait StepForecaster: Send + Sync {
    fn steps(&self) -> &Steps;

    fn partition(&self) -> &Partition;

    fn gate(&self) -> &ValidationGate;

    fn is_fitted(&self) -> bool;

    /// Horizons with a usable model, ascending.
    fn fitted_horizons(&self) -> Vec<u32>;

    /// Horizons dropped under the degraded policy, with the failure message.
    fn failed_horizons(&self) -> &BTreeMap<u32, String>;

    fn fit(&mut self, panel: &Panel) -> Result<(), ForecastError>;

    /// Evaluation output: one column per horizon over the predict window.
    fn predict_wide(&self, panel: &Panel) -> Result<WideTable, ForecastError>;

    /// Forecast output: horizon `h` lands at `train_end + h`.
    fn predict_diagonal(&self, panel: &Panel) -> Result<DiagonalTable, ForecastError>;

    fn fit_frame(&mut self, df: &DataFrame) -> Result<(), ForecastError> {
        let panel = self.gate().validate_frame(df)?;
        self.fit(&panel)
    }

    fn predict_wide_frame(&self, df: &DataFrame) -> Result<WideTable, ForecastError> {
        let panel = self.gate().validate_frame(df)?;
        self.predict_wide(&panel)
    }

    fn predict_diagonal_frame(&self, df: &DataFrame) -> Result<DiagonalTable, ForecastError> {
        let panel = self.gate().validate_frame(df)?;
        self.predict_diagonal(&panel)
    }
}
