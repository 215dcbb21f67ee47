//! Two-stage hurdle model set for zero-inflated targets.
//!
//! Each horizon carries a presence model, fitted on `target > threshold` as
//! 0/1 over every entity, and a magnitude model, fitted on the raw target of
//! entities that crossed the threshold at least once in the training window.
//! The forecast is `presence * magnitude`, forced to exactly zero when the
//! presence score is zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use super::shared::StepCore;
use super::{ModelRole, StepForecaster, StepModel};
use crate::assemble::{DiagonalTable, WideTable};
use crate::config::{ForecastConfig, ModelSpec, Steps};
use crate::error::{ConfigurationError, ForecastError, NotFittedError};
use crate::estimator::EstimatorFactory;
use crate::panel::{Panel, ValidationGate};
use crate::partition::Partition;
use crate::persist;
use crate::sink::ForecastSink;

const MODEL_NAME: &str = "HurdleStepModelSet";

/// Artifact kind written into the persistence envelope.
pub const HURDLE_MODEL_SET_KIND: &str = "hurdle_step_model_set";

/// Combined hurdle forecast for one cell.
pub fn combine(presence: f64, magnitude: f64) -> f64 {
    if presence == 0.0 {
        0.0
    } else {
        presence * magnitude
    }
}

/// The two sub-models of one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HurdleStepModel {
    pub horizon: u32,
    pub presence: StepModel,
    pub magnitude: StepModel,
}

impl HurdleStepModel {
    pub fn is_fitted(&self) -> bool {
        self.presence.is_fitted() && self.magnitude.is_fitted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HurdleStepModelSet {
    core: StepCore,
    presence: EstimatorFactory,
    magnitude: EstimatorFactory,
    threshold: f64,
    models: BTreeMap<u32, HurdleStepModel>,
}

impl HurdleStepModelSet {
    pub fn new(config: &ForecastConfig, partition: Partition) -> Result<Self, ForecastError> {
        let (presence, magnitude, threshold) = match config.validate()? {
            ModelSpec::Hurdle {
                presence,
                magnitude,
                threshold,
            } => (presence, magnitude, threshold),
            ModelSpec::Point(_) => {
                return Err(ConfigurationError::Invalid(format!(
                    "algorithm '{}' builds a StepModelSet, not a hurdle set",
                    config.algorithm
                ))
                .into())
            }
        };
        Ok(Self {
            core: StepCore::new(config, partition)?,
            presence,
            magnitude,
            threshold,
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

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn models(&self) -> &BTreeMap<u32, HurdleStepModel> {
        &self.models
    }

    pub fn model(&self, horizon: u32) -> Option<&HurdleStepModel> {
        self.models.get(&horizon)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(persist::to_bytes(HURDLE_MODEL_SET_KIND, self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        Ok(persist::from_bytes(HURDLE_MODEL_SET_KIND, bytes)?)
    }

    fn predict_horizon(&self, horizon: u32, x: ArrayView2<f64>) -> Result<Array1<f64>, ForecastError> {
        let model = self.models.get(&horizon).ok_or(NotFittedError {
            model: MODEL_NAME,
            run_type: self.core.partition.run_type,
        })?;
        let presence = self.core.predict_step(&model.presence, x)?;
        let magnitude = self.core.predict_step(&model.magnitude, x)?;
        Ok(Zip::from(&presence)
            .and(&magnitude)
            .map_collect(|&p, &m| combine(p, m)))
    }
}

impl StepForecaster for HurdleStepModelSet {
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
        !self.models.is_empty() && self.models.values().all(HurdleStepModel::is_fitted)
    }

    fn fitted_horizons(&self) -> Vec<u32> {
        self.models.keys().copied().collect()
    }

    fn failed_horizons(&self) -> &BTreeMap<u32, String> {
        &self.core.failed
    }

    fn fit(&mut self, panel: &Panel) -> Result<(), ForecastError> {
        let norm = self.core.prepare_fit(panel)?;
        let threshold = self.threshold;
        let partition = self.core.partition;
        let crossing =
            norm.entities_exceeding(threshold, partition.train_start, partition.train_end);
        tracing::debug!(
            partition = %partition.run_type,
            threshold,
            entities = crossing.len(),
            "magnitude training entities"
        );

        let (models, failed) = self.core.fit_horizons(&norm, |h| {
            let presence = self.core.fit_step(
                &norm,
                &self.presence,
                h,
                ModelRole::Presence,
                None,
                |y| if y > threshold { 1.0 } else { 0.0 },
            )?;
            let magnitude = self.core.fit_step(
                &norm,
                &self.magnitude,
                h,
                ModelRole::Magnitude,
                Some(crossing.as_slice()),
                |y| y,
            )?;
            Ok(HurdleStepModel {
                horizon: h,
                presence,
                magnitude,
            })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelIntegrityError;
    use crate::estimator::Estimator;
    use crate::panel::PanelRow;
    use crate::partition::RunType;

    /// Entity 1 never has events; entity 2 has 10 events every third month.
    fn panel() -> Panel {
        let mut rows = Vec::new();
        for t in 0..=12 {
            rows.push(PanelRow::new(t, 1, 0.0, vec![0.0]));
            let y = if t % 3 == 0 { 10.0 } else { 0.0 };
            rows.push(PanelRow::new(t, 2, y, vec![1.0]));
        }
        Panel::new("month_id", "country_id", "ged", vec!["x".into()]).with_rows(rows)
    }

    fn partition() -> Partition {
        Partition::new(RunType::Calibration, (1, 9), (10, 12)).unwrap()
    }

    fn config() -> ForecastConfig {
        ForecastConfig::hurdle(Steps::range(2).unwrap(), "ged", "linear", "mean")
    }

    #[test]
    fn zero_presence_wins_over_any_magnitude() {
        assert_eq!(combine(0.0, 1e9), 0.0);
        assert_eq!(combine(0.0, f64::MAX), 0.0);
        assert_eq!(combine(0.5, 4.0), 2.0);
    }

    #[test]
    fn point_config_is_rejected() {
        let cfg = ForecastConfig::new(Steps::range(1).unwrap(), "ged", "mean");
        assert!(matches!(
            HurdleStepModelSet::new(&cfg, partition()),
            Err(ForecastError::Configuration(ConfigurationError::Invalid(_)))
        ));
    }

    #[test]
    fn magnitude_trains_on_crossing_entities_only() {
        let mut set = HurdleStepModelSet::new(&config(), partition()).unwrap();
        set.fit(&panel()).unwrap();
        let model = set.model(1).unwrap();
        // Presence sees both entities over t = 1..=9, magnitude only entity 2.
        assert_eq!(model.presence.training_rows, 18);
        assert_eq!(model.magnitude.training_rows, 9);
        match &model.magnitude.estimator {
            Estimator::Mean(m) => assert!((m.mean().unwrap() - 10.0 / 3.0).abs() < 1e-12),
            other => panic!("unexpected estimator {other:?}"),
        }
    }

    #[test]
    fn never_active_entity_forecasts_zero() {
        let mut set = HurdleStepModelSet::new(&config(), partition()).unwrap();
        set.fit(&panel()).unwrap();
        let wide = set.predict_wide(&panel()).unwrap();
        for row in wide.rows.iter().filter(|r| r.entity_id == 1) {
            // Presence at x = 0 is the OLS intercept, zero up to rounding.
            assert!(row.predictions.iter().all(|&p| p.abs() < 1e-9), "{row:?}");
        }
    }

    #[test]
    fn presence_failure_aborts_fit_and_keeps_previous_models() {
        let cfg = ForecastConfig::hurdle(Steps::range(1).unwrap(), "ged", "linear", "mean");
        let mut set = HurdleStepModelSet::new(&cfg, partition()).unwrap();
        let mut overflowing = panel();
        for row in &mut overflowing.rows {
            row.covariates[0] = 1e200 * (row.time_id + 1) as f64;
        }

        match set.fit(&overflowing).unwrap_err() {
            ForecastError::Estimator(e) => {
                assert_eq!(e.horizon, 1);
                assert_eq!(e.role, ModelRole::Presence);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!set.is_fitted());

        set.fit(&panel()).unwrap();
        let before = set.to_bytes().unwrap();
        assert!(matches!(
            set.fit(&overflowing),
            Err(ForecastError::Estimator(_))
        ));
        assert!(set.is_fitted());
        assert_eq!(set.to_bytes().unwrap(), before);
    }

    #[test]
    fn no_crossing_entity_is_integrity_error() {
        let mut cfg = config();
        cfg.threshold = 100.0;
        let mut set = HurdleStepModelSet::new(&cfg, partition()).unwrap();
        let err = set.fit(&panel()).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::PanelIntegrity(PanelIntegrityError::EmptyTrainingSet {
                role: ModelRole::Magnitude,
                ..
            })
        ));
    }
}
