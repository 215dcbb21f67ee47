//! State and plumbing shared by the plain and hurdle model sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::design::{diagonal_design, training_design, wide_design};
use super::pool::HorizonPool;
use super::{ModelRole, StepModel};
use crate::assemble::{DiagonalTable, ForecastAssembler, PredictionRow, WideTable};
use crate::config::{FailurePolicy, ForecastConfig, Steps};
use crate::error::{ConfigurationError, EstimatorError, ForecastError, NotFittedError};
use crate::estimator::{EstimatorFactory, EstimatorFailure, Regressor};
use crate::panel::{NormalizedPanel, Panel, PanelNormalizer, ValidationGate};
use crate::partition::Partition;
use crate::rng::SeedHierarchy;
use crate::sink::{ForecastSink, SinkHandle};

/// Horizon-independent settings plus the fit-time feature contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StepCore {
    pub steps: Steps,
    pub partition: Partition,
    pub gate: ValidationGate,
    pub seed: u64,
    pub target_as_covariate: bool,
    pub failure_policy: FailurePolicy,
    pub max_threads: Option<usize>,
    /// Covariates seen at fit time, in order. `None` until fitted.
    pub covariate_names: Option<Vec<String>>,
    pub failed: BTreeMap<u32, String>,
    #[serde(skip)]
    pub sink: SinkHandle,
}

impl StepCore {
    pub fn new(config: &ForecastConfig, partition: Partition) -> Result<Self, ConfigurationError> {
        partition.validate()?;
        Ok(Self {
            steps: config.steps.clone(),
            partition,
            gate: ValidationGate::from_config(config),
            seed: config.seed,
            target_as_covariate: config.target_as_covariate,
            failure_policy: config.failure_policy,
            max_threads: config.max_threads,
            covariate_names: None,
            failed: BTreeMap::new(),
            sink: SinkHandle::default(),
        })
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ForecastSink>) {
        self.sink = SinkHandle::new(sink);
    }

    pub fn seeds(&self) -> SeedHierarchy {
        SeedHierarchy::new(self.seed)
    }

    pub fn pool(&self) -> HorizonPool {
        HorizonPool::new(self.max_threads)
    }

    pub fn prepare_fit(&self, panel: &Panel) -> Result<NormalizedPanel, ForecastError> {
        self.gate.validate_panel(panel)?;
        let norm = PanelNormalizer::normalize(panel)?;
        Ok(norm)
    }

    pub fn prepare_predict(
        &self,
        panel: &Panel,
        model: &'static str,
        fitted: bool,
    ) -> Result<NormalizedPanel, ForecastError> {
        let expected = match (&self.covariate_names, fitted) {
            (Some(names), true) => names,
            _ => {
                return Err(NotFittedError {
                    model,
                    run_type: self.partition.run_type,
                }
                .into())
            }
        };
        self.gate.validate_panel(panel)?;
        ValidationGate::check_feature_contract(expected, &panel.covariate_names)?;
        Ok(PanelNormalizer::normalize(panel)?)
    }

    pub fn estimator_error(&self, horizon: u32, role: ModelRole, e: EstimatorFailure) -> ForecastError {
        EstimatorError {
            horizon,
            run_type: self.partition.run_type,
            role,
            message: e.to_string(),
        }
        .into()
    }

    /// Build the `h`-lagged design and fit a fresh estimator on it.
    ///
    /// `entities` and `transform` select the training rows and target for
    /// hurdle stages; a plain set passes `None` and the identity.
    pub fn fit_step(
        &self,
        norm: &NormalizedPanel,
        factory: &EstimatorFactory,
        horizon: u32,
        role: ModelRole,
        entities: Option<&[usize]>,
        transform: impl Fn(f64) -> f64,
    ) -> Result<StepModel, ForecastError> {
        let run_type = self.partition.run_type;
        let fitted = training_design(
            norm,
            &self.partition,
            horizon,
            role,
            entities,
            self.target_as_covariate,
            transform,
        )
        .map_err(ForecastError::from)
        .and_then(|design| {
            let mut estimator = factory.build(self.seeds().sub_seed(horizon, role));
            estimator
                .fit(design.x.view(), design.y.view())
                .map_err(|e| self.estimator_error(horizon, role, e))?;
            Ok(StepModel {
                horizon,
                role,
                estimator,
                fitted: true,
                training_rows: design.len(),
            })
        });
        match &fitted {
            Ok(model) => self
                .sink
                .on_horizon_fitted(run_type, horizon, role, model.training_rows),
            Err(e) => self.report_failure(horizon, role, e),
        }
        fitted
    }

    pub fn predict_step(
        &self,
        model: &StepModel,
        x: ArrayView2<f64>,
    ) -> Result<Array1<f64>, ForecastError> {
        model
            .estimator
            .predict(x)
            .map_err(|e| self.estimator_error(model.horizon, model.role, e))
    }

    pub fn report_failure(&self, horizon: u32, role: ModelRole, err: &ForecastError) {
        self.sink
            .on_horizon_failed(self.partition.run_type, horizon, role, &err.to_string());
    }

    /// Fit every step with `job` and apply the failure policy.
    ///
    /// Returns the fitted horizons and, under the degraded policy, the failed
    /// ones. Nothing is written to the set here, so a failed call leaves the
    /// previous state untouched.
    pub fn fit_horizons<T, F>(
        &self,
        norm: &NormalizedPanel,
        job: F,
    ) -> Result<(BTreeMap<u32, T>, BTreeMap<u32, String>), ForecastError>
    where
        T: Send,
        F: Fn(u32) -> Result<T, ForecastError> + Sync + Send,
    {
        let run_type = self.partition.run_type;
        self.sink.on_fit_start(
            run_type,
            &self.steps,
            norm.n_times() * norm.entities().len(),
            norm.entities().len(),
        );

        let (fitted, failed) = match self.failure_policy {
            FailurePolicy::FailFast => {
                let models = self.pool().try_map(&self.steps, job)?;
                (models.into_iter().collect::<BTreeMap<_, _>>(), BTreeMap::new())
            }
            FailurePolicy::Degraded => {
                let mut fitted = BTreeMap::new();
                let mut failed = BTreeMap::new();
                let mut first_error = None;
                for (h, outcome) in self.pool().map_all(&self.steps, job)? {
                    match outcome {
                        Ok(model) => {
                            fitted.insert(h, model);
                        }
                        Err(e) => {
                            failed.insert(h, e.to_string());
                            first_error.get_or_insert(e);
                        }
                    }
                }
                if fitted.is_empty() {
                    if let Some(e) = first_error {
                        return Err(e);
                    }
                }
                (fitted, failed)
            }
        };

        self.sink.on_fit_complete(run_type, fitted.len(), failed.len());
        Ok((fitted, failed))
    }

    /// Wide predictions for `horizons`, assembled and joined with ground truth.
    pub fn predict_wide<F>(
        &self,
        norm: &NormalizedPanel,
        horizons: &[u32],
        predict: F,
    ) -> Result<WideTable, ForecastError>
    where
        F: Fn(u32, ArrayView2<f64>) -> Result<Array1<f64>, ForecastError> + Sync + Send,
    {
        let raw = self.raw_predictions(horizons, |h| {
            let design = wide_design(norm, &self.partition, h, self.target_as_covariate)?;
            Ok((design.keys, predict(h, design.x.view())?))
        })?;
        let table = ForecastAssembler::wide(norm, &self.partition, horizons, &raw)?;
        self.sink
            .on_predict(self.partition.run_type, "wide", table.rows.len());
        Ok(table)
    }

    /// Diagonal predictions for `horizons`, one row per `(entity, horizon)`.
    /// Callers check [`StepCore::check_diagonal`] before normalizing.
    pub fn predict_diagonal<F>(
        &self,
        norm: &NormalizedPanel,
        horizons: &[u32],
        predict: F,
    ) -> Result<DiagonalTable, ForecastError>
    where
        F: Fn(u32, ArrayView2<f64>) -> Result<Array1<f64>, ForecastError> + Sync + Send,
    {
        let raw = self.raw_predictions(horizons, |h| {
            let design = diagonal_design(norm, &self.partition, h, self.target_as_covariate)?;
            Ok((design.keys, predict(h, design.x.view())?))
        })?;
        let table = ForecastAssembler::diagonal(norm, &self.partition, &raw)?;
        self.sink
            .on_predict(self.partition.run_type, "diagonal", table.rows.len());
        Ok(table)
    }

    /// The landing arithmetic only holds when prediction starts right after training.
    pub fn check_diagonal(&self) -> Result<(), ConfigurationError> {
        let p = &self.partition;
        if p.predict_start != p.train_end + 1 {
            return Err(ConfigurationError::GappedDiagonal {
                run_type: p.run_type,
                train_end: p.train_end,
                predict_start: p.predict_start,
            });
        }
        let horizon = self.steps.max();
        let landing = p.train_end + i64::from(horizon);
        if landing > p.predict_end {
            return Err(ConfigurationError::HorizonBeyondWindow {
                run_type: p.run_type,
                horizon,
                landing,
                predict_end: p.predict_end,
            });
        }
        Ok(())
    }

    fn raw_predictions<F>(
        &self,
        horizons: &[u32],
        job: F,
    ) -> Result<Vec<PredictionRow>, ForecastError>
    where
        F: Fn(u32) -> Result<(Vec<(i64, i64)>, Array1<f64>), ForecastError> + Sync + Send,
    {
        let per_horizon = self.pool().try_map(horizons, job)?;
        let mut rows = Vec::new();
        for (horizon, (keys, values)) in per_horizon {
            rows.extend(
                keys.into_iter()
                    .zip(values.iter().copied())
                    .map(|((time_id, entity_id), value)| PredictionRow {
                        time_id,
                        entity_id,
                        horizon,
                        value,
                    }),
            );
        }
        Ok(rows)
    }
}
