//! Regression estimators behind a common `Regressor` capability.
//!
//! The set of estimators is closed: [`Estimator`] enumerates every registry
//! member so fitted models can be serialized without trait-object tricks, and
//! [`EstimatorFactory`] resolves string keys at configuration time.

pub mod forest;
pub mod linear;
pub mod mean;
pub mod registry;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use forest::RandomForest;
pub use linear::LinearRegressor;
pub use mean::MeanRegressor;
pub use registry::{EstimatorFactory, EstimatorKind};

/// Backend-level failure. Wrapped into `EstimatorError` with horizon context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorFailure {
    #[error("no training rows")]
    EmptyTrainingSet,
    #[error("dimension mismatch: {rows} feature rows vs {targets} targets")]
    DimensionMismatch { rows: usize, targets: usize },
    #[error("expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },
    #[error("normal equations are singular")]
    SingularSystem,
    #[error("fit produced non-finite parameters")]
    NonFinite,
    #[error("estimator used before fit")]
    NotFitted,
}

/// `fit(X, y)` / `predict(X) -> y` over dense feature matrices.
pub trait Regressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), EstimatorFailure>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, EstimatorFailure>;

    fn is_fitted(&self) -> bool;
}

/// Shape checks shared by every estimator's `fit`.
pub(crate) fn check_training_shape(
    x: &ArrayView2<f64>,
    y: &ArrayView1<f64>,
) -> Result<(), EstimatorFailure> {
    if x.nrows() != y.len() {
        return Err(EstimatorFailure::DimensionMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if y.is_empty() {
        return Err(EstimatorFailure::EmptyTrainingSet);
    }
    Ok(())
}

pub(crate) fn check_feature_count(
    x: &ArrayView2<f64>,
    n_features: Option<usize>,
) -> Result<(), EstimatorFailure> {
    let expected = n_features.ok_or(EstimatorFailure::NotFitted)?;
    if x.ncols() != expected {
        return Err(EstimatorFailure::FeatureCount {
            expected,
            got: x.ncols(),
        });
    }
    Ok(())
}

/// Every estimator the registry can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Mean(MeanRegressor),
    Linear(LinearRegressor),
    RandomForest(RandomForest),
}

impl Regressor for Estimator {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), EstimatorFailure> {
        match self {
            Estimator::Mean(m) => m.fit(x, y),
            Estimator::Linear(m) => m.fit(x, y),
            Estimator::RandomForest(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, EstimatorFailure> {
        let out = match self {
            Estimator::Mean(m) => m.predict(x),
            Estimator::Linear(m) => m.predict(x),
            Estimator::RandomForest(m) => m.predict(x),
        }?;
        if out.iter().all(|v| v.is_finite()) {
            Ok(out)
        } else {
            Err(EstimatorFailure::NonFinite)
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Estimator::Mean(m) => m.is_fitted(),
            Estimator::Linear(m) => m.is_fitted(),
            Estimator::RandomForest(m) => m.is_fitted(),
        }
    }
}
