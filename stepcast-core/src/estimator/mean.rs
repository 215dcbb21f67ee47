//! Constant baseline: predicts the training-target mean everywhere.

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_feature_count, check_training_shape, EstimatorFailure, Regressor};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanRegressor {
    mean: Option<f64>,
    n_features: Option<usize>,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), EstimatorFailure> {
        check_training_shape(&x, &y)?;
        let mean = y.sum() / y.len() as f64;
        if !mean.is_finite() {
            return Err(EstimatorFailure::NonFinite);
        }
        self.mean = Some(mean);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, EstimatorFailure> {
        check_feature_count(&x, self.n_features)?;
        let mean = self.mean.ok_or(EstimatorFailure::NotFitted)?;
        Ok(Array1::from_elem(x.nrows(), mean))
    }

    fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn predicts_training_mean() {
        let mut m = MeanRegressor::new();
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        m.fit(x.view(), y.view()).unwrap();
        let pred = m.predict(array![[10.0], [-5.0]].view()).unwrap();
        assert_eq!(pred.to_vec(), vec![4.0, 4.0]);
    }

    #[test]
    fn predict_before_fit_fails() {
        let m = MeanRegressor::new();
        assert_eq!(
            m.predict(array![[1.0]].view()).unwrap_err(),
            EstimatorFailure::NotFitted
        );
    }

    #[test]
    fn empty_training_set_fails() {
        let mut m = MeanRegressor::new();
        let x = ndarray::Array2::<f64>::zeros((0, 2));
        let y = ndarray::Array1::<f64>::zeros(0);
        assert_eq!(
            m.fit(x.view(), y.view()).unwrap_err(),
            EstimatorFailure::EmptyTrainingSet
        );
    }
}
