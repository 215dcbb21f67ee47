//! Least-squares regression: OLS (`alpha = 0`) and ridge (`alpha > 0`).
//!
//! Solves `(Xc'Xc + αI) β = Xc'yc` on centered data with a Cholesky
//! factorization; the intercept is recovered from the column means.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{check_feature_count, check_training_shape, EstimatorFailure, Regressor};

/// Diagonal jitter keeping the normal equations positive definite when a
/// covariate is constant (e.g. an all-zero filled column).
const JITTER: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    alpha: f64,
    fit_intercept: bool,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegressor {
    pub fn ols(fit_intercept: bool) -> Self {
        Self::ridge(0.0, fit_intercept)
    }

    pub fn ridge(alpha: f64, fit_intercept: bool) -> Self {
        Self {
            alpha,
            fit_intercept,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), EstimatorFailure> {
        check_training_shape(&x, &y)?;
        let p = x.ncols();

        let (x_mean, y_mean) = if self.fit_intercept {
            let x_mean = x
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(p));
            (x_mean, y.sum() / y.len() as f64)
        } else {
            (Array1::zeros(p), 0.0)
        };

        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut xtx = xc.t().dot(&xc);
        for i in 0..p {
            xtx[[i, i]] += self.alpha + JITTER;
        }
        let xty = xc.t().dot(&yc);

        let beta = cholesky_solve(&xtx, &xty)?;
        let intercept = if self.fit_intercept {
            y_mean - x_mean.dot(&beta)
        } else {
            0.0
        };

        if !intercept.is_finite() || beta.iter().any(|b| !b.is_finite()) {
            return Err(EstimatorFailure::NonFinite);
        }
        self.coefficients = Some(beta);
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, EstimatorFailure> {
        let beta = self.coefficients.as_ref().ok_or(EstimatorFailure::NotFitted)?;
        check_feature_count(&x, Some(beta.len()))?;
        Ok(x.dot(beta) + self.intercept)
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Solve `A x = b` for symmetric positive definite `A` (`A = L L'`).
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, EstimatorFailure> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(EstimatorFailure::SingularSystem);
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ols_recovers_exact_line() {
        // y = 2 + 3a - b
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [2.0, 3.0], [4.0, 1.0]];
        let y = x.map_axis(Axis(1), |r| 2.0 + 3.0 * r[0] - r[1]);
        let mut m = LinearRegressor::ols(true);
        m.fit(x.view(), y.view()).unwrap();

        let beta = m.coefficients().unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-6);
        assert!((beta[1] + 1.0).abs() < 1e-6);
        assert!((m.intercept() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut ols = LinearRegressor::ols(true);
        let mut ridge = LinearRegressor::ridge(10.0, true);
        ols.fit(x.view(), y.view()).unwrap();
        ridge.fit(x.view(), y.view()).unwrap();
        assert!(ridge.coefficients().unwrap()[0].abs() < ols.coefficients().unwrap()[0].abs());
    }

    #[test]
    fn constant_zero_column_is_tolerated() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut m = LinearRegressor::ols(true);
        m.fit(x.view(), y.view()).unwrap();
        assert!(m.coefficients().unwrap()[1].abs() < 1e-6);
    }

    #[test]
    fn no_features_fits_intercept_only() {
        let x = Array2::<f64>::zeros((3, 0));
        let y = array![1.0, 2.0, 6.0];
        let mut m = LinearRegressor::ols(true);
        m.fit(x.view(), y.view()).unwrap();
        let pred = m.predict(Array2::<f64>::zeros((2, 0)).view()).unwrap();
        assert_eq!(pred.to_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn wrong_feature_count_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0];
        let mut m = LinearRegressor::ols(true);
        m.fit(x.view(), y.view()).unwrap();
        assert_eq!(
            m.predict(array![[1.0, 2.0]].view()).unwrap_err(),
            EstimatorFailure::FeatureCount {
                expected: 1,
                got: 2
            }
        );
    }
}
