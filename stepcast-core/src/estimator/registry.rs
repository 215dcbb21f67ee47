//! Closed estimator registry — string keys to concrete estimators.
//!
//! Keys and parameters are resolved when the configuration is validated, so
//! an unknown key, an unknown parameter name or an out-of-range value is a
//! `ConfigurationError` long before any horizon is fitted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Estimator, LinearRegressor, MeanRegressor, RandomForest};
use crate::error::ConfigurationError;

/// Every key the registry knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Mean,
    Linear,
    Ridge,
    RandomForest,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 4] = [
        EstimatorKind::Mean,
        EstimatorKind::Linear,
        EstimatorKind::Ridge,
        EstimatorKind::RandomForest,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EstimatorKind::Mean => "mean",
            EstimatorKind::Linear => "linear",
            EstimatorKind::Ridge => "ridge",
            EstimatorKind::RandomForest => "random_forest",
        }
    }

    /// Parameter names accepted by this estimator.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            EstimatorKind::Mean => &[],
            EstimatorKind::Linear => &["fit_intercept"],
            EstimatorKind::Ridge => &["alpha", "fit_intercept"],
            EstimatorKind::RandomForest => {
                &["n_trees", "max_depth", "min_samples_leaf", "max_features"]
            }
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EstimatorKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EstimatorKind::ALL
            .into_iter()
            .find(|k| k.key() == s)
            .ok_or_else(|| ConfigurationError::UnknownEstimator(s.to_string()))
    }
}

/// A resolved registry key plus its validated hyperparameters.
///
/// `build` produces a fresh, unfitted estimator; every horizon gets its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorFactory {
    kind: EstimatorKind,
    params: BTreeMap<String, f64>,
}

impl EstimatorFactory {
    pub fn resolve(key: &str, params: &BTreeMap<String, f64>) -> Result<Self, ConfigurationError> {
        let kind: EstimatorKind = key.parse()?;
        let factory = Self {
            kind,
            params: params.clone(),
        };
        factory.validate()?;
        Ok(factory)
    }

    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, f64> {
        &self.params
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let accepted = self.kind.parameters();
        if let Some(name) = self.params.keys().find(|n| !accepted.contains(&n.as_str())) {
            return Err(ConfigurationError::UnknownParameter {
                estimator: self.kind.key().to_string(),
                name: name.clone(),
            });
        }
        match self.kind {
            EstimatorKind::Mean => Ok(()),
            EstimatorKind::Linear => self.check_flag("fit_intercept"),
            EstimatorKind::Ridge => {
                self.check_flag("fit_intercept")?;
                self.check("alpha", |v| v >= 0.0, "must be >= 0")
            }
            EstimatorKind::RandomForest => {
                self.check("n_trees", is_positive_integer, "must be a positive integer")?;
                self.check("max_depth", is_positive_integer, "must be a positive integer")?;
                self.check(
                    "min_samples_leaf",
                    is_positive_integer,
                    "must be a positive integer",
                )?;
                self.check("max_features", |v| v > 0.0 && v <= 1.0, "must be in (0, 1]")
            }
        }
    }

    fn check(
        &self,
        name: &str,
        ok: impl Fn(f64) -> bool,
        reason: &'static str,
    ) -> Result<(), ConfigurationError> {
        match self.params.get(name) {
            Some(&value) if !(value.is_finite() && ok(value)) => {
                Err(ConfigurationError::InvalidParameter {
                    estimator: self.kind.key().to_string(),
                    name: name.to_string(),
                    value,
                    reason,
                })
            }
            _ => Ok(()),
        }
    }

    fn check_flag(&self, name: &str) -> Result<(), ConfigurationError> {
        self.check(name, |v| v == 0.0 || v == 1.0, "must be 0 or 1")
    }

    fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }

    fn param_usize(&self, name: &str, default: usize) -> usize {
        self.params
            .get(name)
            .copied()
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    /// A fresh, unfitted estimator. `seed` drives stochastic estimators only.
    pub fn build(&self, seed: u64) -> Estimator {
        let fit_intercept = self.param("fit_intercept", 1.0) == 1.0;
        match self.kind {
            EstimatorKind::Mean => Estimator::Mean(MeanRegressor::new()),
            EstimatorKind::Linear => Estimator::Linear(LinearRegressor::ols(fit_intercept)),
            EstimatorKind::Ridge => Estimator::Linear(LinearRegressor::ridge(
                self.param("alpha", 1.0),
                fit_intercept,
            )),
            EstimatorKind::RandomForest => Estimator::RandomForest(RandomForest::new(
                self.param_usize("n_trees", 100),
                self.param_usize("max_depth", 8),
                self.param_usize("min_samples_leaf", 5),
                self.param("max_features", 1.0 / 3.0),
                seed,
            )),
        }
    }
}

fn is_positive_integer(v: f64) -> bool {
    v >= 1.0 && v.fract() == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::Regressor;

    fn params(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn every_key_resolves() {
        for kind in EstimatorKind::ALL {
            let factory = EstimatorFactory::resolve(kind.key(), &BTreeMap::new()).unwrap();
            assert_eq!(factory.kind(), kind);
            assert!(!factory.build(0).is_fitted());
        }
    }

    #[test]
    fn unknown_key_rejected() {
        assert_eq!(
            EstimatorFactory::resolve("LGBMRegressor", &BTreeMap::new()).unwrap_err(),
            ConfigurationError::UnknownEstimator("LGBMRegressor".into())
        );
    }

    #[test]
    fn unknown_parameter_rejected() {
        let err = EstimatorFactory::resolve("ridge", &params(&[("n_trees", 10.0)])).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownParameter { .. }));
    }

    #[test]
    fn out_of_range_parameters_rejected() {
        assert!(EstimatorFactory::resolve("ridge", &params(&[("alpha", -1.0)])).is_err());
        assert!(EstimatorFactory::resolve("random_forest", &params(&[("n_trees", 0.0)])).is_err());
        assert!(
            EstimatorFactory::resolve("random_forest", &params(&[("max_features", 1.5)])).is_err()
        );
        assert!(EstimatorFactory::resolve("linear", &params(&[("fit_intercept", 0.5)])).is_err());
    }

    #[test]
    fn build_passes_parameters_through() {
        let factory = EstimatorFactory::resolve(
            "random_forest",
            &params(&[("n_trees", 3.0), ("max_depth", 2.0)]),
        )
        .unwrap();
        assert!(matches!(factory.build(99), Estimator::RandomForest(_)));
        assert_eq!(factory.build(99), factory.build(99));
        assert_ne!(factory.build(99), factory.build(100));
    }
}
