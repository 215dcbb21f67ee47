//! Forecast configuration — steps, target, estimator keys, hyperparameters.
//!
//! Deserialized from TOML by the caller. Estimator keys are resolved through
//! the closed registry in [`ForecastConfig::model_spec`], so an unknown key or
//! parameter surfaces as a `ConfigurationError` before any fitting starts.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::estimator::EstimatorFactory;
use crate::partition::PartitionConfig;

/// Key that selects the two-stage hurdle model instead of a single estimator.
pub const HURDLE_ALGORITHM: &str = "hurdle";

/// Validated forecast horizons: non-empty, positive, strictly ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct Steps(Vec<u32>);

impl Steps {
    pub fn new(steps: Vec<i64>) -> Result<Self, ConfigurationError> {
        if steps.is_empty() {
            return Err(ConfigurationError::EmptySteps);
        }
        if let Some(&bad) = steps.iter().find(|&&s| s <= 0) {
            return Err(ConfigurationError::NonPositiveStep(bad));
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigurationError::UnorderedSteps(steps));
        }
        steps
            .iter()
            .map(|&s| u32::try_from(s).map_err(|_| ConfigurationError::StepOutOfRange(s)))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Horizons `1..=n`.
    pub fn range(n: u32) -> Result<Self, ConfigurationError> {
        Self::new((1..=i64::from(n)).collect())
    }

    pub fn max(&self) -> u32 {
        // Non-empty by construction.
        self.0.last().copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl Deref for Steps {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.0
    }
}

impl TryFrom<Vec<i64>> for Steps {
    type Error = ConfigurationError;

    fn try_from(v: Vec<i64>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<Steps> for Vec<i64> {
    fn from(s: Steps) -> Self {
        s.0.into_iter().map(i64::from).collect()
    }
}

/// What happens when one horizon's estimator fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole call on the first failing horizon.
    #[default]
    FailFast,
    /// Keep the horizons that succeeded and report the failed ones.
    Degraded,
}

fn default_time_key() -> String {
    "month_id".to_string()
}

fn default_entity_keys() -> Vec<String> {
    vec!["country_id".to_string(), "priogrid_gid".to_string()]
}

fn default_threshold() -> f64 {
    1.0
}

/// Complete configuration of a forecasting model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub steps: Steps,
    /// Target column name.
    pub depvar: String,
    #[serde(default = "default_time_key")]
    pub time_key: String,
    /// Accepted names for the entity level; exactly one must be present.
    #[serde(default = "default_entity_keys")]
    pub entity_keys: Vec<String>,
    /// Registry key, or `"hurdle"` for the two-stage model.
    pub algorithm: String,
    /// Presence estimator key (hurdle only).
    #[serde(default)]
    pub model_clf: Option<String>,
    /// Magnitude estimator key (hurdle only).
    #[serde(default)]
    pub model_reg: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub clf_parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub reg_parameters: BTreeMap<String, f64>,
    /// Presence threshold for the hurdle model.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub seed: u64,
    /// Feed the target lagged by `h` to the horizon-`h` model as an extra covariate.
    #[serde(default)]
    pub target_as_covariate: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Size of a dedicated worker pool; the global rayon pool when unset.
    #[serde(default)]
    pub max_threads: Option<usize>,
    #[serde(default)]
    pub partitions: PartitionConfig,
}

/// The estimator layout a configuration resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    Point(EstimatorFactory),
    Hurdle {
        presence: EstimatorFactory,
        magnitude: EstimatorFactory,
        threshold: f64,
    },
}

impl ForecastConfig {
    /// Minimal configuration for a single-estimator model.
    pub fn new(steps: Steps, depvar: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            steps,
            depvar: depvar.into(),
            time_key: default_time_key(),
            entity_keys: default_entity_keys(),
            algorithm: algorithm.into(),
            model_clf: None,
            model_reg: None,
            parameters: BTreeMap::new(),
            clf_parameters: BTreeMap::new(),
            reg_parameters: BTreeMap::new(),
            threshold: default_threshold(),
            seed: 0,
            target_as_covariate: false,
            failure_policy: FailurePolicy::default(),
            max_threads: None,
            partitions: PartitionConfig::default(),
        }
    }

    /// Minimal configuration for a hurdle model.
    pub fn hurdle(
        steps: Steps,
        depvar: impl Into<String>,
        model_clf: impl Into<String>,
        model_reg: impl Into<String>,
    ) -> Self {
        Self {
            model_clf: Some(model_clf.into()),
            model_reg: Some(model_reg.into()),
            ..Self::new(steps, depvar, HURDLE_ALGORITHM)
        }
    }

    pub fn with_keys(mut self, time_key: impl Into<String>, entity_keys: &[&str]) -> Self {
        self.time_key = time_key.into();
        self.entity_keys = entity_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn is_hurdle(&self) -> bool {
        self.algorithm == HURDLE_ALGORITHM
    }

    /// Resolve estimator keys and check every hyperparameter.
    pub fn model_spec(&self) -> Result<ModelSpec, ConfigurationError> {
        if self.is_hurdle() {
            if !(self.threshold.is_finite() && self.threshold > 0.0) {
                return Err(ConfigurationError::NonPositiveThreshold(self.threshold));
            }
            let clf = self
                .model_clf
                .as_deref()
                .ok_or(ConfigurationError::MissingHurdleComponent("model_clf"))?;
            let reg = self
                .model_reg
                .as_deref()
                .ok_or(ConfigurationError::MissingHurdleComponent("model_reg"))?;
            Ok(ModelSpec::Hurdle {
                presence: EstimatorFactory::resolve(clf, &self.clf_parameters)?,
                magnitude: EstimatorFactory::resolve(reg, &self.reg_parameters)?,
                threshold: self.threshold,
            })
        } else {
            Ok(ModelSpec::Point(EstimatorFactory::resolve(
                &self.algorithm,
                &self.parameters,
            )?))
        }
    }

    /// Full validation: keys, parameters, identifiers, pool size.
    pub fn validate(&self) -> Result<ModelSpec, ConfigurationError> {
        if self.depvar.is_empty() {
            return Err(ConfigurationError::Invalid("depvar must not be empty".into()));
        }
        if self.time_key.is_empty() || self.entity_keys.is_empty() {
            return Err(ConfigurationError::Invalid(
                "time_key and entity_keys must be set".into(),
            ));
        }
        if self.entity_keys.iter().any(|k| *k == self.time_key || *k == self.depvar) {
            return Err(ConfigurationError::Invalid(
                "entity keys must differ from the time key and the target".into(),
            ));
        }
        if self.max_threads == Some(0) {
            return Err(ConfigurationError::ZeroThreads);
        }
        self.model_spec()
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content)
            .map_err(|e| ConfigurationError::Invalid(format!("parse forecast config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, ConfigurationError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigurationError::Invalid(format!("serialize forecast config: {e}")))
    }

    /// Deterministic identity of this configuration (BLAKE3 over canonical JSON).
    ///
    /// Parameter maps are `BTreeMap`s, so key order is stable.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_must_be_ascending_positive_unique() {
        assert!(Steps::new(vec![1, 2, 3]).is_ok());
        assert_eq!(Steps::new(vec![]).unwrap_err(), ConfigurationError::EmptySteps);
        assert_eq!(
            Steps::new(vec![0, 1]).unwrap_err(),
            ConfigurationError::NonPositiveStep(0)
        );
        assert!(matches!(
            Steps::new(vec![1, 3, 2]).unwrap_err(),
            ConfigurationError::UnorderedSteps(_)
        ));
        assert!(matches!(
            Steps::new(vec![1, 2, 2]).unwrap_err(),
            ConfigurationError::UnorderedSteps(_)
        ));
    }

    #[test]
    fn steps_beyond_u32_are_out_of_range() {
        let too_far = i64::from(u32::MAX) + 1;
        let err = Steps::new(vec![1, too_far]).unwrap_err();
        assert_eq!(err, ConfigurationError::StepOutOfRange(too_far));
        assert!(err.to_string().contains("exceeds"));
        assert!(Steps::new(vec![1, i64::from(u32::MAX)]).is_ok());
    }

    #[test]
    fn steps_range_and_max() {
        let steps = Steps::range(36).unwrap();
        assert_eq!(steps.len(), 36);
        assert_eq!(steps.max(), 36);
    }

    #[test]
    fn toml_roundtrip() {
        let toml_str = r#"
            steps = [1, 2, 3]
            depvar = "ln_ged_sb"
            algorithm = "ridge"

            [parameters]
            alpha = 0.5
        "#;
        let config = ForecastConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.time_key, "month_id");
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.parameters["alpha"], 0.5);

        let back = ForecastConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn invalid_steps_fail_at_parse_time() {
        let toml_str = r#"
            steps = [3, 1]
            depvar = "y"
            algorithm = "mean"
        "#;
        assert!(ForecastConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn unknown_algorithm_is_configuration_error() {
        let config = ForecastConfig::new(Steps::range(3).unwrap(), "y", "xgboost");
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::UnknownEstimator("xgboost".into())
        );
    }

    #[test]
    fn hurdle_requires_components_and_positive_threshold() {
        let mut config = ForecastConfig::new(Steps::range(2).unwrap(), "y", HURDLE_ALGORITHM);
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::MissingHurdleComponent("model_clf")
        );

        config = ForecastConfig::hurdle(Steps::range(2).unwrap(), "y", "linear", "ridge");
        assert!(matches!(config.validate().unwrap(), ModelSpec::Hurdle { .. }));

        config.threshold = 0.0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::NonPositiveThreshold(0.0)
        );
    }

    #[test]
    fn fingerprint_is_deterministic_and_parameter_sensitive() {
        let a = ForecastConfig::new(Steps::range(3).unwrap(), "y", "ridge");
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.parameters.insert("alpha".into(), 2.0);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
