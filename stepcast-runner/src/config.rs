//! Serializable run specification.
//!
//! A `RunSpec` names everything needed to reproduce a run: the forecast
//! model configuration, which partition to use, where the panel lives and
//! where outputs go. It is read from TOML:
//!
//! ```toml
//! run_type = "forecasting"
//! input = "data/cm_features.parquet"
//! output_dir = "runs"
//! latest_observed = 540
//!
//! [forecast]
//! steps = [1, 2, 3]
//! depvar = "ged_sb"
//! algorithm = "ridge"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stepcast_core::{ConfigurationError, ForecastConfig, Partition, PartitionPlan, RunType};

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Errors from reading or checking a run specification.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read run spec {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse run spec: {0}")]
    Parse(String),
    #[error("serialize run spec: {0}")]
    Serialize(String),
    #[error("as_of and latest_observed are mutually exclusive")]
    ConflictingObservation,
    #[error("as_of/latest_observed only apply to forecasting runs, not {0}")]
    ObservationOutsideForecasting(RunType),
    #[error("forecast config: {0}")]
    Forecast(#[from] ConfigurationError),
}

/// Everything a single fit/predict run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub run_type: RunType,
    /// Panel file, `.csv` or `.parquet`.
    pub input: PathBuf,
    /// Directory under which the run's artifact directory is created.
    pub output_dir: PathBuf,
    /// Forecasting only: anchor the partition on this calendar date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    /// Forecasting only: pin the latest fully observed month id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_observed: Option<i64>,
    pub forecast: ForecastConfig,
}

impl RunSpec {
    pub fn new(
        forecast: ForecastConfig,
        run_type: RunType,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_type,
            input: input.into(),
            output_dir: output_dir.into(),
            as_of: None,
            latest_observed: None,
            forecast,
        }
    }

    pub fn with_latest_observed(mut self, month: i64) -> Self {
        self.latest_observed = Some(month);
        self
    }

    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    /// Load a run spec from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a run spec from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Check the forecast configuration and the observation anchor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.forecast.validate()?;
        let anchored = self.as_of.is_some() || self.latest_observed.is_some();
        if self.as_of.is_some() && self.latest_observed.is_some() {
            return Err(ConfigError::ConflictingObservation);
        }
        if anchored && self.run_type != RunType::Forecasting {
            return Err(ConfigError::ObservationOutsideForecasting(self.run_type));
        }
        Ok(())
    }

    /// Partition plan with the configured observation anchor; today's date
    /// when none is set.
    pub fn plan(&self) -> PartitionPlan {
        let plan = PartitionPlan::new(self.forecast.partitions.clone());
        match (self.latest_observed, self.as_of) {
            (Some(month), _) => plan.with_latest_observed(month),
            (None, Some(date)) => plan.with_as_of(date),
            (None, None) => plan,
        }
    }

    pub fn partition(&self) -> Result<Partition, ConfigError> {
        Ok(self
            .plan()
            .plan(self.run_type, self.forecast.steps.max())?)
    }

    /// Deterministic hash of this spec.
    ///
    /// Two runs with identical specs share a run id and land in the same
    /// artifact directory.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepcast_core::Steps;

    const SPEC: &str = r#"
        run_type = "forecasting"
        input = "data/panel.csv"
        output_dir = "runs"
        latest_observed = 104

        [forecast]
        steps = [1, 2, 3]
        depvar = "ged_sb"
        algorithm = "mean"

        [forecast.partitions]
        forecast_train_start = 100
    "#;

    #[test]
    fn parses_toml_with_nested_forecast_config() {
        let spec = RunSpec::from_toml(SPEC).unwrap();
        assert_eq!(spec.run_type, RunType::Forecasting);
        assert_eq!(spec.input, PathBuf::from("data/panel.csv"));
        assert_eq!(spec.latest_observed, Some(104));
        assert_eq!(spec.forecast.steps.as_slice(), &[1, 2, 3]);
        spec.validate().unwrap();

        let p = spec.partition().unwrap();
        assert_eq!((p.train_start, p.train_end), (100, 103));
        assert_eq!((p.predict_start, p.predict_end), (104, 106));
    }

    #[test]
    fn toml_round_trip() {
        let spec = RunSpec::from_toml(SPEC).unwrap();
        let again = RunSpec::from_toml(&spec.to_toml().unwrap()).unwrap();
        assert_eq!(spec, again);
        assert_eq!(spec.run_id(), again.run_id());
    }

    #[test]
    fn run_id_changes_with_the_spec() {
        let spec = RunSpec::from_toml(SPEC).unwrap();
        let other = spec.clone().with_latest_observed(105);
        assert_eq!(spec.run_id().len(), 64);
        assert_ne!(spec.run_id(), other.run_id());
    }

    #[test]
    fn observation_anchor_is_forecasting_only() {
        let forecast = ForecastConfig::new(Steps::range(3).unwrap(), "ged_sb", "mean");
        let spec = RunSpec::new(forecast, RunType::Calibration, "in.csv", "out")
            .with_latest_observed(200);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::ObservationOutsideForecasting(RunType::Calibration))
        ));
    }

    #[test]
    fn conflicting_anchors_are_rejected() {
        let spec = RunSpec::from_toml(SPEC)
            .unwrap()
            .with_as_of(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::ConflictingObservation)
        ));
    }

    #[test]
    fn invalid_forecast_config_surfaces() {
        let bad = SPEC.replace("\"mean\"", "\"gradient_boosting\"");
        let spec = RunSpec::from_toml(&bad).unwrap();
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::Forecast(ConfigurationError::UnknownEstimator(_)))
        ));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = RunSpec::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/run.toml"));
    }
}
