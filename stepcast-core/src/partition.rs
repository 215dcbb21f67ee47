//! Partition plan — train/predict windows per run type.
//!
//! Calibration and testing use fixed historical windows. Forecasting anchors
//! the training window on the latest fully observed month, minus a
//! data-availability lag, and predicts `step_count` months past it.
//!
//! Time ids are month ids: 1 = January 1980.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Which kind of run a partition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Calibration,
    Testing,
    Forecasting,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Calibration => "calibration",
            RunType::Testing => "testing",
            RunType::Forecasting => "forecasting",
        }
    }

    /// Whether this run has ground truth for its predict window.
    pub fn is_evaluation(&self) -> bool {
        !matches!(self, RunType::Forecasting)
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calibration" => Ok(RunType::Calibration),
            "testing" => Ok(RunType::Testing),
            "forecasting" => Ok(RunType::Forecasting),
            other => Err(ConfigurationError::Invalid(format!(
                "unknown run type '{other}'"
            ))),
        }
    }
}

/// Train and predict windows, both inclusive.
///
/// Invariant: `train_start <= train_end < predict_start <= predict_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub run_type: RunType,
    pub train_start: i64,
    pub train_end: i64,
    pub predict_start: i64,
    pub predict_end: i64,
}

impl Partition {
    pub fn new(
        run_type: RunType,
        train: (i64, i64),
        predict: (i64, i64),
    ) -> Result<Self, ConfigurationError> {
        let partition = Self {
            run_type,
            train_start: train.0,
            train_end: train.1,
            predict_start: predict.0,
            predict_end: predict.1,
        };
        partition.validate()?;
        Ok(partition)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let ordered = self.train_start <= self.train_end
            && self.train_end < self.predict_start
            && self.predict_start <= self.predict_end;
        if ordered {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidPartition {
                run_type: self.run_type,
                train_start: self.train_start,
                train_end: self.train_end,
                predict_start: self.predict_start,
                predict_end: self.predict_end,
            })
        }
    }

    pub fn predict_len(&self) -> i64 {
        self.predict_end - self.predict_start + 1
    }
}

/// A fixed `(train, predict)` window pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub train: (i64, i64),
    pub predict: (i64, i64),
}

/// Configured windows for every run type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub calibration: WindowSpec,
    pub testing: WindowSpec,
    /// First month of the forecasting training window.
    pub forecast_train_start: i64,
    /// Months between the latest fully observed month and the end of training.
    pub lag: i64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            calibration: WindowSpec {
                train: (121, 396),
                predict: (397, 444),
            },
            testing: WindowSpec {
                train: (121, 444),
                predict: (445, 492),
            },
            forecast_train_start: 121,
            lag: 1,
        }
    }
}

/// Month id for a calendar date (January 1980 = 1).
pub fn month_id(date: NaiveDate) -> i64 {
    (i64::from(date.year()) - 1980) * 12 + i64::from(date.month())
}

/// Where the latest fully observed month comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The month before the one containing this date.
    AsOf(NaiveDate),
    /// A pinned month id.
    Latest(i64),
}

/// Computes partitions from configuration.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    config: PartitionConfig,
    observation: Observation,
}

impl PartitionPlan {
    /// Plan anchored on today's date.
    pub fn new(config: PartitionConfig) -> Self {
        Self {
            config,
            observation: Observation::AsOf(chrono::Local::now().date_naive()),
        }
    }

    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.observation = Observation::AsOf(date);
        self
    }

    pub fn with_latest_observed(mut self, month: i64) -> Self {
        self.observation = Observation::Latest(month);
        self
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Latest month with complete data.
    pub fn latest_fully_observed(&self) -> i64 {
        match self.observation {
            Observation::AsOf(date) => month_id(date) - 1,
            Observation::Latest(month) => month,
        }
    }

    pub fn plan(&self, run_type: RunType, step_count: u32) -> Result<Partition, ConfigurationError> {
        if step_count == 0 {
            return Err(ConfigurationError::ZeroStepCount(run_type));
        }
        match run_type {
            RunType::Calibration => {
                let w = self.config.calibration;
                Partition::new(run_type, w.train, w.predict)
            }
            RunType::Testing => {
                let w = self.config.testing;
                Partition::new(run_type, w.train, w.predict)
            }
            RunType::Forecasting => {
                let train_end = self.latest_fully_observed() - self.config.lag;
                Partition::new(
                    run_type,
                    (self.config.forecast_train_start, train_end),
                    (train_end + 1, train_end + i64::from(step_count)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_id_epoch() {
        let jan_1980 = NaiveDate::from_ymd_opt(1980, 1, 15).unwrap();
        assert_eq!(month_id(jan_1980), 1);
        let dec_2020 = NaiveDate::from_ymd_opt(2020, 12, 1).unwrap();
        assert_eq!(month_id(dec_2020), 492);
    }

    #[test]
    fn fixed_windows_come_from_config() {
        let plan = PartitionPlan::new(PartitionConfig::default());
        let cal = plan.plan(RunType::Calibration, 36).unwrap();
        assert_eq!((cal.train_start, cal.train_end), (121, 396));
        assert_eq!((cal.predict_start, cal.predict_end), (397, 444));

        let test = plan.plan(RunType::Testing, 36).unwrap();
        assert_eq!((test.train_end, test.predict_end), (444, 492));
    }

    #[test]
    fn forecasting_anchors_on_latest_observed_minus_lag() {
        let plan = PartitionPlan::new(PartitionConfig::default()).with_latest_observed(560);
        let p = plan.plan(RunType::Forecasting, 36).unwrap();
        assert_eq!(p.train_end, 559);
        assert_eq!(p.predict_start, 560);
        assert_eq!(p.predict_end, 595);
    }

    #[test]
    fn forecasting_from_as_of_date() {
        // March 2024 → latest fully observed = February 2024 = 530
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let config = PartitionConfig {
            lag: 0,
            ..PartitionConfig::default()
        };
        let p = PartitionPlan::new(config)
            .with_as_of(date)
            .plan(RunType::Forecasting, 3)
            .unwrap();
        assert_eq!(p.train_end, 530);
        assert_eq!(p.predict_end, 533);
    }

    #[test]
    fn invalid_ordering_is_rejected() {
        let err = Partition::new(RunType::Calibration, (100, 110), (110, 120)).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPartition { .. }));

        let config = PartitionConfig {
            testing: WindowSpec {
                train: (200, 100),
                predict: (201, 210),
            },
            ..PartitionConfig::default()
        };
        let err = PartitionPlan::new(config)
            .plan(RunType::Testing, 3)
            .unwrap_err();
        assert!(err.to_string().contains("testing"));
    }

    #[test]
    fn forecasting_before_train_start_is_rejected() {
        let plan = PartitionPlan::new(PartitionConfig::default()).with_latest_observed(50);
        assert!(plan.plan(RunType::Forecasting, 3).is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let plan = PartitionPlan::new(PartitionConfig::default());
        assert_eq!(
            plan.plan(RunType::Calibration, 0).unwrap_err(),
            ConfigurationError::ZeroStepCount(RunType::Calibration)
        );
    }

    #[test]
    fn run_type_parses() {
        assert_eq!("testing".parse::<RunType>().unwrap(), RunType::Testing);
        assert!("backtest".parse::<RunType>().is_err());
    }
}
