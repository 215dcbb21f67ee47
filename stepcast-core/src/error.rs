//! Error taxonomy for the forecasting engine.
//!
//! One `thiserror` enum per concern, gathered under [`ForecastError`] so
//! callers can match on the category without caring which component raised it.

use std::fmt;

use thiserror::Error;

use crate::partition::RunType;
use crate::stepshift::ModelRole;

/// Top-level error returned by every fallible engine operation.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    PanelIntegrity(#[from] PanelIntegrityError),
    #[error(transparent)]
    NotFitted(#[from] NotFittedError),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Persistence(#[from] PersistError),
}

/// Caller or configuration mistakes. Raised before any fitting starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("unknown estimator key '{0}' (known: mean, linear, ridge, random_forest)")]
    UnknownEstimator(String),
    #[error("estimator '{estimator}' does not accept parameter '{name}'")]
    UnknownParameter { estimator: String, name: String },
    #[error("estimator '{estimator}': invalid value {value} for parameter '{name}' ({reason})")]
    InvalidParameter {
        estimator: String,
        name: String,
        value: f64,
        reason: &'static str,
    },
    #[error("steps must not be empty")]
    EmptySteps,
    #[error("steps must be positive, got {0}")]
    NonPositiveStep(i64),
    #[error("step {0} exceeds the largest supported horizon")]
    StepOutOfRange(i64),
    #[error("steps must be strictly ascending without duplicates: {0:?}")]
    UnorderedSteps(Vec<i64>),
    #[error("threshold must be a finite value > 0, got {0}")]
    NonPositiveThreshold(f64),
    #[error("hurdle model requires '{0}' to name an estimator")]
    MissingHurdleComponent(&'static str),
    #[error(
        "invalid {run_type} partition: train {train_start}..={train_end}, \
         predict {predict_start}..={predict_end} \
         (need train_start <= train_end < predict_start <= predict_end)"
    )]
    InvalidPartition {
        run_type: RunType,
        train_start: i64,
        train_end: i64,
        predict_start: i64,
        predict_end: i64,
    },
    #[error("step count must be positive for the {0} partition")]
    ZeroStepCount(RunType),
    #[error(
        "diagonal prediction on the {run_type} partition needs predict_start == train_end + 1 \
         (train_end {train_end}, predict_start {predict_start})"
    )]
    GappedDiagonal {
        run_type: RunType,
        train_end: i64,
        predict_start: i64,
    },
    #[error(
        "horizon {horizon} lands at {landing} past predict_end {predict_end} \
         of the {run_type} partition"
    )]
    HorizonBeyondWindow {
        run_type: RunType,
        horizon: u32,
        landing: i64,
        predict_end: i64,
    },
    #[error("max_threads must be at least 1")]
    ZeroThreads,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A single violation found by the validation gate.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatIssue {
    MissingTimeKey(String),
    NonIntegerKey { column: String, dtype: String },
    NoEntityKey(Vec<String>),
    MultipleEntityKeys(Vec<String>),
    UnknownEntityKey(String),
    MissingDepvar(String),
    NonFloatColumn { column: String, dtype: String },
    MixedFloatKinds(Vec<String>),
    NullValues(String),
    NonFiniteValues(String),
    DuplicateKeys { count: usize },
    CovariateArity { expected: usize, found: usize, count: usize },
    MissingCovariate(String),
    UnexpectedCovariate(String),
    Unreadable { column: String, reason: String },
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTimeKey(k) => write!(f, "missing time level '{k}'"),
            Self::NonIntegerKey { column, dtype } => {
                write!(f, "level '{column}' must be integer, got {dtype}")
            }
            Self::NoEntityKey(keys) => write!(f, "no entity level among {keys:?}"),
            Self::MultipleEntityKeys(keys) => {
                write!(f, "more than one entity level present: {keys:?}")
            }
            Self::UnknownEntityKey(k) => write!(f, "entity level '{k}' is not a configured key"),
            Self::MissingDepvar(d) => write!(f, "missing target column '{d}'"),
            Self::NonFloatColumn { column, dtype } => {
                write!(f, "column '{column}' must be floating point, got {dtype}")
            }
            Self::MixedFloatKinds(cols) => {
                write!(f, "columns use a different float kind than the rest: {cols:?}")
            }
            Self::NullValues(c) => write!(f, "column '{c}' contains nulls"),
            Self::NonFiniteValues(c) => write!(f, "column '{c}' contains non-finite values"),
            Self::DuplicateKeys { count } => {
                write!(f, "{count} duplicated (time, entity) keys")
            }
            Self::CovariateArity {
                expected,
                found,
                count,
            } => write!(
                f,
                "{count} rows carry {found} covariates, expected {expected}"
            ),
            Self::MissingCovariate(c) => write!(f, "covariate '{c}' seen at fit time is missing"),
            Self::UnexpectedCovariate(c) => write!(f, "covariate '{c}' was not seen at fit time"),
            Self::Unreadable { column, reason } => {
                write!(f, "column '{column}' could not be read: {reason}")
            }
        }
    }
}

/// Panel shape/dtype contract violation. Lists every offending column/level.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("panel format violation: {}", join_issues(.issues))]
pub struct FormatError {
    pub issues: Vec<FormatIssue>,
}

fn join_issues(issues: &[FormatIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The panel cannot support the requested operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelIntegrityError {
    #[error("panel is empty")]
    EmptyPanel,
    #[error("no rows at last time unit {0}; cannot determine active entities")]
    NoActiveEntities(i64),
    #[error(
        "dense panel over {min_time}..={last_time} x {entities} entities x {columns} columns exceeds {max_cells} cells"
    )]
    TooLarge {
        min_time: i64,
        last_time: i64,
        entities: usize,
        columns: usize,
        max_cells: usize,
    },
    #[error(
        "{run_type} window {start}..={end} is not covered by the panel ({min_time}..={last_time})"
    )]
    WindowNotCovered {
        run_type: RunType,
        start: i64,
        end: i64,
        min_time: i64,
        last_time: i64,
    },
    #[error("horizon {horizon} on the {run_type} partition needs covariates at {time_id}, before the panel starts")]
    MissingLaggedCovariates {
        run_type: RunType,
        horizon: u32,
        time_id: i64,
    },
    #[error("horizon {horizon} ({role}) on the {run_type} partition has no training rows")]
    EmptyTrainingSet {
        run_type: RunType,
        horizon: u32,
        role: ModelRole,
    },
    #[error("missing horizon {horizon} prediction for ({time_id}, {entity_id})")]
    MissingPrediction {
        horizon: u32,
        time_id: i64,
        entity_id: i64,
    },
}

/// Prediction was requested from a set that has never been fitted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{model} for the {run_type} partition has not been fitted")]
pub struct NotFittedError {
    pub model: &'static str,
    pub run_type: RunType,
}

/// Regression backend failure, tagged with the originating horizon.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("estimator failed on horizon {horizon} ({role}) of the {run_type} partition: {message}")]
pub struct EstimatorError {
    pub horizon: u32,
    pub run_type: RunType,
    pub role: ModelRole,
    pub message: String,
}

/// Model set (de)serialization failure.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("deserialization failed: {0}")]
    Deserialize(String),
    #[error("unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
    #[error("artifact holds a {found} model set, expected {expected}")]
    KindMismatch { found: String, expected: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_every_issue() {
        let err = FormatError {
            issues: vec![
                FormatIssue::NonFloatColumn {
                    column: "pop".into(),
                    dtype: "i64".into(),
                },
                FormatIssue::NullValues("gdp".into()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("pop"));
        assert!(msg.contains("gdp"));
    }

    #[test]
    fn estimator_error_carries_horizon_and_partition() {
        let err = ForecastError::from(EstimatorError {
            horizon: 7,
            run_type: RunType::Testing,
            role: ModelRole::Point,
            message: "singular".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("horizon 7"));
        assert!(msg.contains("testing"));
    }
}
