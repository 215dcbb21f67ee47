//! Stepcast Core — multi-horizon "step-shift" forecasting over panel data.
//!
//! One independent model per forecast horizon, each trained on covariates
//! shifted back by that horizon:
//! - Validation gate and normalizer for `(time, entity)` panels
//! - Partition plans for calibration, testing and forecasting windows
//! - Closed estimator registry (mean, OLS, ridge, random forest)
//! - Plain and hurdle step model sets, fitted in parallel per horizon
//! - Wide (evaluation) and diagonal (forecast) output tables
//! - Versioned persistence of fitted sets

pub mod assemble;
pub mod config;
pub mod error;
pub mod estimator;
pub mod panel;
pub mod partition;
pub mod persist;
pub mod rng;
pub mod sink;
pub mod stepshift;

pub use assemble::{DiagonalRow, DiagonalTable, ForecastAssembler, PredictionRow, WideRow, WideTable};
pub use config::{FailurePolicy, ForecastConfig, ModelSpec, Steps};
pub use error::{
    ConfigurationError, EstimatorError, ForecastError, FormatError, FormatIssue,
    NotFittedError, PanelIntegrityError, PersistError,
};
pub use panel::{NormalizedPanel, Panel, PanelNormalizer, PanelRow, ValidationGate};
pub use partition::{Partition, PartitionConfig, PartitionPlan, RunType};
pub use sink::{ForecastSink, NullSink, TracingSink};
pub use stepshift::{
    ForecastModel, HurdleStepModelSet, ModelRole, StepForecaster, StepModel, StepModelSet,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: model sets and tables can cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Panel>();
        require_sync::<Panel>();
        require_send::<NormalizedPanel>();
        require_sync::<NormalizedPanel>();
        require_send::<ForecastConfig>();
        require_sync::<ForecastConfig>();
        require_send::<Partition>();
        require_sync::<Partition>();

        require_send::<estimator::Estimator>();
        require_sync::<estimator::Estimator>();
        require_send::<estimator::EstimatorFactory>();
        require_sync::<estimator::EstimatorFactory>();

        require_send::<StepModelSet>();
        require_sync::<StepModelSet>();
        require_send::<HurdleStepModelSet>();
        require_sync::<HurdleStepModelSet>();
        require_send::<ForecastModel>();
        require_sync::<ForecastModel>();

        require_send::<WideTable>();
        require_sync::<WideTable>();
        require_send::<DiagonalTable>();
        require_sync::<DiagonalTable>();

        require_send::<ForecastError>();
        require_sync::<ForecastError>();
    }

    /// The sink is injected as a trait object and shared across workers.
    #[test]
    fn sink_is_object_safe_and_shareable() {
        fn _takes(sink: std::sync::Arc<dyn ForecastSink>) -> std::sync::Arc<dyn ForecastSink> {
            sink
        }
        let _ = _takes(std::sync::Arc::new(NullSink));
    }
}
