//! Horizon fan-out on rayon.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::error::{ConfigurationError, ForecastError};

/// Runs one job per horizon, on the global pool or a dedicated one.
///
/// Output order follows the input horizons, never completion order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HorizonPool {
    max_threads: Option<usize>,
}

impl HorizonPool {
    pub fn new(max_threads: Option<usize>) -> Self {
        Self { max_threads }
    }

    fn install<R, OP>(&self, op: OP) -> Result<R, ConfigurationError>
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match self.max_threads {
            None => Ok(op()),
            Some(0) => Err(ConfigurationError::ZeroThreads),
            Some(n) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("stepcast-horizon-{i}"))
                    .build()
                    .map_err(|e| ConfigurationError::Invalid(format!("worker pool: {e}")))?;
                Ok(pool.install(op))
            }
        }
    }

    /// Stops scheduling new horizons after the first error and returns it.
    pub fn try_map<T, F>(&self, horizons: &[u32], job: F) -> Result<Vec<(u32, T)>, ForecastError>
    where
        T: Send,
        F: Fn(u32) -> Result<T, ForecastError> + Sync + Send,
    {
        self.install(|| {
            horizons
                .par_iter()
                .map(|&h| job(h).map(|out| (h, out)))
                .collect::<Result<Vec<_>, _>>()
        })?
    }

    /// Runs every horizon and keeps each outcome.
    pub fn map_all<T, F>(
        &self,
        horizons: &[u32],
        job: F,
    ) -> Result<Vec<(u32, Result<T, ForecastError>)>, ForecastError>
    where
        T: Send,
        F: Fn(u32) -> Result<T, ForecastError> + Sync + Send,
    {
        Ok(self.install(|| horizons.par_iter().map(|&h| (h, job(h))).collect())?)
    }
}
