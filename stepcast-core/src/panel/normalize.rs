//! Panel normalizer — rectangular panel over the active entity set.
//!
//! The active entity set is the set of entities observed at the last time
//! unit. Everything else is dropped; absent `(time, entity)` cells of active
//! entities are zero-filled (target and every covariate), never left empty.

use std::collections::BTreeSet;

use ndarray::{Array2, Array3, ArrayView1};

use super::frame::{Panel, PanelRow};
use crate::error::PanelIntegrityError;

/// Dense `time × entity` storage built fresh for each fit/predict call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPanel {
    pub time_key: String,
    pub entity_key: String,
    pub depvar: String,
    pub covariate_names: Vec<String>,
    min_time: i64,
    last_time: i64,
    entities: Vec<i64>,
    /// `[time_idx, entity_idx]`
    target: Array2<f64>,
    /// `[time_idx, entity_idx, covariate]`
    covariates: Array3<f64>,
    filled: usize,
}

impl NormalizedPanel {
    pub fn min_time(&self) -> i64 {
        self.min_time
    }

    pub fn last_time(&self) -> i64 {
        self.last_time
    }

    /// Active entities, ascending.
    pub fn entities(&self) -> &[i64] {
        &self.entities
    }

    pub fn n_times(&self) -> usize {
        self.target.nrows()
    }

    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }

    /// Number of zero rows inserted during normalization.
    pub fn filled_rows(&self) -> usize {
        self.filled
    }

    pub fn contains_time(&self, time_id: i64) -> bool {
        (self.min_time..=self.last_time).contains(&time_id)
    }

    pub fn time_index(&self, time_id: i64) -> Option<usize> {
        self.contains_time(time_id)
            .then(|| (time_id - self.min_time) as usize)
    }

    pub fn target_at(&self, time_idx: usize, entity_idx: usize) -> f64 {
        self.target[[time_idx, entity_idx]]
    }

    pub fn covariates_at(&self, time_idx: usize, entity_idx: usize) -> ArrayView1<'_, f64> {
        self.covariates.slice(ndarray::s![time_idx, entity_idx, ..])
    }

    /// Indices of entities whose target exceeds `threshold` somewhere in `[start, end]`.
    pub fn entities_exceeding(&self, threshold: f64, start: i64, end: i64) -> Vec<usize> {
        let lo = start.max(self.min_time);
        let hi = end.min(self.last_time);
        (0..self.entities.len())
            .filter(|&e| {
                (lo..=hi).any(|t| self.target[[(t - self.min_time) as usize, e]] > threshold)
            })
            .collect()
    }

    /// Back to long format, sorted by `(time_id, entity_id)`.
    pub fn to_panel(&self) -> Panel {
        let mut rows = Vec::with_capacity(self.n_times() * self.entities.len());
        for t in 0..self.n_times() {
            for (e, &entity_id) in self.entities.iter().enumerate() {
                rows.push(PanelRow::new(
                    self.min_time + t as i64,
                    entity_id,
                    self.target[[t, e]],
                    self.covariates_at(t, e).to_vec(),
                ));
            }
        }
        Panel::new(
            self.time_key.clone(),
            self.entity_key.clone(),
            self.depvar.clone(),
            self.covariate_names.clone(),
        )
        .with_rows(rows)
    }
}

/// Upper bound on dense cells (target plus covariates) for one normalized panel.
pub const MAX_PANEL_CELLS: usize = 1 << 30;

/// Produces rectangular panels over the active entity set.
pub struct PanelNormalizer;

impl PanelNormalizer {
    pub fn normalize(panel: &Panel) -> Result<NormalizedPanel, PanelIntegrityError> {
        let (min_time, last_time) = panel.time_range().ok_or(PanelIntegrityError::EmptyPanel)?;

        let active: BTreeSet<i64> = panel
            .rows
            .iter()
            .filter(|r| r.time_id == last_time)
            .map(|r| r.entity_id)
            .collect();
        if active.is_empty() {
            return Err(PanelIntegrityError::NoActiveEntities(last_time));
        }
        let entities: Vec<i64> = active.into_iter().collect();

        let n_entities = entities.len();
        let n_cov = panel.covariate_names.len();
        let too_large = PanelIntegrityError::TooLarge {
            min_time,
            last_time,
            entities: n_entities,
            columns: n_cov + 1,
            max_cells: MAX_PANEL_CELLS,
        };
        let n_times = last_time
            .checked_sub(min_time)
            .and_then(|span| span.checked_add(1))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| too_large.clone())?;
        n_times
            .checked_mul(n_entities)
            .and_then(|n| n.checked_mul(n_cov + 1))
            .filter(|&n| n <= MAX_PANEL_CELLS)
            .ok_or(too_large)?;
        let mut target = Array2::<f64>::zeros((n_times, n_entities));
        let mut covariates = Array3::<f64>::zeros((n_times, n_entities, n_cov));

        let mut observed = 0;
        for row in &panel.rows {
            // Entities are sorted; a miss means the entity is inactive.
            let Ok(e) = entities.binary_search(&row.entity_id) else {
                continue;
            };
            let t = (row.time_id - min_time) as usize;
            target[[t, e]] = row.target;
            for (j, v) in row.covariates.iter().take(n_cov).enumerate() {
                covariates[[t, e, j]] = *v;
            }
            observed += 1;
        }

        Ok(NormalizedPanel {
            time_key: panel.time_key.clone(),
            entity_key: panel.entity_key.clone(),
            depvar: panel.depvar.clone(),
            covariate_names: panel.covariate_names.clone(),
            min_time,
            last_time,
            entities,
            target,
            covariates,
            filled: n_times * n_entities - observed,
        })
    }
}
