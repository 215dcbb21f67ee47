//! Step-shifted design matrices.
//!
//! The model for horizon `h` learns `target[t] ~ covariates[t - h]` within the
//! same entity. A row's own target never enters its features; with
//! `target_as_covariate` the target lagged by `h` is appended as the last
//! feature.

use ndarray::{Array1, Array2};

use crate::error::PanelIntegrityError;
use crate::panel::NormalizedPanel;
use crate::partition::Partition;
use crate::stepshift::ModelRole;

/// Features (and, for training, targets) with the `(time_id, entity_id)` each row predicts.
#[derive(Debug, Clone)]
pub struct Design {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub keys: Vec<(i64, i64)>,
}

impl Design {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub fn feature_count(panel: &NormalizedPanel, target_as_covariate: bool) -> usize {
    panel.n_covariates() + usize::from(target_as_covariate)
}

fn fill_features(
    panel: &NormalizedPanel,
    x: &mut Array2<f64>,
    row: usize,
    source_time_idx: usize,
    entity_idx: usize,
    target_as_covariate: bool,
) {
    let covs = panel.covariates_at(source_time_idx, entity_idx);
    let n_cov = covs.len();
    for (j, v) in covs.iter().enumerate() {
        x[[row, j]] = *v;
    }
    if target_as_covariate {
        x[[row, n_cov]] = panel.target_at(source_time_idx, entity_idx);
    }
}

/// Rows `(t, e)` with `t` in the training window and `t - h` inside the panel.
///
/// `entities` restricts training to a subset of entity indices; `transform`
/// maps raw targets (identity, or the presence indicator for hurdle models).
pub fn training_design(
    panel: &NormalizedPanel,
    partition: &Partition,
    horizon: u32,
    role: ModelRole,
    entities: Option<&[usize]>,
    target_as_covariate: bool,
    transform: impl Fn(f64) -> f64,
) -> Result<Design, PanelIntegrityError> {
    if !panel.contains_time(partition.train_end) {
        return Err(PanelIntegrityError::WindowNotCovered {
            run_type: partition.run_type,
            start: partition.train_start,
            end: partition.train_end,
            min_time: panel.min_time(),
            last_time: panel.last_time(),
        });
    }

    let h = i64::from(horizon);
    let first = partition.train_start.max(panel.min_time() + h);
    let all: Vec<usize> = (0..panel.entities().len()).collect();
    let entity_idx = entities.unwrap_or(&all);

    let n_times = (partition.train_end - first + 1).max(0) as usize;
    let n_rows = n_times * entity_idx.len();
    if n_rows == 0 {
        return Err(PanelIntegrityError::EmptyTrainingSet {
            run_type: partition.run_type,
            horizon,
            role,
        });
    }

    let p = feature_count(panel, target_as_covariate);
    let mut x = Array2::<f64>::zeros((n_rows, p));
    let mut y = Array1::<f64>::zeros(n_rows);
    let mut keys = Vec::with_capacity(n_rows);

    let mut row = 0;
    for t in first..=partition.train_end {
        let ti = (t - panel.min_time()) as usize;
        let si = ti - horizon as usize;
        for &e in entity_idx {
            fill_features(panel, &mut x, row, si, e, target_as_covariate);
            y[row] = transform(panel.target_at(ti, e));
            keys.push((t, panel.entities()[e]));
            row += 1;
        }
    }

    Ok(Design { x, y, keys })
}

/// Evaluation features: every `(t, e)` with `t` in `[predict_start, predict_end]`,
/// each from covariates at `t - h`.
pub fn wide_design(
    panel: &NormalizedPanel,
    partition: &Partition,
    horizon: u32,
    target_as_covariate: bool,
) -> Result<Design, PanelIntegrityError> {
    let h = i64::from(horizon);
    let earliest_source = partition.predict_start - h;
    if earliest_source < panel.min_time() {
        return Err(PanelIntegrityError::MissingLaggedCovariates {
            run_type: partition.run_type,
            horizon,
            time_id: earliest_source,
        });
    }
    if partition.predict_end > panel.last_time() {
        return Err(PanelIntegrityError::WindowNotCovered {
            run_type: partition.run_type,
            start: partition.predict_start,
            end: partition.predict_end,
            min_time: panel.min_time(),
            last_time: panel.last_time(),
        });
    }

    let n_entities = panel.entities().len();
    let n_rows = partition.predict_len() as usize * n_entities;
    let p = feature_count(panel, target_as_covariate);
    let mut x = Array2::<f64>::zeros((n_rows, p));
    let mut keys = Vec::with_capacity(n_rows);

    let mut row = 0;
    for t in partition.predict_start..=partition.predict_end {
        let si = (t - h - panel.min_time()) as usize;
        for (e, &entity_id) in panel.entities().iter().enumerate() {
            fill_features(panel, &mut x, row, si, e, target_as_covariate);
            keys.push((t, entity_id));
            row += 1;
        }
    }

    Ok(Design {
        x,
        y: Array1::zeros(0),
        keys,
    })
}

/// Forecast features: covariates at `train_end` for every entity, landing at
/// `train_end + h`.
pub fn diagonal_design(
    panel: &NormalizedPanel,
    partition: &Partition,
    horizon: u32,
    target_as_covariate: bool,
) -> Result<Design, PanelIntegrityError> {
    let origin = panel
        .time_index(partition.train_end)
        .ok_or(PanelIntegrityError::WindowNotCovered {
            run_type: partition.run_type,
            start: partition.train_start,
            end: partition.train_end,
            min_time: panel.min_time(),
            last_time: panel.last_time(),
        })?;

    let landing = partition.train_end + i64::from(horizon);
    let n_entities = panel.entities().len();
    let p = feature_count(panel, target_as_covariate);
    let mut x = Array2::<f64>::zeros((n_entities, p));
    let mut keys = Vec::with_capacity(n_entities);
    for (e, &entity_id) in panel.entities().iter().enumerate() {
        fill_features(panel, &mut x, e, origin, e, target_as_covariate);
        keys.push((landing, entity_id));
    }

    Ok(Design {
        x,
        y: Array1::zeros(0),
        keys,
    })
}
