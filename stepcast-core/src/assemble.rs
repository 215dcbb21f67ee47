//! Forecast assembly: raw per-horizon predictions into output tables.
//!
//! Wide tables (evaluation) carry one prediction column per horizon and the
//! observed target. Diagonal tables (forecasting) carry one row per
//! `(entity, horizon)` at `train_end + horizon` and no ground truth.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PanelIntegrityError;
use crate::panel::NormalizedPanel;
use crate::partition::{Partition, RunType};

/// One prediction from the model for `horizon`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub time_id: i64,
    pub entity_id: i64,
    pub horizon: u32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub time_id: i64,
    pub entity_id: i64,
    /// Aligned with [`WideTable::horizons`].
    pub predictions: Vec<f64>,
    pub target: f64,
}

/// Evaluation table sorted by `(time_id, entity_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    pub time_key: String,
    pub entity_key: String,
    pub depvar: String,
    pub run_type: RunType,
    pub horizons: Vec<u32>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn column_name(horizon: u32) -> String {
        format!("step_pred_{horizon}")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Prediction cells plus one target cell per row.
    pub fn value_cells(&self) -> usize {
        self.rows.len() * (self.horizons.len() + 1)
    }

    pub fn get(&self, time_id: i64, entity_id: i64) -> Option<&WideRow> {
        self.rows
            .binary_search_by_key(&(time_id, entity_id), |r| (r.time_id, r.entity_id))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// The column for `horizon`, in row order.
    pub fn predictions_for(&self, horizon: u32) -> Option<Vec<f64>> {
        let j = self.horizons.iter().position(|&h| h == horizon)?;
        Some(self.rows.iter().map(|r| r.predictions[j]).collect())
    }

    /// Columns: time key, entity key, `step_pred_<h>`..., target.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Column::new(
                self.time_key.as_str().into(),
                self.rows.iter().map(|r| r.time_id).collect::<Vec<_>>(),
            ),
            Column::new(
                self.entity_key.as_str().into(),
                self.rows.iter().map(|r| r.entity_id).collect::<Vec<_>>(),
            ),
        ];
        for (j, &h) in self.horizons.iter().enumerate() {
            columns.push(Column::new(
                Self::column_name(h).into(),
                self.rows.iter().map(|r| r.predictions[j]).collect::<Vec<_>>(),
            ));
        }
        columns.push(Column::new(
            self.depvar.as_str().into(),
            self.rows.iter().map(|r| r.target).collect::<Vec<_>>(),
        ));
        DataFrame::new(columns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalRow {
    pub time_id: i64,
    pub entity_id: i64,
    pub horizon: u32,
    pub value: f64,
    /// Always `None`: the landing month has not been observed.
    pub target: Option<f64>,
}

/// Forecast table sorted by `(time_id, entity_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalTable {
    pub time_key: String,
    pub entity_key: String,
    pub depvar: String,
    pub run_type: RunType,
    pub rows: Vec<DiagonalRow>,
}

impl DiagonalTable {
    pub fn prediction_column(&self) -> String {
        format!("pred_{}", self.depvar)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columns: time key, entity key, `step`, `pred_<depvar>`, target (null).
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Column::new(
                self.time_key.as_str().into(),
                self.rows.iter().map(|r| r.time_id).collect::<Vec<_>>(),
            ),
            Column::new(
                self.entity_key.as_str().into(),
                self.rows.iter().map(|r| r.entity_id).collect::<Vec<_>>(),
            ),
            Column::new(
                "step".into(),
                self.rows
                    .iter()
                    .map(|r| i64::from(r.horizon))
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                self.prediction_column().as_str().into(),
                self.rows.iter().map(|r| r.value).collect::<Vec<_>>(),
            ),
            Column::new(
                self.depvar.as_str().into(),
                self.rows.iter().map(|r| r.target).collect::<Vec<Option<f64>>>(),
            ),
        ])
    }
}

pub struct ForecastAssembler;

impl ForecastAssembler {
    /// Merge per-horizon predictions on `(time_id, entity_id)` over the
    /// predict window and join the observed target.
    ///
    /// Predictions outside the window are trimmed. A missing cell inside it
    /// is an integrity error.
    pub fn wide(
        panel: &NormalizedPanel,
        partition: &Partition,
        horizons: &[u32],
        raw: &[PredictionRow],
    ) -> Result<WideTable, PanelIntegrityError> {
        if !(panel.contains_time(partition.predict_start)
            && panel.contains_time(partition.predict_end))
        {
            return Err(PanelIntegrityError::WindowNotCovered {
                run_type: partition.run_type,
                start: partition.predict_start,
                end: partition.predict_end,
                min_time: panel.min_time(),
                last_time: panel.last_time(),
            });
        }

        let entities = panel.entities();
        let n_h = horizons.len();
        let n_cells = partition.predict_len() as usize * entities.len() * n_h;
        let mut cells: Vec<Option<f64>> = vec![None; n_cells];
        for row in raw {
            if row.time_id < partition.predict_start || row.time_id > partition.predict_end {
                continue;
            }
            let (Ok(e), Some(j)) = (
                entities.binary_search(&row.entity_id),
                horizons.iter().position(|&h| h == row.horizon),
            ) else {
                continue;
            };
            let t = (row.time_id - partition.predict_start) as usize;
            cells[(t * entities.len() + e) * n_h + j] = Some(row.value);
        }

        let mut rows = Vec::with_capacity(partition.predict_len() as usize * entities.len());
        for time_id in partition.predict_start..=partition.predict_end {
            let t = (time_id - partition.predict_start) as usize;
            let ti = (time_id - panel.min_time()) as usize;
            for (e, &entity_id) in entities.iter().enumerate() {
                let base = (t * entities.len() + e) * n_h;
                let predictions = horizons
                    .iter()
                    .enumerate()
                    .map(|(j, &horizon)| {
                        cells[base + j].ok_or(PanelIntegrityError::MissingPrediction {
                            horizon,
                            time_id,
                            entity_id,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push(WideRow {
                    time_id,
                    entity_id,
                    predictions,
                    target: panel.target_at(ti, e),
                });
            }
        }

        Ok(WideTable {
            time_key: panel.time_key.clone(),
            entity_key: panel.entity_key.clone(),
            depvar: panel.depvar.clone(),
            run_type: partition.run_type,
            horizons: horizons.to_vec(),
            rows,
        })
    }

    /// One row per `(entity, horizon)` at `train_end + horizon`.
    pub fn diagonal(
        panel: &NormalizedPanel,
        partition: &Partition,
        raw: &[PredictionRow],
    ) -> Result<DiagonalTable, PanelIntegrityError> {
        let mut rows: Vec<DiagonalRow> = raw
            .iter()
            .map(|r| DiagonalRow {
                time_id: partition.train_end + i64::from(r.horizon),
                entity_id: r.entity_id,
                horizon: r.horizon,
                value: r.value,
                target: None,
            })
            .collect();
        rows.sort_by_key(|r| (r.time_id, r.entity_id, r.horizon));

        Ok(DiagonalTable {
            time_key: panel.time_key.clone(),
            entity_key: panel.entity_key.clone(),
            depvar: panel.depvar.clone(),
            run_type: partition.run_type,
            rows,
        })
    }
}
