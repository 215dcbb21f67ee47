//! Raw (possibly ragged) panel: one row per observed `(time_id, entity_id)`.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One observation. `covariates` follow the owning panel's `covariate_names`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub time_id: i64,
    pub entity_id: i64,
    pub target: f64,
    pub covariates: Vec<f64>,
}

impl PanelRow {
    pub fn new(time_id: i64, entity_id: i64, target: f64, covariates: Vec<f64>) -> Self {
        Self {
            time_id,
            entity_id,
            target,
            covariates,
        }
    }
}

/// A panel keyed by `(time_key, entity_key)` with one target and M covariates.
///
/// The engine never mutates a caller's panel; normalization copies into a
/// fresh [`NormalizedPanel`](super::NormalizedPanel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub time_key: String,
    pub entity_key: String,
    pub depvar: String,
    pub covariate_names: Vec<String>,
    pub rows: Vec<PanelRow>,
}

impl Panel {
    pub fn new(
        time_key: impl Into<String>,
        entity_key: impl Into<String>,
        depvar: impl Into<String>,
        covariate_names: Vec<String>,
    ) -> Self {
        Self {
            time_key: time_key.into(),
            entity_key: entity_key.into(),
            depvar: depvar.into(),
            covariate_names,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<PanelRow>) -> Self {
        self.rows = rows;
        self
    }

    pub fn push(&mut self, row: PanelRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(min, max)` time id, `None` for an empty panel.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let min = self.rows.iter().map(|r| r.time_id).min()?;
        let max = self.rows.iter().map(|r| r.time_id).max()?;
        Some((min, max))
    }

    /// Rows with `time_id <= last`.
    pub fn truncated(&self, last: i64) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|r| r.time_id <= last)
                .cloned()
                .collect(),
            ..self.clone_header()
        }
    }

    fn clone_header(&self) -> Self {
        Self::new(
            self.time_key.clone(),
            self.entity_key.clone(),
            self.depvar.clone(),
            self.covariate_names.clone(),
        )
    }

    /// Long-format frame: keys, target, then covariates in order.
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
            Column::new(
                self.depvar.as_str().into(),
                self.rows.iter().map(|r| r.target).collect::<Vec<_>>(),
            ),
        ];
        for (j, name) in self.covariate_names.iter().enumerate() {
            let values: Vec<f64> = self
                .rows
                .iter()
                .map(|r| r.covariates.get(j).copied().unwrap_or(f64::NAN))
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Panel {
        Panel::new("month_id", "country_id", "ged", vec!["pop".into()]).with_rows(vec![
            PanelRow::new(100, 1, 0.0, vec![5.0]),
            PanelRow::new(101, 1, 2.0, vec![6.0]),
            PanelRow::new(103, 2, 1.0, vec![7.0]),
        ])
    }

    #[test]
    fn time_range_spans_rows() {
        assert_eq!(sample().time_range(), Some((100, 103)));
        assert_eq!(
            Panel::new("t", "e", "y", vec![]).time_range(),
            None
        );
    }

    #[test]
    fn truncated_keeps_header_and_earlier_rows() {
        let cut = sample().truncated(101);
        assert_eq!(cut.len(), 2);
        assert_eq!(cut.covariate_names, vec!["pop".to_string()]);
    }

    #[test]
    fn to_dataframe_has_keys_target_and_covariates() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.height(), 3);
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["month_id", "country_id", "ged", "pop"]);
        assert_eq!(df.column("month_id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("pop").unwrap().dtype(), &DataType::Float64);
    }
}
