//! Validation gate — the panel shape/dtype contract.
//!
//! A panel must be keyed by exactly two integer levels (the time key, outer,
//! and one configured entity key, inner) and every other column must share a
//! single floating-point kind. Violations are collected, not short-circuited,
//! so one `FormatError` names every offending column or level.

use std::collections::HashSet;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::frame::{Panel, PanelRow};
use crate::config::ForecastConfig;
use crate::error::{ForecastError, FormatError, FormatIssue};

/// Checks raw panels before every fit and predict call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationGate {
    time_key: String,
    entity_keys: Vec<String>,
    depvar: String,
}

impl ValidationGate {
    pub fn new(
        time_key: impl Into<String>,
        entity_keys: Vec<String>,
        depvar: impl Into<String>,
    ) -> Self {
        Self {
            time_key: time_key.into(),
            entity_keys,
            depvar: depvar.into(),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(
            config.time_key.clone(),
            config.entity_keys.clone(),
            config.depvar.clone(),
        )
    }

    pub fn time_key(&self) -> &str {
        &self.time_key
    }

    pub fn depvar(&self) -> &str {
        &self.depvar
    }

    /// Validate a polars frame and convert it into a typed [`Panel`].
    pub fn validate_frame(&self, df: &DataFrame) -> Result<Panel, ForecastError> {
        let mut issues = Vec::new();

        match df.column(&self.time_key) {
            Ok(col) if !col.dtype().is_integer() => issues.push(FormatIssue::NonIntegerKey {
                column: self.time_key.clone(),
                dtype: col.dtype().to_string(),
            }),
            Ok(_) => {}
            Err(_) => issues.push(FormatIssue::MissingTimeKey(self.time_key.clone())),
        }

        let present: Vec<&String> = self
            .entity_keys
            .iter()
            .filter(|k| df.column(k.as_str()).is_ok())
            .collect();
        match present.as_slice() {
            [] => issues.push(FormatIssue::NoEntityKey(self.entity_keys.clone())),
            [key] => {
                if let Ok(col) = df.column(key.as_str()) {
                    if !col.dtype().is_integer() {
                        issues.push(FormatIssue::NonIntegerKey {
                            column: (*key).clone(),
                            dtype: col.dtype().to_string(),
                        });
                    }
                }
            }
            many => issues.push(FormatIssue::MultipleEntityKeys(
                many.iter().map(|k| (*k).clone()).collect(),
            )),
        }

        let value_columns: Vec<&Column> = df
            .get_columns()
            .iter()
            .filter(|c| {
                let name = c.name().as_str();
                name != self.time_key && !present.iter().any(|k| k.as_str() == name)
            })
            .collect();

        let depvar_dtype = value_columns
            .iter()
            .find(|c| c.name().as_str() == self.depvar)
            .map(|c| c.dtype().clone());
        if depvar_dtype.is_none() {
            issues.push(FormatIssue::MissingDepvar(self.depvar.clone()));
        }

        // The reference float kind is the target's, falling back to Float64.
        let reference = depvar_dtype
            .filter(|d| d.is_float())
            .unwrap_or(DataType::Float64);
        let mut mixed = Vec::new();
        for col in &value_columns {
            let dtype = col.dtype();
            if !dtype.is_float() {
                issues.push(FormatIssue::NonFloatColumn {
                    column: col.name().to_string(),
                    dtype: dtype.to_string(),
                });
            } else if *dtype != reference {
                mixed.push(col.name().to_string());
            }
        }
        if !mixed.is_empty() {
            issues.push(FormatIssue::MixedFloatKinds(mixed));
        }

        for col in df.get_columns() {
            if col.null_count() > 0 {
                issues.push(FormatIssue::NullValues(col.name().to_string()));
            }
        }

        if !issues.is_empty() {
            return Err(FormatError { issues }.into());
        }

        // Only one entity key survives the checks above.
        let entity_key = present[0].clone();
        let times = read_i64(df, &self.time_key)?;
        let entities = read_i64(df, &entity_key)?;
        let target = read_f64(df, &self.depvar)?;
        let covariate_names: Vec<String> = value_columns
            .iter()
            .map(|c| c.name().to_string())
            .filter(|n| *n != self.depvar)
            .collect();
        let covariates = covariate_names
            .iter()
            .map(|name| read_f64(df, name))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = (0..df.height())
            .map(|i| PanelRow {
                time_id: times[i],
                entity_id: entities[i],
                target: target[i],
                covariates: covariates.iter().map(|c| c[i]).collect(),
            })
            .collect();

        let panel = Panel::new(
            self.time_key.clone(),
            entity_key,
            self.depvar.clone(),
            covariate_names,
        )
        .with_rows(rows);
        self.validate_panel(&panel)?;
        Ok(panel)
    }

    /// Validate a typed panel: key names, covariate arity, finiteness, unique keys.
    pub fn validate_panel(&self, panel: &Panel) -> Result<(), FormatError> {
        let mut issues = Vec::new();

        if panel.time_key != self.time_key {
            issues.push(FormatIssue::MissingTimeKey(self.time_key.clone()));
        }
        if !self.entity_keys.contains(&panel.entity_key) {
            issues.push(FormatIssue::UnknownEntityKey(panel.entity_key.clone()));
        }
        if panel.depvar != self.depvar {
            issues.push(FormatIssue::MissingDepvar(self.depvar.clone()));
        }

        let expected = panel.covariate_names.len();
        let ragged: Vec<usize> = panel
            .rows
            .iter()
            .map(|r| r.covariates.len())
            .filter(|&n| n != expected)
            .collect();
        if let Some(&found) = ragged.first() {
            issues.push(FormatIssue::CovariateArity {
                expected,
                found,
                count: ragged.len(),
            });
        }

        if panel.rows.iter().any(|r| !r.target.is_finite()) {
            issues.push(FormatIssue::NonFiniteValues(panel.depvar.clone()));
        }
        for (j, name) in panel.covariate_names.iter().enumerate() {
            let bad = panel
                .rows
                .iter()
                .any(|r| r.covariates.get(j).is_some_and(|v| !v.is_finite()));
            if bad {
                issues.push(FormatIssue::NonFiniteValues(name.clone()));
            }
        }

        let mut seen = HashSet::with_capacity(panel.rows.len());
        let duplicates = panel
            .rows
            .iter()
            .filter(|r| !seen.insert((r.time_id, r.entity_id)))
            .count();
        if duplicates > 0 {
            issues.push(FormatIssue::DuplicateKeys { count: duplicates });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(FormatError { issues })
        }
    }

    /// A fitted model only accepts the covariates it was fitted on, in order.
    pub fn check_feature_contract(expected: &[String], actual: &[String]) -> Result<(), FormatError> {
        if expected == actual {
            return Ok(());
        }
        let mut issues: Vec<FormatIssue> = expected
            .iter()
            .filter(|n| !actual.contains(n))
            .map(|n| FormatIssue::MissingCovariate(n.clone()))
            .collect();
        issues.extend(
            actual
                .iter()
                .filter(|n| !expected.contains(n))
                .map(|n| FormatIssue::UnexpectedCovariate(n.clone())),
        );
        if issues.is_empty() {
            // Same names, different order.
            issues.push(FormatIssue::CovariateArity {
                expected: expected.len(),
                found: actual.len(),
                count: 0,
            });
        }
        Err(FormatError { issues })
    }
}

fn unreadable(column: &str, e: PolarsError) -> FormatError {
    FormatError {
        issues: vec![FormatIssue::Unreadable {
            column: column.to_string(),
            reason: e.to_string(),
        }],
    }
}

fn read_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>, FormatError> {
    let col = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(|e| unreadable(name, e))?;
    let ca = col.i64().map_err(|e| unreadable(name, e))?;
    Ok(ca.into_no_null_iter().collect())
}

fn read_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, FormatError> {
    let col = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(|e| unreadable(name, e))?;
    let ca = col.f64().map_err(|e| unreadable(name, e))?;
    Ok(ca.into_no_null_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ValidationGate {
        ValidationGate::new(
            "month_id",
            vec!["country_id".into(), "priogrid_gid".into()],
            "ged",
        )
    }

    fn valid_frame() -> DataFrame {
        df!(
            "month_id" => &[100i64, 100, 101, 101],
            "country_id" => &[1i64, 2, 1, 2],
            "ged" => &[0.0, 1.0, 2.0, 3.0],
            "pop" => &[10.0, 20.0, 11.0, 21.0],
        )
        .unwrap()
    }

    #[test]
    fn valid_frame_converts_to_panel() {
        let panel = gate().validate_frame(&valid_frame()).unwrap();
        assert_eq!(panel.entity_key, "country_id");
        assert_eq!(panel.covariate_names, vec!["pop".to_string()]);
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.rows[3], PanelRow::new(101, 2, 3.0, vec![21.0]));
    }

    #[test]
    fn int32_keys_are_accepted() {
        let df = df!(
            "month_id" => &[100i32, 101],
            "priogrid_gid" => &[7i32, 7],
            "ged" => &[0.0, 1.0],
        )
        .unwrap();
        let panel = gate().validate_frame(&df).unwrap();
        assert_eq!(panel.entity_key, "priogrid_gid");
        assert!(panel.covariate_names.is_empty());
    }

    #[test]
    fn every_offending_column_is_named() {
        let df = df!(
            "month_id" => &[100i64, 101],
            "country_id" => &[1i64, 1],
            "ged" => &[0.0, 1.0],
            "count" => &[1i64, 2],
            "label" => &["a", "b"],
            "small" => &[1.0f32, 2.0],
        )
        .unwrap();
        let err = match gate().validate_frame(&df) {
            Err(ForecastError::Format(e)) => e,
            other => panic!("expected format error, got {other:?}"),
        };
        let msg = err.to_string();
        assert!(msg.contains("count"), "{msg}");
        assert!(msg.contains("label"), "{msg}");
        assert!(msg.contains("small"), "{msg}");
        assert_eq!(err.issues.len(), 3);
    }

    #[test]
    fn missing_levels_are_reported_together() {
        let df = df!(
            "ged" => &[0.0, 1.0],
        )
        .unwrap();
        let err = match gate().validate_frame(&df) {
            Err(ForecastError::Format(e)) => e,
            other => panic!("expected format error, got {other:?}"),
        };
        assert!(err.issues.contains(&FormatIssue::MissingTimeKey("month_id".into())));
        assert!(err
            .issues
            .iter()
            .any(|i| matches!(i, FormatIssue::NoEntityKey(_))));
    }

    #[test]
    fn two_entity_levels_rejected() {
        let df = df!(
            "month_id" => &[100i64],
            "country_id" => &[1i64],
            "priogrid_gid" => &[5i64],
            "ged" => &[0.0],
        )
        .unwrap();
        assert!(matches!(
            gate().validate_frame(&df),
            Err(ForecastError::Format(_))
        ));
    }

    #[test]
    fn duplicate_keys_rejected() {
        let panel = Panel::new("month_id", "country_id", "ged", vec![]).with_rows(vec![
            PanelRow::new(100, 1, 0.0, vec![]),
            PanelRow::new(100, 1, 1.0, vec![]),
        ]);
        let err = gate().validate_panel(&panel).unwrap_err();
        assert_eq!(err.issues, vec![FormatIssue::DuplicateKeys { count: 1 }]);
    }

    #[test]
    fn non_finite_and_ragged_rows_rejected() {
        let panel = Panel::new("month_id", "country_id", "ged", vec!["a".into(), "b".into()])
            .with_rows(vec![
                PanelRow::new(100, 1, f64::NAN, vec![1.0, 2.0]),
                PanelRow::new(101, 1, 1.0, vec![f64::INFINITY, 2.0]),
                PanelRow::new(102, 1, 1.0, vec![1.0]),
            ]);
        let err = gate().validate_panel(&panel).unwrap_err();
        assert!(err.issues.contains(&FormatIssue::NonFiniteValues("ged".into())));
        assert!(err.issues.contains(&FormatIssue::NonFiniteValues("a".into())));
        assert!(err
            .issues
            .iter()
            .any(|i| matches!(i, FormatIssue::CovariateArity { count: 1, .. })));
    }

    #[test]
    fn feature_contract_names_differences() {
        let expected = vec!["a".to_string(), "b".to_string()];
        let actual = vec!["a".to_string(), "c".to_string()];
        let err = ValidationGate::check_feature_contract(&expected, &actual).unwrap_err();
        assert!(err.issues.contains(&FormatIssue::MissingCovariate("b".into())));
        assert!(err.issues.contains(&FormatIssue::UnexpectedCovariate("c".into())));
        assert!(ValidationGate::check_feature_contract(&expected, &expected).is_ok());
    }
}
