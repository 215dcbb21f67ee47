//! Export — CSV prediction tables, model artifacts, run manifests and a
//! Markdown summary.
//!
//! A run directory holds:
//! - `predictions.csv` — the wide or diagonal table
//! - `model.json` — the fitted model in its versioned envelope
//! - `manifest.json` — provenance: run id, dataset hash, partition, horizons
//! - `run.toml` — the spec that produced the run
//! - `report.md` — human-readable summary
//!
//! Manifests carry a `schema_version`; unknown versions are rejected on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stepcast_core::{
    DiagonalTable, ForecastModel, Partition, RunType, StepForecaster, WideTable,
};

use crate::runner::{RunOutput, RunResult};

/// Current schema version for run manifests.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a wide table as CSV.
///
/// Columns: time key, entity key, `step_pred_<h>` per horizon, target.
pub fn export_wide_csv(table: &WideTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![table.time_key.clone(), table.entity_key.clone()];
    header.extend(table.horizons.iter().map(|&h| WideTable::column_name(h)));
    header.push(table.depvar.clone());
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.time_id.to_string());
        record.push(row.entity_id.to_string());
        record.extend(row.predictions.iter().map(|p| p.to_string()));
        record.push(row.target.to_string());
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a diagonal table as CSV.
///
/// Columns: time key, entity key, step, `pred_<target>`, target (empty).
pub fn export_diagonal_csv(table: &DiagonalTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        table.time_key.as_str(),
        table.entity_key.as_str(),
        "step",
        table.prediction_column().as_str(),
        table.depvar.as_str(),
    ])?;

    for row in &table.rows {
        wtr.write_record([
            &row.time_id.to_string(),
            &row.entity_id.to_string(),
            &row.horizon.to_string(),
            &row.value.to_string(),
            &row.target.map(|t| t.to_string()).unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_output_csv(output: &RunOutput) -> Result<String> {
    match output {
        RunOutput::Wide(table) => export_wide_csv(table),
        RunOutput::Diagonal(table) => export_diagonal_csv(table),
    }
}

// ─── Manifest ───────────────────────────────────────────────────────

/// Provenance of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub run_type: RunType,
    /// `"step"` or `"hurdle"`.
    pub model_kind: String,
    pub algorithm: String,
    pub depvar: String,
    pub steps: Vec<u32>,
    pub partition: Partition,
    pub input: PathBuf,
    /// BLAKE3 over the input file bytes.
    pub dataset_hash: String,
    pub config_fingerprint: String,
    pub input_rows: usize,
    /// `"wide"` or `"diagonal"`.
    pub output_mode: String,
    pub output_rows: usize,
    pub fitted_horizons: Vec<u32>,
    pub failed_horizons: BTreeMap<u32, String>,
}

impl RunManifest {
    pub fn from_result(result: &RunResult, dataset_hash: &str) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: result.run_id.clone(),
            timestamp: Utc::now(),
            run_type: result.spec.run_type,
            model_kind: result.model.kind().to_string(),
            algorithm: result.spec.forecast.algorithm.clone(),
            depvar: result.spec.forecast.depvar.clone(),
            steps: result.spec.forecast.steps.as_slice().to_vec(),
            partition: result.partition,
            input: result.spec.input.clone(),
            dataset_hash: dataset_hash.to_string(),
            config_fingerprint: result.spec.forecast.fingerprint(),
            input_rows: result.input_rows,
            output_mode: result.output.mode().to_string(),
            output_rows: result.output.len(),
            fitted_horizons: result.model.fitted_horizons(),
            failed_horizons: result.failed_horizons.clone(),
        }
    }
}

pub fn export_manifest_json(manifest: &RunManifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize run manifest")
}

/// Parse a manifest, rejecting unknown schema versions.
pub fn import_manifest_json(json: &str) -> Result<RunManifest> {
    let manifest: RunManifest =
        serde_json::from_str(json).context("failed to deserialize run manifest")?;
    if manifest.schema_version > MANIFEST_SCHEMA_VERSION {
        bail!(
            "unsupported manifest schema version {} (max supported: {})",
            manifest.schema_version,
            MANIFEST_SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Short Markdown summary of a run.
pub fn generate_report(result: &RunResult, manifest: &RunManifest) -> String {
    let mut md = String::with_capacity(1024);
    let p = &result.partition;

    md.push_str("# Forecast Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", &manifest.run_id[..12]));
    md.push_str(&format!("| Run Type | {} |\n", manifest.run_type));
    md.push_str(&format!(
        "| Model | {} ({}) |\n",
        manifest.algorithm, manifest.model_kind
    ));
    md.push_str(&format!("| Target | {} |\n", manifest.depvar));
    md.push_str(&format!("| Train | {} to {} |\n", p.train_start, p.train_end));
    md.push_str(&format!(
        "| Predict | {} to {} |\n",
        p.predict_start, p.predict_end
    ));
    md.push_str(&format!("| Input Rows | {} |\n", manifest.input_rows));
    md.push_str(&format!(
        "| Output | {} rows ({}) |\n",
        manifest.output_rows, manifest.output_mode
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", manifest.dataset_hash));
    md.push('\n');

    md.push_str("## Horizons\n\n");
    md.push_str(&format!(
        "Fitted: {}\n",
        join_horizons(&manifest.fitted_horizons)
    ));
    if !manifest.failed_horizons.is_empty() {
        md.push_str("\n| Horizon | Failure |\n| --- | --- |\n");
        for (h, message) in &manifest.failed_horizons {
            md.push_str(&format!("| {h} | {message} |\n"));
        }
    }
    md
}

fn join_horizons(horizons: &[u32]) -> String {
    if horizons.is_empty() {
        return "none".to_string();
    }
    horizons
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Paths written by [`save_artifacts`].
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub dir: PathBuf,
    pub predictions_csv: PathBuf,
    pub model_json: PathBuf,
    pub manifest_json: PathBuf,
    pub spec_toml: PathBuf,
    pub report_markdown: PathBuf,
    pub manifest: RunManifest,
}

/// Save the full artifact set for a run.
///
/// Creates `{run_type}_{run_id[..12]}/` under `output_dir`; rerunning the same
/// spec overwrites it.
pub fn save_artifacts(
    result: &RunResult,
    dataset_hash: &str,
    output_dir: &Path,
) -> Result<RunArtifacts> {
    let dirname = format!("{}_{}", result.spec.run_type, &result.run_id[..12]);
    let dir = output_dir.join(dirname);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    let manifest = RunManifest::from_result(result, dataset_hash);
    let artifacts = RunArtifacts {
        predictions_csv: dir.join("predictions.csv"),
        model_json: dir.join("model.json"),
        manifest_json: dir.join("manifest.json"),
        spec_toml: dir.join("run.toml"),
        report_markdown: dir.join("report.md"),
        dir,
        manifest,
    };

    write(&artifacts.predictions_csv, export_output_csv(&result.output)?)?;
    let model = result
        .model
        .to_bytes()
        .context("failed to serialize fitted model")?;
    write(&artifacts.model_json, model)?;
    write(
        &artifacts.manifest_json,
        export_manifest_json(&artifacts.manifest)?,
    )?;
    let spec = result.spec.to_toml().context("failed to serialize run spec")?;
    write(&artifacts.spec_toml, spec)?;
    write(
        &artifacts.report_markdown,
        generate_report(result, &artifacts.manifest),
    )?;

    tracing::info!(dir = %artifacts.dir.display(), "artifacts written");
    Ok(artifacts)
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Load the manifest from an artifact directory.
pub fn load_manifest(dir: &Path) -> Result<RunManifest> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_manifest_json(&json)
}

/// Restore the fitted model from an artifact directory.
pub fn load_model(dir: &Path) -> Result<ForecastModel> {
    let path = dir.join("model.json");
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    ForecastModel::from_bytes(&bytes)
        .with_context(|| format!("failed to restore model from {}", path.display()))
}
