//! Panel loading for the runner.
//!
//! Reads a CSV or Parquet file into a polars `DataFrame` through the lazy
//! readers and fingerprints the file bytes, so a run manifest can name the
//! exact dataset it was produced from. Integer value columns (event counts
//! read by CSV inference) are widened to Float64; every other shape and
//! dtype check is left to the validation gate.

use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported panel format '{0}' (expected .csv or .parquet)")]
    UnsupportedFormat(String),

    #[error("ingest failed: {0}")]
    Ingest(String),
}

/// Supported panel file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFormat {
    Csv,
    Parquet,
}

impl PanelFormat {
    /// Format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(PanelFormat::Csv),
            "parquet" | "pq" => Ok(PanelFormat::Parquet),
            _ => Err(LoadError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A loaded panel plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedPanel {
    pub frame: DataFrame,
    pub format: PanelFormat,
    /// BLAKE3 over the raw file bytes.
    pub dataset_hash: String,
}

impl LoadedPanel {
    pub fn rows(&self) -> usize {
        self.frame.height()
    }

    /// Cast every integer column not named in `keys` to Float64.
    pub fn with_float_values(mut self, keys: &[&str]) -> Result<Self, LoadError> {
        let casts: Vec<Expr> = self
            .frame
            .get_columns()
            .iter()
            .filter(|c| c.dtype().is_integer() && !keys.contains(&c.name().as_str()))
            .map(|c| col(c.name().clone()).cast(DataType::Float64))
            .collect();
        if casts.is_empty() {
            return Ok(self);
        }
        tracing::debug!(columns = casts.len(), "widening integer value columns");
        self.frame = self
            .frame
            .lazy()
            .with_columns(casts)
            .collect()
            .map_err(|e| LoadError::Ingest(e.to_string()))?;
        Ok(self)
    }
}

/// Load a panel file.
pub fn load_panel(path: &Path) -> Result<LoadedPanel, LoadError> {
    let format = PanelFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset_hash = blake3::hash(&bytes).to_hex().to_string();

    let lazy = match format {
        PanelFormat::Csv => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .map_err(|e| LoadError::Ingest(e.to_string()))?,
        PanelFormat::Parquet => LazyFrame::scan_parquet(path, Default::default())
            .map_err(|e| LoadError::Ingest(e.to_string()))?,
    };
    let frame = lazy
        .collect()
        .map_err(|e| LoadError::Ingest(e.to_string()))?;

    tracing::debug!(
        path = %path.display(),
        rows = frame.height(),
        columns = frame.width(),
        hash = %&dataset_hash[..12],
        "loaded panel"
    );

    Ok(LoadedPanel {
        frame,
        format,
        dataset_hash,
    })
}
