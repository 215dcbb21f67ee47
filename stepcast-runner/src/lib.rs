//! Stepcast Runner — run orchestration on top of `stepcast-core`.
//!
//! This crate provides:
//! - TOML run specs (forecast config, run type, input, output directory)
//! - Panel loading from CSV or Parquet with dataset hashing
//! - Fit/predict runs producing wide (evaluation) or diagonal (forecast) tables
//! - Artifact export: prediction CSV, model JSON, manifest, Markdown summary

pub mod config;
pub mod export;
pub mod loader;
pub mod runner;

pub use config::{ConfigError, RunId, RunSpec};
pub use export::{
    load_manifest, load_model, save_artifacts, RunArtifacts, RunManifest,
    MANIFEST_SCHEMA_VERSION,
};
pub use loader::{load_panel, LoadError, LoadedPanel, PanelFormat};
pub use runner::{
    run, run_from_frame, run_from_frame_with_sink, run_spec_file, CompletedRun, RunError,
    RunOutput, RunResult,
};
