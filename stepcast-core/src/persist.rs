//! Versioned JSON envelope for fitted model sets.
//!
//! `serde_json` is built with `float_roundtrip`, so every fitted parameter
//! reads back bit-for-bit and a restored set predicts exactly as the original.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    kind: &'a str,
    model: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    schema_version: u32,
    kind: String,
    model: serde_json::Value,
}

pub fn to_bytes<T: Serialize>(kind: &str, model: &T) -> Result<Vec<u8>, PersistError> {
    serde_json::to_vec(&EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        kind,
        model,
    })
    .map_err(|e| PersistError::Serialize(e.to_string()))
}

/// Checks version and kind before touching the payload.
pub fn from_bytes<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T, PersistError> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| PersistError::Deserialize(e.to_string()))?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(PersistError::SchemaVersion {
            found: envelope.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    if envelope.kind != kind {
        return Err(PersistError::KindMismatch {
            found: envelope.kind,
            expected: kind.to_string(),
        });
    }
    serde_json::from_value(envelope.model).map_err(|e| PersistError::Deserialize(e.to_string()))
}
