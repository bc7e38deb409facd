use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::detection::domain::known_faces::KnownFaces;
use crate::shared::feature_vector::FeatureVector;

#[derive(Error, Debug)]
pub enum KnownFacesError {
    #[error("failed to read known faces {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse known faces {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("known faces file must be a JSON object of name to encodings")]
    NotAnObject,
    #[error("malformed encodings for '{name}': {reason}")]
    Malformed { name: String, reason: String },
}

/// Reads a known-face file: a JSON object mapping each person to one
/// encoding, a list of encodings, or `null` (person skipped).
pub fn load(path: &Path) -> Result<KnownFaces, KnownFacesError> {
    let json = std::fs::read_to_string(path).map_err(|source| KnownFacesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&json).map_err(|source| KnownFacesError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&value)
}

/// Normalizes the parsed document into a flat list, in key order.
pub fn parse(value: &Value) -> Result<KnownFaces, KnownFacesError> {
    let people = value.as_object().ok_or(KnownFacesError::NotAnObject)?;
    let mut entries = Vec::new();
    for (name, encodings) in people {
        match encodings {
            Value::Null => log::debug!("Skipping '{name}': no encodings"),
            Value::Array(items) if items.first().is_some_and(Value::is_array) => {
                for item in items {
                    entries.push((name.clone(), to_vector(name, item)?));
                }
            }
            Value::Array(_) => entries.push((name.clone(), to_vector(name, encodings)?)),
            _ => {
                return Err(malformed(name, "expected an array or null"));
            }
        }
    }
    Ok(KnownFaces::new(entries))
}

fn to_vector(name: &str, value: &Value) -> Result<FeatureVector, KnownFacesError> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(name, "mixed encodings and scalars"))?;
    let components = items
        .iter()
        .map(|c| c.as_f64().map(|v| v as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| malformed(name, "encoding components must be numbers"))?;
    FeatureVector::new(components).map_err(|e| malformed(name, &e.to_string()))
}

fn malformed(name: &str, reason: &str) -> KnownFacesError {
    KnownFacesError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
