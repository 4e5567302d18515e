//! Fitted artifact parsing and validation.
//!
//! Artifacts are produced by an external training step and exported as
//! JSON. This module only reads them; nothing here ever writes one.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when reading an artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read artifact file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Artifact validation failed: {0}")]
    ValidationError(String),
}

/// Artifacts that check their own structural consistency after parsing.
pub(crate) trait Validate {
    fn validate(&self) -> Result<(), ArtifactError>;
}

/// Parse and validate an artifact from a JSON string.
pub(crate) fn from_json<T>(json: &str) -> Result<T, ArtifactError>
where
    T: DeserializeOwned + Validate,
{
    let artifact: T = serde_json::from_str(json)?;
    artifact.validate()?;
    Ok(artifact)
}

/// Parse and validate an artifact from a JSON file.
pub(crate) fn from_json_file<T>(path: impl AsRef<Path>) -> Result<T, ArtifactError>
where
    T: DeserializeOwned + Validate,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let artifact = from_json(&contents)?;
    tracing::debug!(path = %path.display(), "Artifact parsed");
    Ok(artifact)
}
