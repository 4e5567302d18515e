//! # revtrust-runtime
//!
//! Service runtime around the deterministic Revtrust engine.
//!
//! The core crate answers one request at a time on the calling thread.
//! This crate adds what a long-running service needs around it:
//! - Artifact loading from configured paths, tolerant of missing files
//! - Blocking inference moved off the async executor, with a timeout
//! - A result cache (scoring is deterministic, so cached answers stay valid)
//! - Batch scoring with bounded concurrency
//! - Latency statistics per operation
//!
//! ## Example
//!
//! ```rust,ignore
//! use revtrust_runtime::{load_engine, RuntimeConfig, ScoringService};
//!
//! let config = RuntimeConfig::from_file("revtrust.yaml")?;
//! let engine = load_engine(&config.artifacts, config.scoring.max_length);
//! let service = ScoringService::new(engine, &config);
//!
//! let scored = service.predict("Excellent product, fast shipping").await?;
//! println!("{} ({:.2})", scored.result.label, scored.result.trust_score);
//! ```

pub mod cache;
pub mod config;
pub mod loader;
pub mod service;
pub mod stats;

#[cfg(feature = "ml")]
pub mod bert;

pub use cache::{CacheKey, ResultCache};
pub use config::{ArtifactPaths, CacheConfig, RuntimeConfig, ScoringConfig};
pub use loader::load_engine;
pub use service::{score_batch, ReviewScorer, ScoredReview, ScoringService};
pub use stats::{LatencySnapshot, LatencyStats, Operation};

#[cfg(feature = "ml")]
pub use bert::BertSequenceClassifier;

use revtrust_core::ScoringError;
use std::time::Duration;
use thiserror::Error;

/// Errors from the runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl RuntimeError {
    /// Transport failure class for this error.
    pub fn status(&self) -> u16 {
        match self {
            RuntimeError::Scoring(e) => e.status(),
            RuntimeError::Timeout(_) => 504,
            RuntimeError::Config(_) | RuntimeError::Join(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtrust_core::Artifact;

    #[test]
    fn test_status_mirrors_core() {
        let invalid: RuntimeError = ScoringError::InvalidInput("empty".into()).into();
        assert_eq!(invalid.status(), 400);

        let missing: RuntimeError =
            ScoringError::ArtifactUnavailable(Artifact::SemanticModel).into();
        assert_eq!(missing.status(), 500);

        assert_eq!(RuntimeError::Timeout(Duration::from_secs(5)).status(), 504);
        assert_eq!(RuntimeError::Join("panicked".into()).status(), 500);
    }

    #[test]
    fn test_scoring_error_is_transparent() {
        let err: RuntimeError = ScoringError::InvalidInput("review text is empty".into()).into();
        assert_eq!(err.to_string(), "Invalid input: review text is empty");
    }
}
