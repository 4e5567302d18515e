//! # revtrust-core
//!
//! Deterministic review-authenticity ensemble inference and explanation engine.
//!
//! This crate answers two questions about a free-text review:
//! - How much should we trust it? (`TrustEngine::predict`)
//! - Which words drove that verdict? (`TrustEngine::explain`)
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same text and same artifacts always produce the same output
//! 2. **Auditable**: The fused score is an unweighted mean and both constituent
//!    scores are always returned alongside it
//! 3. **All-or-nothing**: Input is validated and every artifact is checked before
//!    any model runs; no partial result is ever returned
//! 4. **Parallel-safe**: Artifacts are shared read-only behind `Arc`
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use revtrust_core::{TfidfEncoder, TreeEnsemble, TrustEngine};
//!
//! let encoder = Arc::new(TfidfEncoder::from_json_file("tfidf.json")?);
//! let trees = Arc::new(TreeEnsemble::from_json_file("trees.json")?);
//!
//! let engine = TrustEngine::builder()
//!     .encoder(encoder)
//!     .lexical_trees(trees)
//!     .semantic_tokenizer(tokenizer)
//!     .semantic_model(model)
//!     .build();
//!
//! let result = engine.predict("Excellent product, exactly as described")?;
//! println!("{} ({:.2})", result.label, result.trust_score);
//! ```

pub mod artifact;
pub mod attribution;
pub mod encoder;
pub mod engine;
pub mod fusion;
pub mod lexical;
pub mod narrative;
pub mod scorer;
pub mod semantic;
pub mod types;

// Re-export main types at crate root
pub use artifact::ArtifactError;
pub use attribution::{rank_contributions, AttributionEngine, FeatureAttributor, TreeShap};
pub use encoder::{FeatureEncoder, FeatureVector, TfidfEncoder, TfidfNorm};
pub use engine::{TrustEngine, TrustEngineBuilder, DEFAULT_TOP_N};
pub use fusion::Fuser;
pub use lexical::{LexicalClassifier, LexicalModel, Tree, TreeEnsemble, TreeNode};
pub use narrative::narrate;
pub use scorer::{LexicalScorer, Scorer, SemanticScorer};
pub use semantic::{
    softmax, SemanticClassifier, SequenceModel, SequenceTokenizer, TokenBatch, TokenizeOptions,
    MAX_SEQUENCE_LENGTH,
};
pub use types::{
    ClassScore, Contribution, EnsembleResult, Explanation, Label, ModelKind, ModelScore,
    ReviewText, TrustReport, DECISION_THRESHOLD,
};

use std::fmt;
use thiserror::Error;

/// A model artifact the engine may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    FeatureEncoder,
    LexicalModel,
    SemanticTokenizer,
    SemanticModel,
    Attributor,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Artifact::FeatureEncoder => "feature encoder",
            Artifact::LexicalModel => "lexical model",
            Artifact::SemanticTokenizer => "semantic tokenizer",
            Artifact::SemanticModel => "semantic model",
            Artifact::Attributor => "feature attributor",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during scoring or explanation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Artifact unavailable: {0} was not loaded")]
    ArtifactUnavailable(Artifact),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),
}

impl ScoringError {
    /// Transport failure class for this error.
    ///
    /// Input problems are the caller's fault (400); everything else is a
    /// service-level failure (500).
    pub fn status(&self) -> u16 {
        match self {
            ScoringError::InvalidInput(_) => 400,
            ScoringError::ArtifactUnavailable(_) | ScoringError::InferenceFailure(_) => 500,
        }
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, ScoringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(ScoringError::InvalidInput("empty".into()).status(), 400);
        assert_eq!(
            ScoringError::ArtifactUnavailable(Artifact::LexicalModel).status(),
            500
        );
        assert_eq!(ScoringError::InferenceFailure("shape".into()).status(), 500);
    }

    #[test]
    fn test_artifact_display() {
        let err = ScoringError::ArtifactUnavailable(Artifact::SemanticTokenizer);
        assert_eq!(
            err.to_string(),
            "Artifact unavailable: semantic tokenizer was not loaded"
        );
    }
}
