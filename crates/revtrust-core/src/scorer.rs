//! Scorers: the shared contract behind every scoring path.
//!
//! A scorer turns validated review text into a genuine-class probability.
//! Fusion only ever sees scorers, so adding a third model type means
//! implementing this trait, not touching fusion.

use std::sync::Arc;

use crate::encoder::FeatureEncoder;
use crate::lexical::{LexicalClassifier, LexicalModel};
use crate::semantic::SemanticClassifier;
use crate::types::{ClassScore, ModelKind, ReviewText};
use crate::{Artifact, Result, ScoringError};

/// Trait for a single scoring path.
///
/// # Isolation Contract
/// - MUST NOT mutate shared artifacts
/// - MUST NOT depend on another scorer's output
/// - MUST return the same score for the same text and artifacts
pub trait Scorer: Send + Sync {
    /// Which path this scorer represents.
    fn kind(&self) -> ModelKind;

    /// Fail with `ArtifactUnavailable` if anything this scorer needs is missing.
    fn ensure_ready(&self) -> Result<()>;

    /// Score validated text.
    fn score(&self, review: &ReviewText) -> Result<ClassScore>;
}

/// Encoder + tree ensemble path.
#[derive(Clone, Default)]
pub struct LexicalScorer {
    encoder: Option<Arc<dyn FeatureEncoder>>,
    classifier: LexicalClassifier,
}

impl LexicalScorer {
    pub fn new(
        encoder: Option<Arc<dyn FeatureEncoder>>,
        model: Option<Arc<dyn LexicalModel>>,
    ) -> Self {
        Self {
            encoder,
            classifier: LexicalClassifier::new(model),
        }
    }
}

impl Scorer for LexicalScorer {
    fn kind(&self) -> ModelKind {
        ModelKind::Lexical
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.encoder.is_none() {
            return Err(ScoringError::ArtifactUnavailable(Artifact::FeatureEncoder));
        }
        if !self.classifier.is_loaded() {
            return Err(ScoringError::ArtifactUnavailable(Artifact::LexicalModel));
        }
        Ok(())
    }

    fn score(&self, review: &ReviewText) -> Result<ClassScore> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::FeatureEncoder))?;

        let vector = encoder.encode(review.as_str())?;
        tracing::trace!(nnz = vector.nnz(), "Encoded review for lexical model");
        self.classifier.score(&vector)
    }
}

/// Tokenizer + sequence model path.
#[derive(Clone, Default)]
pub struct SemanticScorer {
    classifier: SemanticClassifier,
}

impl SemanticScorer {
    pub fn new(classifier: SemanticClassifier) -> Self {
        Self { classifier }
    }
}

impl Scorer for SemanticScorer {
    fn kind(&self) -> ModelKind {
        ModelKind::Semantic
    }

    fn ensure_ready(&self) -> Result<()> {
        self.classifier.ensure_ready()
    }

    fn score(&self, review: &ReviewText) -> Result<ClassScore> {
        self.classifier.score(review.as_str())
    }
}
