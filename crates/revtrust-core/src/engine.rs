//! The trust engine: validated entry points over injected artifacts.
//!
//! Artifacts arrive as `Arc` handles through the builder, never through
//! global lookup, so tests can swap in fakes per engine. A missing handle
//! is not a construction error; requests that need it fail with
//! `ArtifactUnavailable`.

use std::sync::Arc;

use crate::attribution::{AttributionEngine, FeatureAttributor, TreeShap};
use crate::encoder::FeatureEncoder;
use crate::fusion::Fuser;
use crate::lexical::{LexicalModel, TreeEnsemble};
use crate::narrative::narrate;
use crate::scorer::{LexicalScorer, Scorer, SemanticScorer};
use crate::semantic::{
    SemanticClassifier, SequenceModel, SequenceTokenizer, MAX_SEQUENCE_LENGTH,
};
use crate::types::{EnsembleResult, Explanation, ModelScore, ReviewText, TrustReport};
use crate::{Artifact, Result, ScoringError};

/// Contributors returned per list when the caller does not say.
pub const DEFAULT_TOP_N: usize = 5;

/// Stateless scoring and explanation over shared, read-only artifacts.
pub struct TrustEngine {
    scorers: Vec<Arc<dyn Scorer>>,
    attribution: AttributionEngine,
    fuser: Fuser,
    availability: Vec<(Artifact, bool)>,
}

impl TrustEngine {
    pub fn builder() -> TrustEngineBuilder {
        TrustEngineBuilder::new()
    }

    /// Score a review with every path and fuse the results.
    ///
    /// Input is validated before anything else, then every scorer is
    /// checked for its artifacts, and only then does any model run.
    pub fn predict(&self, text: &str) -> Result<EnsembleResult> {
        let review = ReviewText::new(text)?;
        self.ensure_scorers_ready()?;

        let constituents = self
            .scorers
            .iter()
            .map(|scorer| Ok(ModelScore::new(scorer.kind(), scorer.score(&review)?)))
            .collect::<Result<Vec<_>>>()?;

        let result = self.fuse(constituents)?;
        tracing::debug!(
            label = %result.label,
            trust_score = result.trust_score,
            "Review scored"
        );
        Ok(result)
    }

    /// Rank the features behind the lexical verdict.
    ///
    /// Needs the encoder, the lexical model and its attributor; the
    /// semantic path is not consulted.
    pub fn explain(&self, text: &str, top_n: usize) -> Result<Explanation> {
        let review = ReviewText::new(text)?;
        self.attribution.ensure_ready()?;
        if !self.is_available(Artifact::LexicalModel) {
            return Err(ScoringError::ArtifactUnavailable(Artifact::LexicalModel));
        }
        self.attribution.explain(&review, top_n)
    }

    /// Verdict, contributors and narrative in one call.
    pub fn report(&self, text: &str, top_n: usize) -> Result<TrustReport> {
        let result = self.predict(text)?;
        let explanation = self.explain(text, top_n)?;
        let narrative = narrate(&result, &explanation);
        Ok(TrustReport {
            result,
            explanation,
            narrative,
        })
    }

    /// Fail with the first missing artifact of any scorer.
    pub fn ensure_scorers_ready(&self) -> Result<()> {
        self.scorers.iter().try_for_each(|s| s.ensure_ready())
    }

    /// Scorers in fusion order. Callers that run paths concurrently score
    /// each one and hand the results to [`TrustEngine::fuse`].
    pub fn scorers(&self) -> &[Arc<dyn Scorer>] {
        &self.scorers
    }

    /// Fuse constituent scores with the engine's fuser.
    pub fn fuse(&self, constituents: Vec<ModelScore>) -> Result<EnsembleResult> {
        self.fuser
            .fuse_all(constituents)
            .ok_or_else(|| ScoringError::InferenceFailure("no scorers configured".to_string()))
    }

    /// Which artifacts were supplied at construction.
    pub fn availability(&self) -> &[(Artifact, bool)] {
        &self.availability
    }

    fn is_available(&self, artifact: Artifact) -> bool {
        self.availability
            .iter()
            .any(|(a, loaded)| *a == artifact && *loaded)
    }
}

/// Builder for TrustEngine.
#[derive(Default)]
pub struct TrustEngineBuilder {
    encoder: Option<Arc<dyn FeatureEncoder>>,
    lexical_model: Option<Arc<dyn LexicalModel>>,
    attributor: Option<Arc<dyn FeatureAttributor>>,
    semantic_tokenizer: Option<Arc<dyn SequenceTokenizer>>,
    semantic_model: Option<Arc<dyn SequenceModel>>,
    max_length: Option<usize>,
    extra_scorers: Vec<Arc<dyn Scorer>>,
}

impl TrustEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoder(mut self, encoder: Arc<dyn FeatureEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Score and explain with the same tree ensemble.
    pub fn lexical_trees(self, trees: Arc<TreeEnsemble>) -> Self {
        let attributor = Arc::new(TreeShap::new(trees.clone()));
        self.lexical_model(trees).attributor(attributor)
    }

    /// Lexical model without an attributor; `explain` stays unavailable
    /// until [`TrustEngineBuilder::attributor`] supplies one for this model.
    pub fn lexical_model(mut self, model: Arc<dyn LexicalModel>) -> Self {
        self.lexical_model = Some(model);
        self
    }

    /// Attributor for a custom lexical model. It must explain the model
    /// given to [`TrustEngineBuilder::lexical_model`].
    pub fn attributor(mut self, attributor: Arc<dyn FeatureAttributor>) -> Self {
        self.attributor = Some(attributor);
        self
    }

    pub fn semantic_tokenizer(mut self, tokenizer: Arc<dyn SequenceTokenizer>) -> Self {
        self.semantic_tokenizer = Some(tokenizer);
        self
    }

    pub fn semantic_model(mut self, model: Arc<dyn SequenceModel>) -> Self {
        self.semantic_model = Some(model);
        self
    }

    /// Token window for the semantic path (default 512).
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Register an additional scoring path, fused after the built-in two.
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.extra_scorers.push(scorer);
        self
    }

    pub fn build(self) -> TrustEngine {
        let availability = vec![
            (Artifact::FeatureEncoder, self.encoder.is_some()),
            (Artifact::LexicalModel, self.lexical_model.is_some()),
            (Artifact::Attributor, self.attributor.is_some()),
            (Artifact::SemanticTokenizer, self.semantic_tokenizer.is_some()),
            (Artifact::SemanticModel, self.semantic_model.is_some()),
        ];

        let lexical = LexicalScorer::new(self.encoder.clone(), self.lexical_model);
        let semantic = SemanticScorer::new(
            SemanticClassifier::new(self.semantic_tokenizer, self.semantic_model)
                .with_max_length(self.max_length.unwrap_or(MAX_SEQUENCE_LENGTH)),
        );

        let mut scorers: Vec<Arc<dyn Scorer>> = vec![Arc::new(lexical), Arc::new(semantic)];
        scorers.extend(self.extra_scorers);

        TrustEngine {
            scorers,
            attribution: AttributionEngine::new(self.encoder, self.attributor),
            fuser: Fuser::new(),
            availability,
        }
    }
}
