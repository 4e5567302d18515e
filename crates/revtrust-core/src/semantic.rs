//! Semantic Classifier: a sequence model over tokenized raw text.
//!
//! Inference is read-only. The model sees a truncated, padded token batch
//! and returns two raw logits per row; softmax turns them into
//! `[p_fake, p_genuine]` and the genuine probability is kept.

use std::sync::Arc;

use crate::lexical::GENUINE_CLASS;
use crate::types::ClassScore;
use crate::{Artifact, Result, ScoringError};

/// Token window of the sequence model.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Tokenization controls passed to the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizeOptions {
    pub max_length: usize,
    pub truncate: bool,
    pub pad: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            max_length: MAX_SEQUENCE_LENGTH,
            truncate: true,
            pad: true,
        }
    }
}

/// Token tensors, one row per input text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub token_type_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
}

impl TokenBatch {
    /// A batch holding a single sequence.
    pub fn single(input_ids: Vec<u32>, token_type_ids: Vec<u32>, attention_mask: Vec<u32>) -> Self {
        Self {
            input_ids: vec![input_ids],
            token_type_ids: vec![token_type_ids],
            attention_mask: vec![attention_mask],
        }
    }

    pub fn batch_size(&self) -> usize {
        self.input_ids.len()
    }

    /// Length of the longest row.
    pub fn seq_len(&self) -> usize {
        self.input_ids.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Check the batch is rectangular and fits the token window.
    pub fn validate(&self, options: &TokenizeOptions) -> Result<()> {
        if self.input_ids.is_empty() {
            return Err(ScoringError::InferenceFailure(
                "tokenizer produced an empty batch".to_string(),
            ));
        }
        if self.token_type_ids.len() != self.batch_size()
            || self.attention_mask.len() != self.batch_size()
        {
            return Err(ScoringError::InferenceFailure(
                "token tensors disagree on batch size".to_string(),
            ));
        }

        let seq_len = self.seq_len();
        if seq_len == 0 {
            return Err(ScoringError::InferenceFailure(
                "tokenizer produced no tokens".to_string(),
            ));
        }
        if options.truncate && seq_len > options.max_length {
            return Err(ScoringError::InferenceFailure(format!(
                "sequence length {} exceeds window of {}",
                seq_len, options.max_length
            )));
        }

        for row in 0..self.batch_size() {
            let ids = self.input_ids[row].len();
            if self.token_type_ids[row].len() != ids || self.attention_mask[row].len() != ids {
                return Err(ScoringError::InferenceFailure(format!(
                    "row {} has mismatched tensor lengths",
                    row
                )));
            }
            if options.pad && ids != seq_len {
                return Err(ScoringError::InferenceFailure(format!(
                    "row {} is not padded to {}",
                    row, seq_len
                )));
            }
        }

        Ok(())
    }
}

/// Capability: split text into model tokens.
pub trait SequenceTokenizer: Send + Sync {
    fn tokenize(&self, text: &str, options: &TokenizeOptions) -> Result<TokenBatch>;
}

/// Capability: raw class logits for a token batch, one row per sequence.
///
/// Implementations must run in evaluation mode and never update weights.
pub trait SequenceModel: Send + Sync {
    fn forward(&self, tokens: &TokenBatch) -> Result<Vec<Vec<f64>>>;
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Adapter turning tokenizer + model output into a `ClassScore`.
#[derive(Clone, Default)]
pub struct SemanticClassifier {
    tokenizer: Option<Arc<dyn SequenceTokenizer>>,
    model: Option<Arc<dyn SequenceModel>>,
    options: TokenizeOptions,
}

impl SemanticClassifier {
    pub fn new(
        tokenizer: Option<Arc<dyn SequenceTokenizer>>,
        model: Option<Arc<dyn SequenceModel>>,
    ) -> Self {
        Self {
            tokenizer,
            model,
            options: TokenizeOptions::default(),
        }
    }

    /// Override the token window.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.options.max_length = max_length;
        self
    }

    pub fn options(&self) -> &TokenizeOptions {
        &self.options
    }

    /// Fails unless both tokenizer and model are present.
    pub fn ensure_ready(&self) -> Result<()> {
        self.parts().map(|_| ())
    }

    fn parts(&self) -> Result<(&dyn SequenceTokenizer, &dyn SequenceModel)> {
        let tokenizer = self
            .tokenizer
            .as_deref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::SemanticTokenizer))?;
        let model = self
            .model
            .as_deref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::SemanticModel))?;
        Ok((tokenizer, model))
    }

    pub fn score(&self, text: &str) -> Result<ClassScore> {
        let (tokenizer, model) = self.parts()?;

        let tokens = tokenizer.tokenize(text, &self.options)?;
        tokens.validate(&self.options)?;
        tracing::trace!(seq_len = tokens.seq_len(), "Tokenized for semantic model");

        let logits = model.forward(&tokens)?;
        let row = match logits.as_slice() {
            [row] => row,
            rows => {
                return Err(ScoringError::InferenceFailure(format!(
                    "expected logits for 1 sequence, got {}",
                    rows.len()
                )))
            }
        };
        if row.len() != 2 {
            return Err(ScoringError::InferenceFailure(format!(
                "expected 2 class logits, got {}",
                row.len()
            )));
        }
        if row.iter().any(|l| !l.is_finite()) {
            return Err(ScoringError::InferenceFailure(
                "model produced non-finite logits".to_string(),
            ));
        }

        let probs = softmax(row);
        ClassScore::from_probability(probs[GENUINE_CLASS])
    }
}
