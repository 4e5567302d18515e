//! Value types passed between the scoring components.
//!
//! Everything here is transient: built per request, never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, ScoringError};

/// Probability above which a review is considered genuine.
///
/// The comparison is strict: exactly 0.5 is "fake".
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Authenticity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Genuine,
    Fake,
}

impl Label {
    /// Derive a label from a genuine-class probability.
    pub fn from_probability(probability: f64) -> Self {
        if probability > DECISION_THRESHOLD {
            Label::Genuine
        } else {
            Label::Fake
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Genuine => "genuine",
            Label::Fake => "fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classifier's verdict.
///
/// `probability` is always the mass assigned to the genuine class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: Label,
    pub probability: f64,
}

impl ClassScore {
    /// Build a score from a genuine-class probability.
    ///
    /// Values a hair outside [0,1] from floating-point noise are clamped;
    /// NaN or infinity means the model misbehaved.
    pub fn from_probability(probability: f64) -> Result<Self> {
        if !probability.is_finite() {
            return Err(ScoringError::InferenceFailure(format!(
                "non-finite probability: {}",
                probability
            )));
        }
        let probability = probability.clamp(0.0, 1.0);
        Ok(Self {
            label: Label::from_probability(probability),
            probability,
        })
    }
}

/// Validated review text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReviewText(String);

impl ReviewText {
    /// Validate raw input. Only empty text is rejected; whitespace-only
    /// text is a valid (if uninformative) review.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(ScoringError::InvalidInput(
                "review text must be present and non-empty".to_string(),
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ReviewText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which scoring path produced a constituent score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Tree ensemble over bag-of-terms features.
    Lexical,
    /// Sequence classifier over tokenized text.
    Semantic,
    /// Any additional scorer registered with the engine.
    Other(String),
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Lexical => f.write_str("lexical"),
            ModelKind::Semantic => f.write_str("semantic"),
            ModelKind::Other(name) => f.write_str(name),
        }
    }
}

/// A constituent score tagged with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: ModelKind,
    pub score: ClassScore,
}

impl ModelScore {
    pub fn new(model: ModelKind, score: ClassScore) -> Self {
        Self { model, score }
    }
}

/// Final fused verdict.
///
/// `trust_score` is always the arithmetic mean of the constituent
/// probabilities and `label` always follows from `trust_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub label: Label,
    pub trust_score: f64,
    pub constituents: Vec<ModelScore>,
}

impl EnsembleResult {
    /// Score from the lexical path, if it took part.
    pub fn lexical(&self) -> Option<&ClassScore> {
        self.constituent(&ModelKind::Lexical)
    }

    /// Score from the semantic path, if it took part.
    pub fn semantic(&self) -> Option<&ClassScore> {
        self.constituent(&ModelKind::Semantic)
    }

    pub fn constituent(&self, kind: &ModelKind) -> Option<&ClassScore> {
        self.constituents
            .iter()
            .find(|c| &c.model == kind)
            .map(|c| &c.score)
    }

    /// True when at least two constituents reached different labels.
    pub fn has_disagreement(&self) -> bool {
        let mut labels = self.constituents.iter().map(|c| c.score.label);
        match labels.next() {
            Some(first) => labels.any(|l| l != first),
            None => false,
        }
    }
}

/// One feature's signed push on the lexical prediction.
///
/// Positive values push toward genuine, negative toward fake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f64,
}

impl Contribution {
    pub fn new(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            value,
        }
    }
}

/// Ranked contributors for a single review.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Explanation {
    /// Strongest pushes toward genuine, descending.
    pub positive: Vec<Contribution>,
    /// Strongest pushes toward fake, ascending (most negative first).
    pub negative: Vec<Contribution>,
}

/// Verdict, attribution and narrative together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReport {
    pub result: EnsembleResult,
    pub explanation: Explanation,
    pub narrative: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(Label::from_probability(0.5), Label::Fake);
        assert_eq!(Label::from_probability(0.500_001), Label::Genuine);
        assert_eq!(Label::from_probability(0.0), Label::Fake);
        assert_eq!(Label::from_probability(1.0), Label::Genuine);
    }

    #[test]
    fn test_class_score_rejects_nan() {
        assert!(matches!(
            ClassScore::from_probability(f64::NAN),
            Err(ScoringError::InferenceFailure(_))
        ));
    }

    #[test]
    fn test_class_score_clamps_noise() {
        let score = ClassScore::from_probability(1.000_000_000_1).unwrap();
        assert_eq!(score.probability, 1.0);
        assert_eq!(score.label, Label::Genuine);
    }

    #[test]
    fn test_review_text_rejects_empty_only() {
        assert!(matches!(
            ReviewText::new(""),
            Err(ScoringError::InvalidInput(_))
        ));
        assert_eq!(ReviewText::new("   \n\t").unwrap().as_str(), "   \n\t");
        assert_eq!(ReviewText::new(" ok ").unwrap().as_str(), " ok ");
    }

    #[test]
    fn test_label_serializes_lowercase() {
        let json = serde_json::to_string(&Label::Genuine).unwrap();
        assert_eq!(json, "\"genuine\"");
    }

    #[test]
    fn test_disagreement() {
        let genuine = ClassScore::from_probability(0.9).unwrap();
        let fake = ClassScore::from_probability(0.2).unwrap();
        let result = EnsembleResult {
            label: Label::Genuine,
            trust_score: 0.55,
            constituents: vec![
                ModelScore::new(ModelKind::Lexical, genuine),
                ModelScore::new(ModelKind::Semantic, fake),
            ],
        };
        assert!(result.has_disagreement());
        assert_eq!(result.lexical(), Some(&genuine));
        assert_eq!(result.semantic(), Some(&fake));
    }
}
