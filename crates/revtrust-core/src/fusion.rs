//! Fuser: combines constituent scores into the final verdict.
//!
//! The fuser applies one strict, non-configurable rule:
//! 1. `trust_score` = unweighted mean of constituent probabilities
//! 2. `label` = genuine if `trust_score` > 0.5, else fake
//!
//! There is no confidence weighting and no disagreement handling. Both
//! constituent scores travel with the result so callers can audit them.

use crate::types::{ClassScore, EnsembleResult, Label, ModelKind, ModelScore};

/// The Fuser combines scorer outputs into a final result.
pub struct Fuser;

impl Fuser {
    pub fn new() -> Self {
        Self
    }

    /// Fuse the lexical and semantic scores.
    pub fn fuse(&self, lexical: ClassScore, semantic: ClassScore) -> EnsembleResult {
        self.combine(vec![
            ModelScore::new(ModelKind::Lexical, lexical),
            ModelScore::new(ModelKind::Semantic, semantic),
        ])
    }

    /// Fuse any number of constituent scores.
    ///
    /// Returns `None` when there is nothing to fuse.
    pub fn fuse_all(&self, constituents: Vec<ModelScore>) -> Option<EnsembleResult> {
        if constituents.is_empty() {
            return None;
        }
        Some(self.combine(constituents))
    }

    fn combine(&self, constituents: Vec<ModelScore>) -> EnsembleResult {
        let sum: f64 = constituents.iter().map(|c| c.score.probability).sum();
        let trust_score = sum / constituents.len() as f64;

        EnsembleResult {
            label: Label::from_probability(trust_score),
            trust_score,
            constituents,
        }
    }
}

impl Default for Fuser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn score(p: f64) -> ClassScore {
        ClassScore::from_probability(p).unwrap()
    }

    #[test]
    fn test_example_review_is_genuine() {
        let result = Fuser::new().fuse(score(0.82), score(0.74));
        assert!((result.trust_score - 0.78).abs() < 1e-12);
        assert_eq!(result.label, Label::Genuine);
        assert_eq!(result.lexical().unwrap().probability, 0.82);
        assert_eq!(result.semantic().unwrap().probability, 0.74);
    }

    #[test]
    fn test_exact_half_is_fake() {
        let result = Fuser::new().fuse(score(0.75), score(0.25));
        assert_eq!(result.trust_score, 0.5);
        assert_eq!(result.label, Label::Fake);
    }

    #[test]
    fn test_disagreement_is_only_averaged() {
        let result = Fuser::new().fuse(score(0.95), score(0.1));
        assert!(result.has_disagreement());
        assert!((result.trust_score - 0.525).abs() < 1e-12);
        assert_eq!(result.label, Label::Genuine);
    }

    #[test]
    fn test_fuse_all_third_model() {
        let result = Fuser::new()
            .fuse_all(vec![
                ModelScore::new(ModelKind::Lexical, score(0.9)),
                ModelScore::new(ModelKind::Semantic, score(0.6)),
                ModelScore::new(ModelKind::Other("stylometry".into()), score(0.0)),
            ])
            .unwrap();
        assert!((result.trust_score - 0.5).abs() < 1e-12);
        assert_eq!(result.constituents.len(), 3);
    }

    #[test]
    fn test_fuse_all_empty() {
        assert!(Fuser::new().fuse_all(vec![]).is_none());
    }

    proptest! {
        #[test]
        fn prop_score_is_mean(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let result = Fuser::new().fuse(score(a), score(b));
            prop_assert!((result.trust_score - (a + b) / 2.0).abs() < 1e-12);
        }

        #[test]
        fn prop_label_follows_score(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let result = Fuser::new().fuse(score(a), score(b));
            prop_assert!((0.0..=1.0).contains(&result.trust_score));
            prop_assert_eq!(result.label, Label::from_probability(result.trust_score));
        }
    }
}
