//! Human-readable explanation of a verdict.
//!
//! Built deterministically from the trust score band and the ranked
//! contributors. No model is consulted.

use crate::types::{Contribution, EnsembleResult, Explanation};

/// Scores above this read as clearly authentic.
pub const HIGH_TRUST: f64 = 0.7;

/// Scores below this read as clearly suspicious.
pub const LOW_TRUST: f64 = 0.4;

/// Describe a verdict and what drove it.
pub fn narrate(result: &EnsembleResult, explanation: &Explanation) -> String {
    let mut text = format!(
        "This review was classified as {} with a trust score of {:.2}. ",
        result.label, result.trust_score
    );

    let band = if result.trust_score > HIGH_TRUST {
        "The wording shows consistent signs of authenticity."
    } else if result.trust_score < LOW_TRUST {
        "The wording carries several red flags common in fabricated reviews."
    } else {
        "The evidence is mixed, so the classification should be treated as uncertain."
    };
    text.push_str(band);

    if !explanation.positive.is_empty() {
        text.push_str(&format!(
            " Terms supporting authenticity: {}.",
            feature_list(&explanation.positive)
        ));
    }
    if !explanation.negative.is_empty() {
        text.push_str(&format!(
            " Terms raising doubt: {}.",
            feature_list(&explanation.negative)
        ));
    }

    if result.has_disagreement() {
        let detail: Vec<String> = result
            .constituents
            .iter()
            .map(|c| format!("{} {} {:.2}", c.model, c.score.label, c.score.probability))
            .collect();
        text.push_str(&format!(
            " The models disagree ({}); the verdict is their average.",
            detail.join(", ")
        ));
    }

    text
}

fn feature_list(contributions: &[Contribution]) -> String {
    contributions
        .iter()
        .map(|c| format!("\"{}\"", c.feature))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::Fuser;
    use crate::types::ClassScore;

    fn result(a: f64, b: f64) -> EnsembleResult {
        Fuser::new().fuse(
            ClassScore::from_probability(a).unwrap(),
            ClassScore::from_probability(b).unwrap(),
        )
    }

    #[test]
    fn test_high_band() {
        let explanation = Explanation {
            positive: vec![Contribution::new("excellent", 0.5)],
            negative: vec![Contribution::new("fraud", -0.3)],
        };
        let text = narrate(&result(0.82, 0.74), &explanation);
        assert!(text
            .starts_with("This review was classified as genuine with a trust score of 0.78."));
        assert!(text.contains("signs of authenticity"));
        assert!(text.contains("\"excellent\""));
        assert!(text.contains("\"fraud\""));
        assert!(!text.contains("disagree"));
    }

    #[test]
    fn test_low_band() {
        let text = narrate(&result(0.1, 0.2), &Explanation::default());
        assert!(text.contains("red flags"));
        assert!(!text.contains("Terms"));
    }

    #[test]
    fn test_mid_band_with_disagreement() {
        let text = narrate(&result(0.9, 0.2), &Explanation::default());
        assert!(text.contains("uncertain"));
        assert!(text.contains("lexical genuine 0.90"));
        assert!(text.contains("semantic fake 0.20"));
    }
}
