//! Feature Encoder: raw text to sparse bag-of-terms vector.
//!
//! The encoder artifact is fitted elsewhere. Here we only apply it:
//! tokenize, look terms up in the fitted vocabulary, weight them, and
//! normalize. Terms outside the vocabulary are dropped silently.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::artifact::{self, ArtifactError, Validate};
use crate::{Result, ScoringError};

lazy_static! {
    /// Default word pattern: runs of two or more word characters.
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\b\w\w+\b").unwrap();
}

/// Capability: turn text into a feature vector.
///
/// `feature_names` is index-aligned with the vector dimensions and is the
/// only way callers learn what a dimension means.
pub trait FeatureEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<FeatureVector>;

    fn feature_names(&self) -> &[String];
}

/// Sparse feature vector with a fixed dimension.
///
/// Absent dimensions are zero. Stored weights are finite and non-negative.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    dimension: usize,
    weights: BTreeMap<usize, f64>,
}

impl FeatureVector {
    /// An all-zero vector.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            weights: BTreeMap::new(),
        }
    }

    /// Build a vector from `(index, weight)` pairs. Zero weights are skipped.
    pub fn from_entries(
        dimension: usize,
        entries: impl IntoIterator<Item = (usize, f64)>,
    ) -> Result<Self> {
        let mut vector = Self::new(dimension);
        for (index, weight) in entries {
            vector.set(index, weight)?;
        }
        Ok(vector)
    }

    fn set(&mut self, index: usize, weight: f64) -> Result<()> {
        if index >= self.dimension {
            return Err(ScoringError::InferenceFailure(format!(
                "feature index {} out of range for dimension {}",
                index, self.dimension
            )));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(ScoringError::InferenceFailure(format!(
                "feature {} has invalid weight {}",
                index, weight
            )));
        }
        if weight == 0.0 {
            self.weights.remove(&index);
        } else {
            self.weights.insert(index, weight);
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of non-zero dimensions.
    pub fn nnz(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight at `index`, zero when absent.
    pub fn get(&self, index: usize) -> f64 {
        self.weights.get(&index).copied().unwrap_or(0.0)
    }

    /// Non-zero entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.weights.iter().map(|(i, w)| (*i, *w))
    }

    /// Name-keyed view using the encoder's feature names.
    pub fn named(&self, names: &[String]) -> BTreeMap<String, f64> {
        self.iter()
            .filter_map(|(i, w)| names.get(i).map(|name| (name.clone(), w)))
            .collect()
    }
}

/// Row normalization applied after weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TfidfNorm {
    #[default]
    L2,
    L1,
    None,
}

fn default_true() -> bool {
    true
}

/// On-disk shape of a fitted TF-IDF vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TfidfArtifact {
    /// Term to column index
    vocabulary: HashMap<String, usize>,

    /// Inverse document frequency per column
    idf: Vec<f64>,

    #[serde(default = "default_true")]
    lowercase: bool,

    /// Replace tf with 1 + ln(tf)
    #[serde(default)]
    sublinear_tf: bool,

    #[serde(default)]
    norm: TfidfNorm,
}

impl Validate for TfidfArtifact {
    fn validate(&self) -> std::result::Result<(), ArtifactError> {
        let n = self.vocabulary.len();
        if self.idf.len() != n {
            return Err(ArtifactError::ValidationError(format!(
                "idf has {} entries but vocabulary has {} terms",
                self.idf.len(),
                n
            )));
        }

        let mut seen = vec![false; n];
        for (term, &index) in &self.vocabulary {
            if index >= n {
                return Err(ArtifactError::ValidationError(format!(
                    "term '{}' maps to column {} outside 0..{}",
                    term, index, n
                )));
            }
            if std::mem::replace(&mut seen[index], true) {
                return Err(ArtifactError::ValidationError(format!(
                    "duplicate column index: {}",
                    index
                )));
            }
        }

        if let Some(bad) = self.idf.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(ArtifactError::ValidationError(format!(
                "idf[{}] is not a finite non-negative number",
                bad
            )));
        }

        Ok(())
    }
}

/// A fitted TF-IDF vectorizer.
#[derive(Debug, Clone)]
pub struct TfidfEncoder {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    lowercase: bool,
    sublinear_tf: bool,
    norm: TfidfNorm,
    feature_names: Vec<String>,
}

impl TfidfEncoder {
    /// Build an encoder from a vocabulary and matching idf weights,
    /// with the default options (lowercase, raw tf, L2 norm).
    pub fn new(
        vocabulary: HashMap<String, usize>,
        idf: Vec<f64>,
    ) -> std::result::Result<Self, ArtifactError> {
        let artifact = TfidfArtifact {
            vocabulary,
            idf,
            lowercase: true,
            sublinear_tf: false,
            norm: TfidfNorm::default(),
        };
        artifact.validate()?;
        Ok(Self::from_artifact(artifact))
    }

    /// Override the normalization.
    pub fn with_norm(mut self, norm: TfidfNorm) -> Self {
        self.norm = norm;
        self
    }

    /// Enable or disable sublinear tf scaling.
    pub fn with_sublinear_tf(mut self, sublinear_tf: bool) -> Self {
        self.sublinear_tf = sublinear_tf;
        self
    }

    /// Parse an encoder from its JSON export.
    pub fn from_json(json: &str) -> std::result::Result<Self, ArtifactError> {
        artifact::from_json::<TfidfArtifact>(json).map(Self::from_artifact)
    }

    /// Parse an encoder from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::result::Result<Self, ArtifactError> {
        artifact::from_json_file::<TfidfArtifact>(path).map(Self::from_artifact)
    }

    fn from_artifact(artifact: TfidfArtifact) -> Self {
        let mut feature_names = vec![String::new(); artifact.vocabulary.len()];
        for (term, &index) in &artifact.vocabulary {
            feature_names[index] = term.clone();
        }

        Self {
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            lowercase: artifact.lowercase,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
            feature_names,
        }
    }

    /// Number of columns the encoder produces.
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    fn tokenize<'a>(&self, text: &'a str) -> Vec<std::borrow::Cow<'a, str>> {
        TOKEN_PATTERN
            .find_iter(text)
            .map(|m| {
                if self.lowercase {
                    std::borrow::Cow::Owned(m.as_str().to_lowercase())
                } else {
                    std::borrow::Cow::Borrowed(m.as_str())
                }
            })
            .collect()
    }
}

impl FeatureEncoder for TfidfEncoder {
    fn encode(&self, text: &str) -> Result<FeatureVector> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in self.tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&*token) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        for (index, value) in counts.iter_mut() {
            let tf = if self.sublinear_tf {
                1.0 + value.ln()
            } else {
                *value
            };
            *value = tf * self.idf[*index];
        }

        let norm = match self.norm {
            TfidfNorm::L2 => counts.values().map(|v| v * v).sum::<f64>().sqrt(),
            TfidfNorm::L1 => counts.values().map(|v| v.abs()).sum::<f64>(),
            TfidfNorm::None => 1.0,
        };
        if norm > 0.0 {
            for value in counts.values_mut() {
                *value /= norm;
            }
        }

        FeatureVector::from_entries(self.dimension(), counts)
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(terms: &[&str]) -> HashMap<String, usize> {
        terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect()
    }

    #[test]
    fn test_oov_terms_dropped() {
        let encoder =
            TfidfEncoder::new(vocab(&["excellent", "product"]), vec![1.0, 1.0]).unwrap();
        let vector = encoder.encode("Zzyzx qwerty").unwrap();
        assert!(vector.is_empty());
        assert_eq!(vector.dimension(), 2);
    }

    #[test]
    fn test_single_char_tokens_ignored() {
        let encoder = TfidfEncoder::new(vocab(&["a", "ok"]), vec![1.0, 1.0]).unwrap();
        let vector = encoder.encode("a ok").unwrap();
        assert_eq!(vector.get(0), 0.0);
        assert!((vector.get(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_l2_normalized() {
        let encoder = TfidfEncoder::new(
            vocab(&["excellent", "product", "shipping"]),
            vec![2.0, 1.0, 1.5],
        )
        .unwrap();
        let vector = encoder
            .encode("Excellent product, excellent shipping")
            .unwrap();

        let norm: f64 = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        // excellent: tf 2 * idf 2 = 4, product: 1, shipping: 1.5
        let raw = (16.0f64 + 1.0 + 2.25).sqrt();
        assert!((vector.get(0) - 4.0 / raw).abs() < 1e-12);
    }

    #[test]
    fn test_l1_and_sublinear() {
        let encoder = TfidfEncoder::new(vocab(&["great", "fast"]), vec![1.0, 1.0])
            .unwrap()
            .with_norm(TfidfNorm::L1)
            .with_sublinear_tf(true);
        let vector = encoder.encode("great great fast").unwrap();
        let great = 1.0 + 2.0f64.ln();
        let total = great + 1.0;
        assert!((vector.get(0) - great / total).abs() < 1e-12);
        assert!((vector.get(1) - 1.0 / total).abs() < 1e-12);
    }

    #[test]
    fn test_feature_names_index_aligned() {
        let encoder =
            TfidfEncoder::new(vocab(&["alpha", "beta", "gamma"]), vec![1.0; 3]).unwrap();
        assert_eq!(encoder.feature_names(), &["alpha", "beta", "gamma"]);

        let vector = encoder.encode("gamma alpha").unwrap();
        let named = vector.named(encoder.feature_names());
        assert_eq!(named.keys().collect::<Vec<_>>(), vec!["alpha", "gamma"]);
    }

    #[test]
    fn test_deterministic() {
        let encoder = TfidfEncoder::new(vocab(&["good", "bad"]), vec![1.2, 0.7]).unwrap();
        let text = "good good bad and good";
        assert_eq!(encoder.encode(text).unwrap(), encoder.encode(text).unwrap());
    }

    #[test]
    fn test_idf_length_mismatch_rejected() {
        let result = TfidfEncoder::new(vocab(&["one", "two"]), vec![1.0]);
        assert!(matches!(result, Err(ArtifactError::ValidationError(_))));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut v = HashMap::new();
        v.insert("one".to_string(), 0);
        v.insert("two".to_string(), 0);
        let result = TfidfEncoder::new(v, vec![1.0, 1.0]);
        assert!(matches!(result, Err(ArtifactError::ValidationError(_))));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "vocabulary": {"fast": 1, "excellent": 0},
            "idf": [1.5, 1.0],
            "norm": "none"
        }"#;
        let encoder = TfidfEncoder::from_json(json).unwrap();
        let vector = encoder.encode("EXCELLENT and fast").unwrap();
        assert!((vector.get(0) - 1.5).abs() < 1e-12);
        assert!((vector.get(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_rejects_out_of_range() {
        let result = FeatureVector::from_entries(2, vec![(5, 1.0)]);
        assert!(matches!(result, Err(ScoringError::InferenceFailure(_))));
    }

    #[test]
    fn test_vector_rejects_negative_weight() {
        let result = FeatureVector::from_entries(2, vec![(0, -0.1)]);
        assert!(matches!(result, Err(ScoringError::InferenceFailure(_))));
    }
}
