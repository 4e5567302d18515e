//! Lexical Classifier: gradient-boosted trees over bag-of-terms features.
//!
//! The classifier reports the probability of the genuine class, which is
//! index 1 of the two-class output `[p_fake, p_genuine]`. Keep that order.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::artifact::{self, ArtifactError, Validate};
use crate::encoder::FeatureVector;
use crate::types::ClassScore;
use crate::{Artifact, Result, ScoringError};

/// Index of the genuine class in a two-class probability vector.
pub const GENUINE_CLASS: usize = 1;

/// Capability: two-class probabilities for a feature vector.
pub trait LexicalModel: Send + Sync {
    /// Returns `[p_fake, p_genuine]`.
    fn predict_proba(&self, vector: &FeatureVector) -> Result<[f64; 2]>;
}

/// Adapter turning a lexical model's output into a `ClassScore`.
#[derive(Clone, Default)]
pub struct LexicalClassifier {
    model: Option<Arc<dyn LexicalModel>>,
}

impl LexicalClassifier {
    pub fn new(model: Option<Arc<dyn LexicalModel>>) -> Self {
        Self { model }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn score(&self, vector: &FeatureVector) -> Result<ClassScore> {
        let model = self
            .model
            .as_ref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::LexicalModel))?;

        let proba = model.predict_proba(vector)?;
        ClassScore::from_probability(proba[GENUINE_CLASS])
    }
}

/// A node in a fitted regression tree.
///
/// Splits send a sample to `yes` when its feature value is strictly below
/// `threshold`, otherwise to `no`. Absent features have value zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        /// Training samples (hessian mass) that reached this node
        cover: f64,
    },
    Leaf {
        /// Margin contribution
        value: f64,
        cover: f64,
    },
}

impl TreeNode {
    pub fn cover(&self) -> f64 {
        match self {
            TreeNode::Split { cover, .. } | TreeNode::Leaf { cover, .. } => *cover,
        }
    }
}

/// A single regression tree. Node 0 is the root.
///
/// Every split points forward to an existing node, so traversal always
/// ends at a leaf. Both `new` and deserialization enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

#[derive(Deserialize)]
struct RawTree {
    nodes: Vec<TreeNode>,
}

impl TryFrom<RawTree> for Tree {
    type Error = ArtifactError;

    fn try_from(raw: RawTree) -> std::result::Result<Self, Self::Error> {
        Tree::new(raw.nodes)
    }
}

impl Tree {
    /// Build a tree, rejecting dangling or backward edges and bad covers.
    pub fn new(nodes: Vec<TreeNode>) -> std::result::Result<Self, ArtifactError> {
        let tree = Self { nodes };
        tree.check_structure().map_err(ArtifactError::ValidationError)?;
        Ok(tree)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Index of the leaf this sample falls into.
    pub fn leaf_index(&self, vector: &FeatureVector) -> usize {
        let mut index = 0;
        while let TreeNode::Split {
            feature,
            threshold,
            yes,
            no,
            ..
        } = &self.nodes[index]
        {
            index = if vector.get(*feature) < *threshold {
                *yes
            } else {
                *no
            };
        }
        index
    }

    /// Margin contribution of this tree for a sample.
    pub fn predict(&self, vector: &FeatureVector) -> f64 {
        match &self.nodes[self.leaf_index(vector)] {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { .. } => unreachable!("leaf_index always stops at a leaf"),
        }
    }

    /// Cover-weighted mean leaf value: the prediction with no features known.
    pub fn expected_value(&self) -> f64 {
        self.expected_value_at(0)
    }

    fn expected_value_at(&self, index: usize) -> f64 {
        match &self.nodes[index] {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { yes, no, cover, .. } => {
                let yes_cover = self.nodes[*yes].cover();
                let no_cover = self.nodes[*no].cover();
                (yes_cover * self.expected_value_at(*yes)
                    + no_cover * self.expected_value_at(*no))
                    / cover
            }
        }
    }

    /// Feature indices this tree splits on, with the splitting node.
    fn split_features(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                TreeNode::Split { feature, .. } => Some((index, *feature)),
                TreeNode::Leaf { .. } => None,
            })
    }

    fn check_structure(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let cover = node.cover();
            if !cover.is_finite() || cover < 0.0 {
                return Err(format!("node {} has invalid cover {}", index, cover));
            }

            match node {
                TreeNode::Leaf { value, .. } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} has non-finite value", index));
                    }
                }
                TreeNode::Split {
                    threshold,
                    yes,
                    no,
                    cover,
                    ..
                } => {
                    // Children after parents keeps every tree acyclic.
                    for child in [*yes, *no] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", index, child));
                        }
                    }
                    if yes == no {
                        return Err(format!("node {} has identical children", index));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has NaN threshold", index));
                    }
                    if *cover <= 0.0 {
                        return Err(format!("split {} has zero cover", index));
                    }
                    let children = self.nodes[*yes].cover() + self.nodes[*no].cover();
                    if (children - cover).abs() > 1e-3 * cover.max(1.0) {
                        return Err(format!(
                            "split {} cover {} does not match children {}",
                            index, cover, children
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// A fitted binary-logistic gradient-boosted tree ensemble.
///
/// Fields are read-only once built; every way of obtaining an ensemble
/// runs the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTreeEnsemble")]
pub struct TreeEnsemble {
    /// Starting margin before any tree is added
    base_score: f64,

    trees: Vec<Tree>,

    /// Width of the feature space the model was trained on
    num_features: Option<usize>,
}

#[derive(Deserialize)]
struct RawTreeEnsemble {
    #[serde(default)]
    base_score: f64,
    trees: Vec<Tree>,
    #[serde(default)]
    num_features: Option<usize>,
}

impl TryFrom<RawTreeEnsemble> for TreeEnsemble {
    type Error = ArtifactError;

    fn try_from(raw: RawTreeEnsemble) -> std::result::Result<Self, Self::Error> {
        TreeEnsemble::with_num_features(raw.base_score, raw.trees, raw.num_features)
    }
}

impl Validate for TreeEnsemble {
    fn validate(&self) -> std::result::Result<(), ArtifactError> {
        if !self.base_score.is_finite() {
            return Err(ArtifactError::ValidationError(
                "base_score is not finite".to_string(),
            ));
        }
        if let Some(n) = self.num_features {
            for (tree_index, tree) in self.trees.iter().enumerate() {
                if let Some((index, feature)) = tree.split_features().find(|(_, f)| *f >= n) {
                    return Err(ArtifactError::ValidationError(format!(
                        "tree {}: node {} splits on feature {} but only {} exist",
                        tree_index, index, feature, n
                    )));
                }
            }
        }
        Ok(())
    }
}

impl TreeEnsemble {
    /// Build and validate an ensemble.
    pub fn new(base_score: f64, trees: Vec<Tree>) -> std::result::Result<Self, ArtifactError> {
        Self::with_num_features(base_score, trees, None)
    }

    /// Build and validate an ensemble trained on `num_features` features.
    pub fn with_num_features(
        base_score: f64,
        trees: Vec<Tree>,
        num_features: Option<usize>,
    ) -> std::result::Result<Self, ArtifactError> {
        let ensemble = Self {
            base_score,
            trees,
            num_features,
        };
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Parse an ensemble from its JSON export.
    pub fn from_json(json: &str) -> std::result::Result<Self, ArtifactError> {
        artifact::from_json(json)
    }

    /// Parse an ensemble from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::result::Result<Self, ArtifactError> {
        artifact::from_json_file(path)
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn num_features(&self) -> Option<usize> {
        self.num_features
    }

    fn check_dimension(&self, vector: &FeatureVector) -> Result<()> {
        match self.num_features {
            Some(n) if n != vector.dimension() => Err(ScoringError::InferenceFailure(format!(
                "model expects {} features, vector has {}",
                n,
                vector.dimension()
            ))),
            _ => Ok(()),
        }
    }

    /// Raw log-odds for the genuine class.
    pub fn margin(&self, vector: &FeatureVector) -> Result<f64> {
        self.check_dimension(vector)?;
        Ok(self.base_score + self.trees.iter().map(|t| t.predict(vector)).sum::<f64>())
    }

    /// Margin with no feature information.
    pub fn expected_margin(&self) -> f64 {
        self.base_score + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }
}

impl LexicalModel for TreeEnsemble {
    fn predict_proba(&self, vector: &FeatureVector) -> Result<[f64; 2]> {
        let genuine = sigmoid(self.margin(vector)?);
        Ok([1.0 - genuine, genuine])
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two stumps: "excellent" (0) pushes genuine, "refund" (1) pushes fake.
    pub(crate) fn sample_ensemble() -> TreeEnsemble {
        TreeEnsemble::new(
            0.0,
            vec![
                Tree::new(vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 0.1,
                        yes: 1,
                        no: 2,
                        cover: 10.0,
                    },
                    TreeNode::Leaf {
                        value: -0.4,
                        cover: 6.0,
                    },
                    TreeNode::Leaf {
                        value: 1.2,
                        cover: 4.0,
                    },
                ])
                .unwrap(),
                Tree::new(vec![
                    TreeNode::Split {
                        feature: 1,
                        threshold: 0.2,
                        yes: 1,
                        no: 2,
                        cover: 10.0,
                    },
                    TreeNode::Leaf {
                        value: 0.3,
                        cover: 8.0,
                    },
                    TreeNode::Leaf {
                        value: -1.5,
                        cover: 2.0,
                    },
                ])
                .unwrap(),
            ],
        )
        .unwrap()
    }

    struct FixedModel([f64; 2]);

    impl LexicalModel for FixedModel {
        fn predict_proba(&self, _vector: &FeatureVector) -> Result<[f64; 2]> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_genuine_is_index_one() {
        let classifier = LexicalClassifier::new(Some(Arc::new(FixedModel([0.18, 0.82]))));
        let score = classifier.score(&FeatureVector::new(3)).unwrap();
        assert_eq!(score.probability, 0.82);
        assert_eq!(score.label, crate::Label::Genuine);
    }

    #[test]
    fn test_missing_model() {
        let classifier = LexicalClassifier::new(None);
        assert_eq!(
            classifier.score(&FeatureVector::new(3)),
            Err(ScoringError::ArtifactUnavailable(Artifact::LexicalModel))
        );
    }

    #[test]
    fn test_margin_follows_splits() {
        let model = sample_ensemble();
        let excellent = FeatureVector::from_entries(2, vec![(0, 0.9)]).unwrap();
        assert!((model.margin(&excellent).unwrap() - 1.5).abs() < 1e-12);

        let refund = FeatureVector::from_entries(2, vec![(1, 0.9)]).unwrap();
        assert!((model.margin(&refund).unwrap() - (-1.9)).abs() < 1e-12);
    }

    #[test]
    fn test_proba_sums_to_one() {
        let model = sample_ensemble();
        let vector = FeatureVector::from_entries(2, vec![(0, 0.5), (1, 0.5)]).unwrap();
        let [fake, genuine] = model.predict_proba(&vector).unwrap();
        assert!((fake + genuine - 1.0).abs() < 1e-12);
        assert!(genuine < 0.5);
    }

    #[test]
    fn test_expected_margin() {
        let model = sample_ensemble();
        // (6 * -0.4 + 4 * 1.2) / 10 + (8 * 0.3 + 2 * -1.5) / 10
        assert!((model.expected_margin() - (0.24 - 0.06)).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let model =
            TreeEnsemble::with_num_features(0.0, sample_ensemble().trees().to_vec(), Some(5))
                .unwrap();
        let vector = FeatureVector::new(2);
        assert!(matches!(
            model.margin(&vector),
            Err(ScoringError::InferenceFailure(_))
        ));
    }

    #[test]
    fn test_backward_child_rejected() {
        let result = Tree::new(vec![
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                yes: 0,
                no: 1,
                cover: 2.0,
            },
            TreeNode::Leaf {
                value: 1.0,
                cover: 1.0,
            },
        ]);
        assert!(matches!(result, Err(ArtifactError::ValidationError(_))));
    }

    #[test]
    fn test_cover_mismatch_rejected() {
        let result = Tree::new(vec![
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                yes: 1,
                no: 2,
                cover: 10.0,
            },
            TreeNode::Leaf {
                value: 1.0,
                cover: 1.0,
            },
            TreeNode::Leaf {
                value: -1.0,
                cover: 1.0,
            },
        ]);
        assert!(matches!(result, Err(ArtifactError::ValidationError(_))));
    }

    #[test]
    fn test_deserialize_rejects_dangling_children() {
        let json = r#"{
            "trees": [
                {"nodes": [
                    {"kind": "split", "feature": 0, "threshold": 0.5,
                     "yes": 5, "no": 6, "cover": 1.0}
                ]}
            ]
        }"#;
        assert!(serde_json::from_str::<TreeEnsemble>(json).is_err());
        assert!(serde_json::from_str::<Tree>(
            r#"{"nodes": [
                {"kind": "split", "feature": 0, "threshold": 0.5, "yes": 0, "no": 0, "cover": 1.0}
            ]}"#
        )
        .is_err());
    }

    #[test]
    fn test_deserialize_checks_feature_bounds() {
        let json = r#"{
            "num_features": 1,
            "trees": [
                {"nodes": [
                    {"kind": "split", "feature": 3, "threshold": 0.5,
                     "yes": 1, "no": 2, "cover": 2.0},
                    {"kind": "leaf", "value": 1.0, "cover": 1.0},
                    {"kind": "leaf", "value": -1.0, "cover": 1.0}
                ]}
            ]
        }"#;
        assert!(serde_json::from_str::<TreeEnsemble>(json).is_err());
        assert!(matches!(
            TreeEnsemble::from_json(json),
            Err(ArtifactError::JsonError(_))
        ));
    }

    #[test]
    fn test_num_features_checked_on_build() {
        let model = sample_ensemble();
        let result = TreeEnsemble::with_num_features(0.0, model.trees().to_vec(), Some(1));
        assert!(matches!(result, Err(ArtifactError::ValidationError(_))));
    }

    #[test]
    fn test_serialized_ensemble_parses_back() {
        let model = sample_ensemble();
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(TreeEnsemble::from_json(&json).unwrap(), model);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "base_score": 0.1,
            "num_features": 2,
            "trees": [
                {"nodes": [
                    {"kind": "split", "feature": 1, "threshold": 0.3,
                     "yes": 1, "no": 2, "cover": 3.0},
                    {"kind": "leaf", "value": -0.2, "cover": 2.0},
                    {"kind": "leaf", "value": 0.6, "cover": 1.0}
                ]}
            ]
        }"#;
        let model = TreeEnsemble::from_json(json).unwrap();
        let vector = FeatureVector::from_entries(2, vec![(1, 0.7)]).unwrap();
        assert!((model.margin(&vector).unwrap() - 0.7).abs() < 1e-12);
    }
}
