//! Attribution Engine: which features pushed the lexical verdict.
//!
//! Contributions come from an additive attribution method over the lexical
//! tree ensemble only. The semantic model is not explained here, so an
//! explanation can disagree with a fused verdict that the semantic path
//! swung.
//!
//! Ranking rules:
//! 1. Contributions exactly equal to zero are dropped
//! 2. Positive list: values > 0, descending, at most `top_n`
//! 3. Negative list: values < 0, ascending, at most `top_n`
//! 4. Equal values are ordered by feature name ascending

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::encoder::{FeatureEncoder, FeatureVector};
use crate::lexical::{Tree, TreeEnsemble, TreeNode};
use crate::types::{Contribution, Explanation, ReviewText};
use crate::{Artifact, Result, ScoringError};

/// Capability: per-feature signed contributions for a vector.
///
/// Values are in the model's margin space for the genuine class; features
/// not returned contribute zero.
pub trait FeatureAttributor: Send + Sync {
    fn attribute(&self, vector: &FeatureVector) -> Result<Vec<(usize, f64)>>;
}

/// Exact path-dependent TreeSHAP over a `TreeEnsemble`.
///
/// Local accuracy holds: `expected_value() + Σ φ == margin(x)`.
pub struct TreeShap {
    model: Arc<TreeEnsemble>,
}

impl TreeShap {
    pub fn new(model: Arc<TreeEnsemble>) -> Self {
        Self { model }
    }

    /// Margin predicted with no feature information.
    pub fn expected_value(&self) -> f64 {
        self.model.expected_margin()
    }

    /// SHAP value per feature index.
    pub fn shap_values(&self, vector: &FeatureVector) -> Result<BTreeMap<usize, f64>> {
        // Same dimension check as prediction.
        self.model.margin(vector)?;

        let mut phi = BTreeMap::new();
        for tree in self.model.trees() {
            tree_shap(tree, vector, &mut phi, 0, Vec::new(), 1.0, 1.0, None);
        }
        Ok(phi)
    }
}

impl FeatureAttributor for TreeShap {
    fn attribute(&self, vector: &FeatureVector) -> Result<Vec<(usize, f64)>> {
        Ok(self.shap_values(vector)?.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

#[allow(clippy::too_many_arguments)]
fn tree_shap(
    tree: &Tree,
    vector: &FeatureVector,
    phi: &mut BTreeMap<usize, f64>,
    node: usize,
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    match &tree.nodes()[node] {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let element = path[i];
                if let Some(f) = element.feature {
                    let w = unwound_path_sum(&path, i);
                    *phi.entry(f).or_insert(0.0) +=
                        w * (element.one_fraction - element.zero_fraction) * value;
                }
            }
        }
        TreeNode::Split {
            feature: split,
            threshold,
            yes,
            no,
            cover,
        } => {
            let (hot, cold) = if vector.get(*split) < *threshold {
                (*yes, *no)
            } else {
                (*no, *yes)
            };
            let hot_zero = tree.nodes()[hot].cover() / cover;
            let cold_zero = tree.nodes()[cold].cover() / cover;

            // A feature seen earlier on this path is folded back in rather
            // than counted twice.
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*split)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            tree_shap(
                tree,
                vector,
                phi,
                hot,
                path.clone(),
                hot_zero * incoming_zero,
                incoming_one,
                Some(*split),
            );
            tree_shap(
                tree,
                vector,
                phi,
                cold,
                path,
                cold_zero * incoming_zero,
                0.0,
                Some(*split),
            );
        }
    }
}

fn extend_path(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let d = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / d;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / d;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let d = (depth + 1) as f64;

    let mut next_one_portion = path[depth].weight;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let previous = path[i].weight;
            path[i].weight = next_one_portion * d / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                previous - path[i].weight * zero_fraction * (depth - i) as f64 / d;
        } else {
            path[i].weight = path[i].weight * d / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let d = (depth + 1) as f64;

    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * d / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero_fraction * (depth - i) as f64 / d;
        } else if zero_fraction != 0.0 {
            total += (path[i].weight / zero_fraction) / ((depth - i) as f64 / d);
        }
    }
    total
}

/// Rank named contributions into positive and negative lists.
pub fn rank_contributions(
    contributions: impl IntoIterator<Item = (String, f64)>,
    top_n: usize,
) -> Explanation {
    let mut nonzero: Vec<Contribution> = contributions
        .into_iter()
        .filter(|(_, value)| *value != 0.0)
        .map(|(feature, value)| Contribution::new(feature, value))
        .collect();

    let by_name = |a: &Contribution, b: &Contribution| a.feature.cmp(&b.feature);

    nonzero.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| by_name(a, b)));
    let positive: Vec<Contribution> = nonzero
        .iter()
        .filter(|c| c.value > 0.0)
        .take(top_n)
        .cloned()
        .collect();

    nonzero.sort_by(|a, b| a.value.total_cmp(&b.value).then_with(|| by_name(a, b)));
    let negative: Vec<Contribution> = nonzero
        .into_iter()
        .filter(|c| c.value < 0.0)
        .take(top_n)
        .collect();

    Explanation { positive, negative }
}

/// Encodes text and ranks its feature attributions.
#[derive(Clone, Default)]
pub struct AttributionEngine {
    encoder: Option<Arc<dyn FeatureEncoder>>,
    attributor: Option<Arc<dyn FeatureAttributor>>,
}

impl AttributionEngine {
    pub fn new(
        encoder: Option<Arc<dyn FeatureEncoder>>,
        attributor: Option<Arc<dyn FeatureAttributor>>,
    ) -> Self {
        Self {
            encoder,
            attributor,
        }
    }

    pub fn ensure_ready(&self) -> Result<()> {
        self.parts().map(|_| ())
    }

    fn parts(&self) -> Result<(&dyn FeatureEncoder, &dyn FeatureAttributor)> {
        let encoder = self
            .encoder
            .as_deref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::FeatureEncoder))?;
        let attributor = self
            .attributor
            .as_deref()
            .ok_or(ScoringError::ArtifactUnavailable(Artifact::Attributor))?;
        Ok((encoder, attributor))
    }

    /// Named, non-zero contributions for the review, unranked.
    pub fn contributions(&self, review: &ReviewText) -> Result<BTreeMap<String, f64>> {
        let (encoder, attributor) = self.parts()?;

        let vector = encoder.encode(review.as_str())?;
        let names = encoder.feature_names();

        let mut named = BTreeMap::new();
        for (index, value) in attributor.attribute(&vector)? {
            if !value.is_finite() {
                return Err(ScoringError::InferenceFailure(format!(
                    "attribution for feature {} is not finite",
                    index
                )));
            }
            if value == 0.0 {
                continue;
            }
            let name = names.get(index).ok_or_else(|| {
                ScoringError::InferenceFailure(format!(
                    "attribution for unknown feature index {}",
                    index
                ))
            })?;
            *named.entry(name.clone()).or_insert(0.0) += value;
        }

        Ok(named)
    }

    pub fn explain(&self, review: &ReviewText, top_n: usize) -> Result<Explanation> {
        let named = self.contributions(review)?;
        tracing::debug!(features = named.len(), top_n, "Ranking contributions");
        Ok(rank_contributions(named, top_n))
    }
}
