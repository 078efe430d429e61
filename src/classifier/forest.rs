//! Random forest of weighted CART trees (gini impurity).

use super::{balanced_class_weights, check_dimension};
use crate::error::ArtifactError;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means `sqrt(d)`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        p_fire: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Nodes are stored flat; index 0 is the root and children always follow
/// their parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        let mut at = 0;
        // Each step moves strictly forward, so the walk is bounded by the node count.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(at) {
                Some(TreeNode::Leaf { p_fire }) => return Ok(*p_fire),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features
                        .get(*feature)
                        .copied()
                        .ok_or(ArtifactError::Malformed("split feature out of range"))?;
                    at = if value <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }
        Err(ArtifactError::Malformed("tree walk left the node table"))
    }

    fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        if self.nodes.is_empty() {
            return Err(ArtifactError::Malformed("empty tree"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { p_fire } => {
                    if !(0.0..=1.0).contains(p_fire) {
                        return Err(ArtifactError::Malformed("leaf probability outside [0, 1]"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(ArtifactError::DimensionMismatch {
                            expected: n_features,
                            actual: feature + 1,
                        });
                    }
                    let in_order = |child: usize| child > i && child < self.nodes.len();
                    if !threshold.is_finite() || !in_order(*left) || !in_order(*right) {
                        return Err(ArtifactError::Malformed("split node is inconsistent"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForestModel {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let class_weight = balanced_class_weights(y);
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features.max(1));

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    class_weight,
                    params,
                    max_features,
                    n_features,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(sample, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Self { n_features, trees }
    }

    /// Mean of the per-tree leaf probabilities.
    pub fn probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        check_dimension(self.n_features, features)?;
        if self.trees.is_empty() {
            return Err(ArtifactError::Malformed("forest has no trees"));
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.probability(features)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        if self.n_features != n_features {
            return Err(ArtifactError::DimensionMismatch {
                expected: n_features,
                actual: self.n_features,
            });
        }
        if self.trees.is_empty() {
            return Err(ArtifactError::Malformed("forest has no trees"));
        }
        self.trees.iter().try_for_each(|tree| tree.validate(n_features))
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    class_weight: [f64; 2],
    params: &'a ForestParams,
    max_features: usize,
    n_features: usize,
    rng: ChaCha8Rng,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

#[inline]
fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}

impl TreeBuilder<'_> {
    /// Grows the subtree for `sample` and returns the index of its root node.
    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> usize {
        let (w0, w1) = self.class_mass(&sample);
        let node_idx = self.nodes.len();
        let p_fire = if w0 + w1 > 0.0 { w1 / (w0 + w1) } else { 0.0 };
        self.nodes.push(TreeNode::Leaf { p_fire });

        let pure = w0 == 0.0 || w1 == 0.0;
        if pure
            || depth >= self.params.max_depth
            || sample.len() < self.params.min_samples_split.max(2)
        {
            return node_idx;
        }

        let Some(split) = self.best_split(&sample, gini(w0, w1) * (w0 + w1)) else {
            return node_idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        let left_idx = self.grow(left, depth + 1);
        let right_idx = self.grow(right, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        node_idx
    }

    fn class_mass(&self, sample: &[usize]) -> (f64, f64) {
        sample.iter().fold((0.0, 0.0), |(w0, w1), &i| {
            let label = self.y[i];
            let w = self.class_weight[label as usize];
            if label == 1 {
                (w0, w1 + w)
            } else {
                (w0 + w, w1)
            }
        })
    }

    fn best_split(&mut self, sample: &[usize], parent_impurity: f64) -> Option<BestSplit> {
        let candidates = index::sample(&mut self.rng, self.n_features, self.max_features);
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;
        let mut column: Vec<(f64, u8)> = Vec::with_capacity(sample.len());

        for feature in candidates.iter() {
            column.clear();
            column.extend(sample.iter().map(|&i| (self.x[i][feature], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (total0, total1) = column.iter().fold((0.0, 0.0), |(w0, w1), (_, label)| {
                let w = self.class_weight[*label as usize];
                if *label == 1 {
                    (w0, w1 + w)
                } else {
                    (w0 + w, w1)
                }
            });

            let (mut left0, mut left1) = (0.0, 0.0);
            for split_at in 1..column.len() {
                let (value, label) = column[split_at - 1];
                let w = self.class_weight[label as usize];
                if label == 1 {
                    left1 += w;
                } else {
                    left0 += w;
                }
                let next = column[split_at].0;
                if next <= value || split_at < min_leaf || column.len() - split_at < min_leaf {
                    continue;
                }
                let (right0, right1) = (total0 - left0, total1 - left1);
                let impurity =
                    gini(left0, left1) * (left0 + left1) + gini(right0, right1) * (right0 + right1);
                if impurity + 1e-12 < parent_impurity
                    && best.as_ref().map_or(true, |b| impurity < b.impurity)
                {
                    best = Some(BestSplit {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let x: Vec<Vec<f64>> = (0..300)
            .map(|i| vec![(i % 7) as f64, i as f64, ((i * 13) % 11) as f64])
            .collect();
        let y = (0..300).map(|i| u8::from(i < 100)).collect();
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            max_features: Some(3),
            ..ForestParams::default()
        }
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = threshold_data();
        let forest = ForestModel::fit(&x, &y, &small_params());
        assert_eq!(forest.trees.len(), 15);
        assert!(forest.probability(&[3.0, 20.0, 4.0]).unwrap() > 0.5);
        assert!(forest.probability(&[3.0, 250.0, 4.0]).unwrap() < 0.5);
        assert!(forest.validate(3).is_ok());
    }

    #[test]
    fn same_seed_builds_same_forest() {
        let (x, y) = threshold_data();
        let a = ForestModel::fit(&x, &y, &small_params());
        let b = ForestModel::fit(&x, &y, &small_params());
        for (ta, tb) in a.trees.iter().zip(&b.trees) {
            assert_eq!(ta.nodes, tb.nodes);
        }
    }

    #[test]
    fn backwards_child_index_is_rejected() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf { p_fire: 1.0 },
            ],
        };
        let forest = ForestModel {
            n_features: 1,
            trees: vec![tree],
        };
        assert!(matches!(forest.validate(1), Err(ArtifactError::Malformed(_))));
    }
}
