//! Binary probability tree used as the forest's base learner

use crate::error::{ExplainError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the positive-class fraction of its samples
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Entropy
    Entropy,
}

impl Criterion {
    /// Impurity of a node with `n_pos` positives out of `count`
    fn impurity(self, count: usize, n_pos: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let p = n_pos as f64 / count as f64;
        let q = 1.0 - p;
        match self {
            Criterion::Gini => 1.0 - p * p - q * q,
            Criterion::Entropy => {
                let term = |v: f64| if v > 0.0 { -v * v.ln() } else { 0.0 };
                term(p) + term(q)
            }
        }
    }
}

/// Decision tree classifier with probability leaves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at random at every split (all when `None`)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    /// Create a new tree
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set number of candidate features per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree on every row of `x`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        self.fit_rows(x, y, &rows, &mut rng)
    }

    /// Fit the tree on a (possibly repeated) selection of rows
    pub(crate) fn fit_rows(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if rows.is_empty() {
            return Err(ExplainError::TrainingError(
                "cannot fit a tree on zero rows".to_string(),
            ));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(ExplainError::TrainingError(
                "labels must be encoded as 0/1".to_string(),
            ));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        self.root = Some(self.build_tree(x, y, rows.to_vec(), 0, &mut importances, rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = rows.len();
        let n_pos = rows.iter().filter(|&&i| y[i] > 0.5).count();
        let leaf = TreeNode::Leaf {
            value: n_pos as f64 / n_samples as f64,
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || n_pos == 0
            || n_pos == n_samples;
        if should_stop {
            return leaf;
        }

        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, y, &rows, n_pos, rng)
        else {
            return leaf;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, left_rows, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, right_rows, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity: self.criterion.impurity(n_samples, n_pos),
        }
    }

    /// Best (feature, threshold, impurity decrease) among a random feature subset
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        n_pos: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, f64)> {
        let n_features = x.ncols();
        let n_try = self.max_features.unwrap_or(n_features).min(n_features);
        let n = rows.len();
        let parent_impurity = self.criterion.impurity(n, n_pos);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut pairs: Vec<(f64, bool)> = Vec::with_capacity(n);

        for feature_idx in index::sample(rng, n_features, n_try).into_iter() {
            pairs.clear();
            pairs.extend(rows.iter().map(|&i| (x[[i, feature_idx]], y[i] > 0.5)));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            // Sweep thresholds between consecutive distinct values
            let mut left_pos = 0usize;
            for split in 1..n {
                if pairs[split - 1].1 {
                    left_pos += 1;
                }
                if pairs[split - 1].0 == pairs[split].0 {
                    continue;
                }
                let left_count = split;
                let right_count = n - split;
                if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                    continue;
                }

                let weighted = (left_count as f64 * self.criterion.impurity(left_count, left_pos)
                    + right_count as f64
                        * self.criterion.impurity(right_count, n_pos - left_pos))
                    / n as f64;
                let gain = parent_impurity - weighted;

                if gain > best.map_or(1e-12, |b| b.2) {
                    let threshold = (pairs[split - 1].0 + pairs[split].0) / 2.0;
                    best = Some((feature_idx, threshold, gain));
                }
            }
        }

        best
    }

    /// Positive-class probability for every row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ExplainError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(ExplainError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| Self::predict_sample(root, &row))
            .collect())
    }

    /// Hard 0/1 predictions at the 0.5 threshold
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    fn predict_sample(node: &TreeNode, sample: &ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, Self::node_depth)
    }

    fn node_depth(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                1 + Self::node_depth(left).max(Self::node_depth(right))
            }
        }
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, Self::count_leaves)
    }

    fn count_leaves(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                Self::count_leaves(left) + Self::count_leaves(right)
            }
        }
    }

    /// Smallest leaf size
    pub fn min_leaf_size(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { n_samples, .. } => *n_samples,
                TreeNode::Split { left, right, .. } => walk(left).min(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separable_data() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 4.0], [3.0, 1.0], [4.0, 2.0], [5.0, 0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba, y);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_leaf_probabilities() {
        let x = array![[0.0], [0.0], [0.0], [0.0], [1.0], [1.0]];
        let y = array![1.0, 0.0, 0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&array![[0.0], [1.0]]).unwrap();
        assert!((proba[0] - 0.25).abs() < 1e-12);
        assert!((proba[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..40).map(|i| (i % 2) as f64));

        let mut tree = DecisionTree::new().with_min_samples_leaf(7);
        tree.fit(&x, &y).unwrap();
        assert!(tree.min_leaf_size() >= 7);
    }

    #[test]
    fn test_max_depth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..32).map(|i| ((i / 3) % 2) as f64));

        let mut tree = DecisionTree::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_unfitted_and_shape_errors() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict_proba(&array![[1.0]]),
            Err(ExplainError::ModelNotFitted)
        ));

        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]).unwrap();
        assert!(tree.predict_proba(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let mut tree = DecisionTree::new();
        let result = tree.fit(&array![[0.0], [1.0]], &array![0.0, 2.0]);
        assert!(result.is_err());
    }
}
