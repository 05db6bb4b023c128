//! Random forest probability classifier

use super::decision_tree::{Criterion, DecisionTree};
use super::metrics::roc_auc;
use super::models::ProbabilisticClassifier;
use crate::error::{ExplainError, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The two tuned forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of features drawn at random at every split
    pub mtry: usize,
    /// Minimum number of samples in a leaf
    pub min_n: usize,
}

impl ForestParams {
    pub fn new(mtry: usize, min_n: usize) -> Self {
        Self { mtry, min_n }
    }

    /// Check the parameters against the feature count
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.mtry == 0 || self.mtry > n_features {
            return Err(ExplainError::invalid_parameter(
                "mtry",
                self.mtry,
                format!("must be in [1, {}]", n_features),
            ));
        }
        if self.min_n == 0 {
            return Err(ExplainError::invalid_parameter(
                "min_n",
                self.min_n,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ForestParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mtry={}, min_n={}", self.mtry, self.min_n)
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Out-of-bag score
    pub oob_score: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Computed OOB AUC
    oob_score_value: Option<f64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(500)
    }
}

impl RandomForest {
    /// Create a new forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            oob_score: false,
            criterion: Criterion::Gini,
            random_state: None,
            oob_score_value: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set the tuned hyperparameters
    pub fn with_params(mut self, params: ForestParams) -> Self {
        self.max_features = MaxFeatures::Fixed(params.mtry);
        self.min_samples_leaf = params.min_n.max(1);
        self
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
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set impurity criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Enable or disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Enable OOB score computation
    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(ExplainError::TrainingError(
                "cannot fit a forest on an empty table".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(ExplainError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }

        self.n_features = n_features;
        let max_features = self.compute_max_features(n_features);
        let base_seed = self.random_state.unwrap_or(42);

        // Build trees in parallel, each with its own stream
        let fitted: Vec<(DecisionTree, Vec<bool>)> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<(DecisionTree, Vec<bool>)> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
                rng.set_stream(tree_idx as u64);

                let sample: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut in_bag = vec![false; n_samples];
                for &i in &sample {
                    in_bag[i] = true;
                }

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_criterion(self.criterion);
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit_rows(x, y, &sample, &mut rng)?;
                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, in_bag): (Vec<DecisionTree>, Vec<Vec<bool>>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.compute_feature_importances();

        self.oob_score_value = if self.oob_score && self.bootstrap {
            self.compute_oob_auc(x, y, &in_bag)?
        } else {
            None
        };

        debug!(
            n_trees = self.trees.len(),
            max_features,
            min_samples_leaf = self.min_samples_leaf,
            oob_auc = ?self.oob_score_value,
            "Random forest fitted"
        );

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    if i < self.n_features {
                        total_importances[i] += val;
                    }
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// AUC of out-of-bag probabilities over rows that were out of bag at least once
    fn compute_oob_auc(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        in_bag: &[Vec<bool>],
    ) -> Result<Option<f64>> {
        let n_samples = x.nrows();
        let mut sums = vec![0.0; n_samples];
        let mut counts = vec![0usize; n_samples];

        for (tree, bag) in self.trees.iter().zip(in_bag) {
            let proba = tree.predict_proba(x)?;
            for i in (0..n_samples).filter(|&i| !bag[i]) {
                sums[i] += proba[i];
                counts[i] += 1;
            }
        }

        let (scores, labels): (Vec<f64>, Vec<f64>) = (0..n_samples)
            .filter(|&i| counts[i] > 0)
            .map(|i| (sums[i] / counts[i] as f64, y[i]))
            .unzip();

        if scores.is_empty() {
            return Ok(None);
        }
        Ok(Some(roc_auc(
            &Array1::from_vec(labels),
            &Array1::from_vec(scores),
        )))
    }

    /// Positive-class probability: mean of the trees' leaf fractions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ExplainError::ModelNotFitted);
        }

        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array1::zeros(x.nrows());
        for p in &per_tree {
            proba += p;
        }
        proba /= per_tree.len() as f64;
        Ok(proba)
    }

    /// Hard 0/1 predictions at the 0.5 threshold
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get OOB AUC
    pub fn oob_score_value(&self) -> Option<f64> {
        self.oob_score_value
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of features seen during fit
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict_proba(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| {
            let base = if i < 30 { 0.0 } else { 2.0 };
            base + ((i * 7 + j * 13) % 10) as f64 / 10.0
        });
        let y = Array1::from_iter((0..60).map(|i| if i < 30 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(25).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let accuracy = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| (*p - *a).abs() < 0.5)
            .count() as f64
            / y.len() as f64;

        assert!(accuracy >= 0.95, "Accuracy too low: {}", accuracy);
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(10)
            .with_params(ForestParams::new(2, 5))
            .with_random_state(1);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 60);
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_deterministic_with_seed() {
        let (x, y) = blobs();
        let mut a = RandomForest::new(15).with_random_state(7);
        let mut b = RandomForest::new(15).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_oob_score() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(30)
            .with_random_state(3)
            .with_oob_score(true);
        rf.fit(&x, &y).unwrap();
        let oob = rf.oob_score_value().unwrap();
        assert!(oob > 0.9, "OOB AUC too low: {}", oob);
    }

    #[test]
    fn test_feature_importances() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { 1.0 });
        let y = Array1::from_iter((0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }));

        let mut rf = RandomForest::new(10)
            .with_max_features(MaxFeatures::All)
            .with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_params_validation() {
        assert!(ForestParams::new(0, 5).validate(7).is_err());
        assert!(ForestParams::new(8, 5).validate(7).is_err());
        assert!(ForestParams::new(3, 0).validate(7).is_err());
        assert!(ForestParams::new(7, 40).validate(7).is_ok());
    }

    #[test]
    fn test_unfitted() {
        let rf = RandomForest::new(5);
        assert!(matches!(
            rf.predict_proba(&array![[1.0]]),
            Err(ExplainError::ModelNotFitted)
        ));
    }
}
