//! Cross-validation splitters

use crate::data::strata;
use crate::error::{ExplainError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains label proportions)
    StratifiedKFold { n_splits: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 10 }
    }
}

/// A single train/validation split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Build splits from a fold assignment: fold `f` validates on the rows
/// assigned to `f` and trains on all the others.
fn splits_from_assignment(assignment: &[usize], n_splits: usize) -> Vec<CVSplit> {
    (0..n_splits)
        .map(|fold_idx| {
            let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                (0..assignment.len()).partition(|&i| assignment[i] == fold_idx);
            CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            }
        })
        .collect()
}

fn seeded_rng(random_state: Option<u64>) -> ChaCha8Rng {
    match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Stratified k-fold assignment.
///
/// Rows of each label are shuffled, then dealt round-robin over the folds.
/// The dealing position carries over from one label to the next, so fold
/// sizes differ by at most one overall.
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate the k splits for `labels`.
    ///
    /// Fails when any label has fewer rows than folds; the fold count is
    /// never reduced to make the data fit.
    pub fn split(&self, labels: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(ExplainError::invalid_parameter(
                "n_splits",
                k,
                "must be at least 2",
            ));
        }

        let groups = strata(labels);
        for (label, rows) in &groups {
            if rows.len() < k {
                return Err(ExplainError::Stratification {
                    label: label.to_string(),
                    stratum_size: rows.len(),
                    required: k,
                });
            }
        }

        let mut rng = seeded_rng(self.random_state);
        let mut assignment = vec![0usize; labels.len()];
        let mut offset = 0;
        for (_, mut rows) in groups {
            rows.shuffle(&mut rng);
            for (i, &row) in rows.iter().enumerate() {
                assignment[row] = (offset + i) % k;
            }
            offset = (offset + rows.len()) % k;
        }

        let splits = splits_from_assignment(&assignment, k);
        debug!(
            n_splits = k,
            n_rows = labels.len(),
            min_fold = splits.iter().map(|s| s.test_indices.len()).min().unwrap_or(0),
            "Stratified folds assigned"
        );
        Ok(splits)
    }
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Generate train/validation splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle)
            }
            CVStrategy::StratifiedKFold { n_splits } => {
                let y = y.ok_or_else(|| {
                    ExplainError::ValidationError(
                        "StratifiedKFold requires target array".to_string(),
                    )
                })?;
                if y.len() != n_samples {
                    return Err(ExplainError::ShapeError {
                        expected: format!("y length = {}", n_samples),
                        actual: format!("y length = {}", y.len()),
                    });
                }
                let mut kfold = StratifiedKFold::new(*n_splits);
                kfold.random_state = self.random_state;
                kfold.split(y)
            }
        }
    }

    fn k_fold_split(
        &self,
        n_samples: usize,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        if n_splits < 2 {
            return Err(ExplainError::invalid_parameter(
                "n_splits",
                n_splits,
                "must be at least 2",
            ));
        }
        if n_samples < n_splits {
            return Err(ExplainError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut seeded_rng(self.random_state));
        }

        // The first n_samples % n_splits folds take one extra row
        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut assignment = vec![0usize; n_samples];
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            for &row in &indices[current..current + fold_size] {
                assignment[row] = fold_idx;
            }
            current += fold_size;
        }

        Ok(splits_from_assignment(&assignment, n_splits))
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: f64::NAN,
                std_score: f64::NAN,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance =
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}
