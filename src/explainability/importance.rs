//! Permutation feature importance
//!
//! The loss of the model is measured on the reference table, then again with
//! a single feature's column shuffled. Columns are shuffled one at a time,
//! so effects shared between interacting features are not separated.

use super::explainer::Explainer;
use crate::error::{ExplainError, Result};
use crate::training::metrics;
use crate::training::ProbabilisticClassifier;
use ndarray::{Array1, Axis};
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Row name for the unpermuted model's loss
pub const FULL_MODEL: &str = "_full_model_";
/// Row name for the loss with labels shuffled against predictions
pub const BASELINE: &str = "_baseline_";

/// Loss measured before and after shuffling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossFunction {
    /// 1 - ROC AUC
    #[default]
    OneMinusAuc,
    /// Binary cross-entropy
    CrossEntropy,
    /// Root mean squared error of the probabilities
    Rmse,
    /// 1 - accuracy at the 0.5 threshold
    OneMinusAccuracy,
}

impl LossFunction {
    pub fn loss(&self, y_true: &Array1<f64>, y_prob: &Array1<f64>) -> f64 {
        match self {
            LossFunction::OneMinusAuc => 1.0 - metrics::roc_auc(y_true, y_prob),
            LossFunction::CrossEntropy => metrics::log_loss(y_true, y_prob),
            LossFunction::Rmse => metrics::rmse(y_true, y_prob),
            LossFunction::OneMinusAccuracy => 1.0 - metrics::accuracy(y_true, y_prob, 0.5),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossFunction::OneMinusAuc => "one_minus_auc",
            LossFunction::CrossEntropy => "cross_entropy",
            LossFunction::Rmse => "rmse",
            LossFunction::OneMinusAccuracy => "one_minus_accuracy",
        }
    }
}

/// How the dropout loss is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportanceType {
    /// The loss after shuffling
    #[default]
    Raw,
    /// Loss after shuffling minus the full model's loss
    Difference,
    /// Loss after shuffling divided by the full model's loss
    Ratio,
}

impl ImportanceType {
    fn apply(&self, loss: f64, full_model_loss: f64) -> f64 {
        match self {
            ImportanceType::Raw => loss,
            ImportanceType::Difference => loss - full_model_loss,
            ImportanceType::Ratio => {
                if full_model_loss == 0.0 {
                    if loss == 0.0 {
                        1.0
                    } else {
                        f64::INFINITY
                    }
                } else {
                    loss / full_model_loss
                }
            }
        }
    }
}

/// Importance of one variable across repetitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceRow {
    pub variable: String,
    pub mean: f64,
    /// Sample standard deviation across repetitions
    pub std: f64,
    /// Value per repetition
    pub values: Vec<f64>,
}

impl ImportanceRow {
    fn new(variable: impl Into<String>, values: Vec<f64>) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Self {
            variable: variable.into(),
            mean,
            std,
            values,
        }
    }
}

/// Result of permutation importance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub label: String,
    pub loss_function: LossFunction,
    pub importance_type: ImportanceType,
    pub n_repeats: usize,
    pub n_sample: Option<usize>,
    pub full_model: ImportanceRow,
    /// Features in column order
    pub features: Vec<ImportanceRow>,
    pub baseline: ImportanceRow,
}

impl FeatureImportance {
    /// Features by descending mean importance
    pub fn sorted(&self) -> Vec<&ImportanceRow> {
        let mut sorted: Vec<&ImportanceRow> = self.features.iter().collect();
        sorted.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    pub fn feature(&self, name: &str) -> Option<&ImportanceRow> {
        self.features.iter().find(|r| r.variable == name)
    }

    /// Top k features by mean importance
    pub fn top_k(&self, k: usize) -> Vec<(&str, f64)> {
        self.sorted()
            .into_iter()
            .take(k)
            .map(|r| (r.variable.as_str(), r.mean))
            .collect()
    }

    /// `_full_model_`, every feature, then `_baseline_`
    pub fn rows(&self) -> Vec<&ImportanceRow> {
        std::iter::once(&self.full_model)
            .chain(&self.features)
            .chain(std::iter::once(&self.baseline))
            .collect()
    }
}

/// Permutation importance calculator
#[derive(Debug, Clone)]
pub struct PermutationImportance {
    n_repeats: usize,
    seed: u64,
    loss: LossFunction,
    importance_type: ImportanceType,
    n_sample: Option<usize>,
}

impl Default for PermutationImportance {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw losses of one repetition
struct Repetition {
    full_model: f64,
    features: Vec<f64>,
    baseline: f64,
}

impl PermutationImportance {
    /// Ten repetitions of 1 - AUC on the full reference table, seed 42
    pub fn new() -> Self {
        Self {
            n_repeats: 10,
            seed: 42,
            loss: LossFunction::OneMinusAuc,
            importance_type: ImportanceType::Raw,
            n_sample: None,
        }
    }

    /// Set number of permutation repeats
    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_type(mut self, importance_type: ImportanceType) -> Self {
        self.importance_type = importance_type;
        self
    }

    /// Evaluate each repetition on a random subset of this many rows
    pub fn with_n_sample(mut self, n_sample: Option<usize>) -> Self {
        self.n_sample = n_sample;
        self
    }

    /// Compute the importance of every feature of the explainer
    pub fn compute<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
    ) -> Result<FeatureImportance> {
        if self.n_repeats == 0 {
            return Err(ExplainError::invalid_parameter(
                "n_repeats",
                0,
                "must be at least 1",
            ));
        }
        if self.n_sample == Some(0) {
            return Err(ExplainError::invalid_parameter(
                "n_sample",
                0,
                "must be at least 1",
            ));
        }

        let start = Instant::now();
        let repetitions = (0..self.n_repeats)
            .into_par_iter()
            .map(|rep| self.repetition(explainer, rep))
            .collect::<Result<Vec<_>>>()?;

        let ty = self.importance_type;
        let full: Vec<f64> = repetitions.iter().map(|r| r.full_model).collect();
        let transformed = |values: Vec<f64>| -> Vec<f64> {
            values
                .into_iter()
                .zip(&full)
                .map(|(loss, &f)| ty.apply(loss, f))
                .collect()
        };

        let features = explainer
            .feature_names()
            .into_iter()
            .enumerate()
            .map(|(j, name)| {
                let raw = repetitions.iter().map(|r| r.features[j]).collect();
                ImportanceRow::new(name, transformed(raw))
            })
            .collect();
        let baseline = ImportanceRow::new(
            BASELINE,
            transformed(repetitions.iter().map(|r| r.baseline).collect()),
        );
        let full_model = ImportanceRow::new(FULL_MODEL, transformed(full.clone()));

        let result = FeatureImportance {
            label: explainer.label().to_string(),
            loss_function: self.loss,
            importance_type: ty,
            n_repeats: self.n_repeats,
            n_sample: self.n_sample,
            full_model,
            features,
            baseline,
        };

        info!(
            loss = self.loss.name(),
            n_repeats = self.n_repeats,
            full_model = result.full_model.mean,
            top = ?result.top_k(3),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Permutation importance computed"
        );
        Ok(result)
    }

    fn repetition<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        rep: usize,
    ) -> Result<Repetition> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(rep as u64);

        let n_rows = explainer.data().nrows();
        let (x, y, predictions) = match self.n_sample {
            Some(m) if m < n_rows => {
                let mut rows = index::sample(&mut rng, n_rows, m).into_vec();
                rows.sort_unstable();
                let x = explainer.data().select(Axis(0), &rows);
                let y = explainer.y().select(Axis(0), &rows);
                let predictions = explainer.predict(&x)?;
                (x, y, predictions)
            }
            _ => (
                explainer.data().clone(),
                explainer.y().clone(),
                explainer.reference_predictions().clone(),
            ),
        };

        let full_model = self.loss.loss(&y, &predictions);

        let mut features = Vec::with_capacity(x.ncols());
        for j in 0..x.ncols() {
            let mut column: Vec<f64> = x.column(j).to_vec();
            column.shuffle(&mut rng);
            let mut permuted = x.clone();
            permuted.column_mut(j).assign(&Array1::from_vec(column));
            features.push(self.loss.loss(&y, &explainer.predict(&permuted)?));
        }

        let mut shuffled: Vec<f64> = y.to_vec();
        shuffled.shuffle(&mut rng);
        let baseline = self.loss.loss(&Array1::from_vec(shuffled), &predictions);

        Ok(Repetition {
            full_model,
            features,
            baseline,
        })
    }
}
