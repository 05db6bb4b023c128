//! SHAP-style attribution averaged over random feature orderings

use super::break_down::{check_additivity, walk_order, ADDITIVITY_TOLERANCE};
use super::explainer::Explainer;
use crate::error::{ExplainError, Result};
use crate::training::ProbabilisticClassifier;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Attribution of one feature across all sampled orderings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapFeature {
    pub feature: String,
    pub feature_index: usize,
    pub value: String,
    /// Mean contribution across orderings
    pub mean: f64,
    /// Sample standard deviation across orderings
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Contribution in each ordering, in path order
    pub contributions: Vec<f64>,
}

/// Averaged attribution of one prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapExplanation {
    pub label: String,
    pub intercept: f64,
    pub prediction: f64,
    /// Number of orderings sampled
    pub b: usize,
    /// Features in column order
    pub features: Vec<ShapFeature>,
}

impl ShapExplanation {
    pub fn sum_mean_contributions(&self) -> f64 {
        self.features.iter().map(|f| f.mean).sum()
    }

    pub fn feature(&self, name: &str) -> Option<&ShapFeature> {
        self.features.iter().find(|f| f.feature == name)
    }

    /// Features sorted by absolute mean contribution, descending
    pub fn sorted(&self) -> Vec<&ShapFeature> {
        let mut sorted: Vec<&ShapFeature> = self.features.iter().collect();
        sorted.sort_by(|a, b| {
            b.mean
                .abs()
                .partial_cmp(&a.mean.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    /// Mean contributions in column order
    pub fn mean_vector(&self) -> Array1<f64> {
        self.features.iter().map(|f| f.mean).collect()
    }
}

/// Per-feature aggregate over several explained observations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapSummaryFeature {
    pub feature: String,
    /// Mean absolute attribution
    pub mean_abs: f64,
    /// Mean signed attribution
    pub mean: f64,
}

/// Aggregate of [`ShapExplanation`]s, ranked by mean absolute attribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapSummary {
    pub n_observations: usize,
    pub features: Vec<ShapSummaryFeature>,
    pub explanations: Vec<ShapExplanation>,
}

impl ShapSummary {
    pub fn from_explanations(explanations: Vec<ShapExplanation>) -> Self {
        let n = explanations.len();
        let mut features: Vec<ShapSummaryFeature> = match explanations.first() {
            Some(first) => first
                .features
                .iter()
                .enumerate()
                .map(|(j, f)| {
                    let means = explanations.iter().map(|e| e.features[j].mean);
                    ShapSummaryFeature {
                        feature: f.feature.clone(),
                        mean_abs: means.clone().map(f64::abs).sum::<f64>() / n as f64,
                        mean: means.sum::<f64>() / n as f64,
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        features.sort_by(|a, b| {
            b.mean_abs
                .partial_cmp(&a.mean_abs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Self {
            n_observations: n,
            features,
            explanations,
        }
    }
}

/// Averages break-downs over `b` random orderings
#[derive(Debug, Clone)]
pub struct ShapExplainer {
    b: usize,
    seed: u64,
    tolerance: f64,
}

impl Default for ShapExplainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapExplainer {
    /// 25 orderings, seed 42
    pub fn new() -> Self {
        Self {
            b: 25,
            seed: 42,
            tolerance: ADDITIVITY_TOLERANCE,
        }
    }

    /// Set the number of orderings
    pub fn with_b(mut self, b: usize) -> Self {
        self.b = b;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the additivity tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Attribute the prediction for `observation`.
    ///
    /// Ordering `i` is drawn from its own generator seeded with
    /// `(seed, i)`, so the result does not depend on thread scheduling.
    pub fn explain<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        observation: &Array1<f64>,
    ) -> Result<ShapExplanation> {
        if self.b == 0 {
            return Err(ExplainError::invalid_parameter("b", 0, "must be at least 1"));
        }
        explainer.check_observation(observation)?;

        let start = Instant::now();
        let p = explainer.n_features();

        // paths[i][j] = contribution of feature j in ordering i
        let paths: Vec<Vec<f64>> = (0..self.b)
            .into_par_iter()
            .map(|i| -> Result<Vec<f64>> {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                rng.set_stream(i as u64);
                let mut order: Vec<usize> = (0..p).collect();
                order.shuffle(&mut rng);

                let walked = walk_order(explainer, observation, &order)?;
                let mut by_feature = vec![0.0; p];
                for (&j, (contribution, _)) in order.iter().zip(walked) {
                    by_feature[j] = contribution;
                }
                Ok(by_feature)
            })
            .collect::<Result<Vec<_>>>()?;

        let schema = explainer.schema();
        let features: Vec<ShapFeature> = (0..p)
            .map(|j| {
                let contributions: Vec<f64> = paths.iter().map(|path| path[j]).collect();
                let (mean, std) = mean_std(&contributions);
                ShapFeature {
                    feature: schema[j].name.clone(),
                    feature_index: j,
                    value: schema[j].format_value(observation[j]),
                    mean,
                    std,
                    min: contributions.iter().copied().fold(f64::INFINITY, f64::min),
                    max: contributions.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    contributions,
                }
            })
            .collect();

        let result = ShapExplanation {
            label: explainer.label().to_string(),
            intercept: explainer.baseline(),
            prediction: explainer.predict_one(observation)?,
            b: self.b,
            features,
        };
        check_additivity(
            result.intercept,
            result.sum_mean_contributions(),
            result.prediction,
            self.tolerance,
        )?;

        debug!(
            b = self.b,
            prediction = result.prediction,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SHAP attribution computed"
        );
        Ok(result)
    }

    /// Explain every row of `observations` and aggregate
    pub fn explain_many<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        observations: &Array2<f64>,
    ) -> Result<ShapSummary> {
        let explanations = observations
            .rows()
            .into_iter()
            .map(|row| self.explain(explainer, &row.to_owned()))
            .collect::<Result<Vec<_>>>()?;

        info!(n_observations = explanations.len(), b = self.b, "SHAP summary computed");
        Ok(ShapSummary::from_explanations(explanations))
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}
