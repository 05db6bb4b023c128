//! Break-down attribution for a single observation
//!
//! Features of the observation are fixed into the reference table one at a
//! time; each step's contribution is the shift in mean prediction it causes.
//! The contributions telescope from the baseline to the observation's own
//! prediction. For models with interactions the contribution of a feature
//! depends on the order in which it is introduced.

use super::explainer::Explainer;
use crate::error::{ExplainError, Result};
use crate::training::ProbabilisticClassifier;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default tolerance for `baseline + contributions == prediction`
pub const ADDITIVITY_TOLERANCE: f64 = 1e-6;

/// One fixed feature in a break-down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakDownStep {
    pub feature: String,
    pub feature_index: usize,
    /// The observation's value, rendered with the feature's levels
    pub value: String,
    /// Shift in mean prediction caused by fixing this feature
    pub contribution: f64,
    /// Mean prediction after this step
    pub cumulative: f64,
}

/// Ordered attribution of one prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakDown {
    /// Explainer label
    pub label: String,
    /// Mean prediction over the reference table
    pub intercept: f64,
    /// Steps in the order features were fixed
    pub steps: Vec<BreakDownStep>,
    /// Model prediction for the observation
    pub prediction: f64,
}

impl BreakDown {
    pub fn sum_contributions(&self) -> f64 {
        self.steps.iter().map(|s| s.contribution).sum()
    }

    /// Contribution of a feature by name
    pub fn contribution_of(&self, feature: &str) -> Option<f64> {
        self.steps
            .iter()
            .find(|s| s.feature == feature)
            .map(|s| s.contribution)
    }

    /// Feature order used
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.feature.as_str()).collect()
    }
}

/// Fix observation values into `data` following `order`, returning the
/// contribution of each step and the mean prediction after it.
pub(crate) fn walk_order<M: ProbabilisticClassifier>(
    explainer: &Explainer<M>,
    observation: &Array1<f64>,
    order: &[usize],
) -> Result<Vec<(f64, f64)>> {
    let mut current: Array2<f64> = explainer.data().clone();
    let mut previous = explainer.baseline();
    let mut steps = Vec::with_capacity(order.len());

    for &j in order {
        current.column_mut(j).fill(observation[j]);
        let mean = explainer.mean_prediction(&current)?;
        steps.push((mean - previous, mean));
        previous = mean;
    }
    Ok(steps)
}

/// Check that the attribution reproduces the prediction
pub(crate) fn check_additivity(
    intercept: f64,
    contributions: f64,
    prediction: f64,
    tolerance: f64,
) -> Result<()> {
    let reconstructed = intercept + contributions;
    if (reconstructed - prediction).abs() > tolerance || !reconstructed.is_finite() {
        return Err(ExplainError::InconsistentAttribution {
            reconstructed,
            prediction,
            tolerance,
        });
    }
    Ok(())
}

/// Break-down explainer
#[derive(Debug, Clone)]
pub struct BreakDownExplainer {
    order: Option<Vec<String>>,
    tolerance: f64,
}

impl Default for BreakDownExplainer {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakDownExplainer {
    pub fn new() -> Self {
        Self {
            order: None,
            tolerance: ADDITIVITY_TOLERANCE,
        }
    }

    /// Use an explicit feature order instead of the greedy one.
    ///
    /// Must name every feature exactly once.
    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = Some(order);
        self
    }

    /// Set the additivity tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Attribute the prediction for `observation`
    pub fn explain<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        observation: &Array1<f64>,
    ) -> Result<BreakDown> {
        explainer.check_observation(observation)?;

        let order = match &self.order {
            Some(names) => self.resolve_order(explainer, names)?,
            None => greedy_order(explainer, observation)?,
        };

        let walked = walk_order(explainer, observation, &order)?;
        let prediction = explainer.predict_one(observation)?;
        let schema = explainer.schema();

        let steps: Vec<BreakDownStep> = order
            .iter()
            .zip(walked)
            .map(|(&j, (contribution, cumulative))| BreakDownStep {
                feature: schema[j].name.clone(),
                feature_index: j,
                value: schema[j].format_value(observation[j]),
                contribution,
                cumulative,
            })
            .collect();

        let result = BreakDown {
            label: explainer.label().to_string(),
            intercept: explainer.baseline(),
            steps,
            prediction,
        };
        check_additivity(
            result.intercept,
            result.sum_contributions(),
            result.prediction,
            self.tolerance,
        )?;

        debug!(
            prediction,
            intercept = result.intercept,
            order = ?result.order(),
            "Break-down computed"
        );
        Ok(result)
    }

    fn resolve_order<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        names: &[String],
    ) -> Result<Vec<usize>> {
        let order = names
            .iter()
            .map(|name| explainer.feature_index(name))
            .collect::<Result<Vec<usize>>>()?;

        let mut seen = vec![false; explainer.n_features()];
        for &j in &order {
            if seen[j] {
                return Err(ExplainError::invalid_parameter(
                    "order",
                    &explainer.schema()[j].name,
                    "feature listed twice",
                ));
            }
            seen[j] = true;
        }
        if order.len() != explainer.n_features() {
            return Err(ExplainError::invalid_parameter(
                "order",
                order.len(),
                format!("must list all {} features", explainer.n_features()),
            ));
        }
        Ok(order)
    }
}

/// Features sorted by the size of their single-feature effect, largest
/// first; ties keep column order.
fn greedy_order<M: ProbabilisticClassifier>(
    explainer: &Explainer<M>,
    observation: &Array1<f64>,
) -> Result<Vec<usize>> {
    let baseline = explainer.baseline();
    let effects = (0..explainer.n_features())
        .map(|j| -> Result<(usize, f64)> {
            let mut modified = explainer.data().clone();
            modified.column_mut(j).fill(observation[j]);
            Ok((j, (explainer.mean_prediction(&modified)? - baseline).abs()))
        })
        .collect::<Result<Vec<(usize, f64)>>>()?;

    let mut sorted = effects;
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(sorted.into_iter().map(|(j, _)| j).collect())
}
