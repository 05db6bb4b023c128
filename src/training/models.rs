//! The prediction capability shared by every explainable model

use super::metrics;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A fitted binary classifier that scores rows with a positive-class probability.
///
/// This is the one interface the explainers rely on; anything that can
/// produce probabilities for a feature matrix can be explained.
pub trait ProbabilisticClassifier: Send + Sync {
    /// Probability of the positive class for every row of `x`
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

impl<M: ProbabilisticClassifier + ?Sized> ProbabilisticClassifier for &M {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (**self).predict_proba(x)
    }
}

impl<M: ProbabilisticClassifier + ?Sized> ProbabilisticClassifier for Arc<M> {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (**self).predict_proba(x)
    }
}

impl<M: ProbabilisticClassifier + ?Sized> ProbabilisticClassifier for Box<M> {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (**self).predict_proba(x)
    }
}

/// Adapts a prediction closure to [`ProbabilisticClassifier`]
pub struct PredictFn<F>(pub F);

impl<F> std::fmt::Debug for PredictFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PredictFn").finish_non_exhaustive()
    }
}

impl<F> ProbabilisticClassifier for PredictFn<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Send + Sync,
{
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (self.0)(x)
    }
}

/// Metrics for model evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// AUC-ROC
    pub auc_roc: f64,
    /// Accuracy at the 0.5 threshold
    pub accuracy: f64,
    /// Brier score
    pub brier: f64,
    /// Log loss
    pub log_loss: f64,
    /// Number of samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute classification metrics from labels and probabilities
    pub fn compute_classification(y_true: &Array1<f64>, y_prob: &Array1<f64>) -> Self {
        Self {
            auc_roc: metrics::roc_auc(y_true, y_prob),
            accuracy: metrics::accuracy(y_true, y_prob, 0.5),
            brier: metrics::brier_score(y_true, y_prob),
            log_loss: metrics::log_loss(y_true, y_prob),
            n_samples: y_true.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_prob = array![0.9, 0.1, 0.8, 0.3, 0.2, 0.7, 0.6, 0.1];

        let metrics = ModelMetrics::compute_classification(&y_true, &y_prob);

        assert_eq!(metrics.n_samples, 8);
        assert_eq!(metrics.accuracy, 0.75);
        assert!(metrics.auc_roc > 0.8);
    }

    #[test]
    fn test_predict_fn_and_wrappers() {
        let model = PredictFn(|x: &Array2<f64>| Ok(x.column(0).to_owned()));
        let x = array![[0.25], [0.75]];
        assert_eq!(model.predict_proba(&x).unwrap(), array![0.25, 0.75]);

        let shared: Arc<dyn ProbabilisticClassifier> = Arc::new(model);
        assert_eq!(shared.predict_proba(&x).unwrap()[1], 0.75);
        assert_eq!((&shared).predict_proba(&x).unwrap()[0], 0.25);
    }
}
