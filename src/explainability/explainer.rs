//! Model-agnostic explainer binding a model to its reference data

use crate::data::{self, Dataset, FeatureSchema, FeatureValue};
use crate::error::{ExplainError, Result};
use crate::training::{ModelMetrics, ProbabilisticClassifier};
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;
use tracing::debug;

/// A fitted model together with the reference table every explanation is
/// computed against.
///
/// Construction checks that the model produces one probability in `[0, 1]`
/// per reference row and that the labels are 0/1. The explainer never
/// retrains or mutates the model; all methods take `&self`.
pub struct Explainer<M> {
    model: M,
    data: Array2<f64>,
    y: Array1<f64>,
    schema: Vec<FeatureSchema>,
    label: String,
    predictions: Array1<f64>,
    baseline: f64,
}

impl<M: std::fmt::Debug> std::fmt::Debug for Explainer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explainer")
            .field("label", &self.label)
            .field("n_rows", &self.data.nrows())
            .field("n_features", &self.data.ncols())
            .field("baseline", &self.baseline)
            .finish()
    }
}

fn validate_predictions(predictions: &Array1<f64>, n_rows: usize) -> Result<()> {
    if predictions.len() != n_rows {
        return Err(ExplainError::ExplainerValidation(format!(
            "model returned {} predictions for {} rows",
            predictions.len(),
            n_rows
        )));
    }
    if let Some((row, p)) = predictions
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(ExplainError::ExplainerValidation(format!(
            "prediction {} for row {} is not a probability",
            p, row
        )));
    }
    Ok(())
}

impl<M: ProbabilisticClassifier> Explainer<M> {
    /// Bind `model` to a reference table and its 0/1 labels.
    ///
    /// Columns are described as numeric features `x1..xp`; use
    /// [`Explainer::with_schema`] or [`Explainer::from_dataset`] for named
    /// and categorical columns.
    pub fn new(
        model: M,
        data: Array2<f64>,
        y: Array1<f64>,
        label: impl Into<String>,
    ) -> Result<Self> {
        let schema = (1..=data.ncols())
            .map(|j| FeatureSchema::numeric(format!("x{}", j)))
            .collect();
        Self::build(model, data, y, schema, label.into())
    }

    /// Bind `model` to a [`Dataset`], keeping its schema
    pub fn from_dataset(model: M, data: &Dataset, label: impl Into<String>) -> Result<Self> {
        Self::build(
            model,
            data.features().clone(),
            data.labels().clone(),
            data.schema().to_vec(),
            label.into(),
        )
    }

    /// Replace the column descriptions
    pub fn with_schema(mut self, schema: Vec<FeatureSchema>) -> Result<Self> {
        if schema.len() != self.data.ncols() {
            return Err(ExplainError::ExplainerValidation(format!(
                "schema has {} columns, reference table has {}",
                schema.len(),
                self.data.ncols()
            )));
        }
        self.schema = schema;
        Ok(self)
    }

    fn build(
        model: M,
        data: Array2<f64>,
        y: Array1<f64>,
        schema: Vec<FeatureSchema>,
        label: String,
    ) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(ExplainError::ExplainerValidation(
                "reference table is empty".to_string(),
            ));
        }
        if data.nrows() != y.len() {
            return Err(ExplainError::ExplainerValidation(format!(
                "reference table has {} rows but label vector has {}",
                data.nrows(),
                y.len()
            )));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(ExplainError::ExplainerValidation(
                "labels must be encoded as 0/1".to_string(),
            ));
        }
        if schema.len() != data.ncols() {
            return Err(ExplainError::ExplainerValidation(format!(
                "schema has {} columns, reference table has {}",
                schema.len(),
                data.ncols()
            )));
        }

        let predictions = model
            .predict_proba(&data)
            .map_err(|e| ExplainError::ExplainerValidation(format!("prediction failed: {}", e)))?;
        validate_predictions(&predictions, data.nrows())?;
        let baseline = predictions.mean().unwrap_or(0.0);

        debug!(
            label = %label,
            n_rows = data.nrows(),
            n_features = data.ncols(),
            baseline,
            "Explainer constructed"
        );

        Ok(Self {
            model,
            data,
            y,
            schema,
            label,
            predictions,
            baseline,
        })
    }

    /// Positive-class probabilities for `x`, checked for length and range
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.data.ncols() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} columns", self.data.ncols()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let predictions = self.model.predict_proba(x)?;
        validate_predictions(&predictions, x.nrows()).map_err(|e| {
            ExplainError::ComputationError(format!("model output rejected: {}", e))
        })?;
        Ok(predictions)
    }

    /// Probability for a single encoded observation
    pub fn predict_one(&self, observation: &Array1<f64>) -> Result<f64> {
        let row = observation.view().insert_axis(Axis(0)).to_owned();
        Ok(self.predict(&row)?[0])
    }

    /// Mean prediction over `x`
    pub(crate) fn mean_prediction(&self, x: &Array2<f64>) -> Result<f64> {
        Ok(self.predict(x)?.mean().unwrap_or(0.0))
    }

    /// Mean predicted probability over the reference table
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Cached predictions on the reference table
    pub fn reference_predictions(&self) -> &Array1<f64> {
        &self.predictions
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schema(&self) -> &[FeatureSchema] {
        &self.schema
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.schema.iter().map(|s| s.name.clone()).collect()
    }

    pub fn feature_index(&self, name: &str) -> Result<usize> {
        data::feature_index(&self.schema, name)
    }

    /// Encode a named observation into a feature row
    pub fn encode_observation(&self, values: &BTreeMap<String, FeatureValue>) -> Result<Array1<f64>> {
        data::encode_observation(&self.schema, values)
    }

    /// Reject observations that do not fit the reference table
    pub(crate) fn check_observation(&self, observation: &Array1<f64>) -> Result<()> {
        if observation.len() != self.data.ncols() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} features", self.data.ncols()),
                actual: format!("{} features", observation.len()),
            });
        }
        if observation.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::ValidationError(
                "observation contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Fit of the model on the reference table
    pub fn model_performance(&self) -> ModelMetrics {
        ModelMetrics::compute_classification(&self.y, &self.predictions)
    }
}
