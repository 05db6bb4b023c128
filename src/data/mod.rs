//! Tabular data model
//!
//! A [`Dataset`] is a dense feature matrix plus a per-column schema and a
//! binary label vector. Categorical columns hold level codes (`0.0`,
//! `1.0`, ...) indexing into the schema's level list, so every model and
//! explainer can work on a plain `Array2<f64>`.

pub mod fixtures;
mod loader;
mod split;

pub use loader::DatasetLoader;
pub(crate) use split::strata;
pub use split::{label_proportion, stratified_split, TrainTestSplit};

use crate::error::{ExplainError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Continuous or count-valued column
    Numeric,
    /// Nominal column, values are codes into `levels`
    Categorical { levels: Vec<String> },
}

/// Name and kind of a feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSchema {
    /// Numeric column
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
        }
    }

    /// Categorical column with the given level order
    pub fn categorical<S: Into<String>>(name: impl Into<String>, levels: Vec<S>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical {
                levels: levels.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FeatureKind::Categorical { .. })
    }

    /// Levels of a categorical column, `None` for numeric columns
    pub fn levels(&self) -> Option<&[String]> {
        match &self.kind {
            FeatureKind::Categorical { levels } => Some(levels),
            FeatureKind::Numeric => None,
        }
    }

    /// Code of a level, if this is a categorical column containing it
    pub fn level_code(&self, level: &str) -> Option<f64> {
        self.levels()?
            .iter()
            .position(|l| l == level)
            .map(|idx| idx as f64)
    }

    /// Human-readable rendering of a stored value
    pub fn format_value(&self, value: f64) -> String {
        match &self.kind {
            FeatureKind::Categorical { levels } => levels
                .get(value.round() as usize)
                .cloned()
                .unwrap_or_else(|| format_number(value)),
            FeatureKind::Numeric => format_number(value),
        }
    }

    /// Encode a raw value into the column's storage representation
    pub fn encode(&self, value: &FeatureValue) -> Result<f64> {
        match (&self.kind, value) {
            (FeatureKind::Numeric, FeatureValue::Number(v)) => Ok(*v),
            (FeatureKind::Numeric, FeatureValue::Level(s)) => s.trim().parse::<f64>().map_err(|_| {
                ExplainError::invalid_parameter(&self.name, s, "expected a numeric value")
            }),
            (FeatureKind::Categorical { levels }, FeatureValue::Level(s)) => self
                .level_code(s)
                .ok_or_else(|| {
                    ExplainError::invalid_parameter(
                        &self.name,
                        s,
                        format!("unknown level, expected one of {:?}", levels),
                    )
                }),
            (FeatureKind::Categorical { .. }, FeatureValue::Number(v)) => {
                self.level_code(&format_number(*v)).ok_or_else(|| {
                    ExplainError::invalid_parameter(&self.name, v, "unknown level")
                })
            }
        }
    }
}

/// A raw feature value as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Level(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Level(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Level(v)
    }
}

/// Mapping of the two original target values onto 0/1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoding {
    /// Target column name
    pub target: String,
    /// Original value encoded as 0
    pub negative: String,
    /// Original value encoded as 1
    pub positive: String,
}

impl LabelEncoding {
    pub fn new(
        target: impl Into<String>,
        negative: impl Into<String>,
        positive: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            negative: negative.into(),
            positive: positive.into(),
        }
    }

    /// Encode an original target value
    pub fn encode(&self, value: &str) -> Option<f64> {
        if value == self.positive {
            Some(1.0)
        } else if value == self.negative {
            Some(0.0)
        } else {
            None
        }
    }

    /// Original value for a 0/1 code
    pub fn decode(&self, code: f64) -> &str {
        if code > 0.5 {
            &self.positive
        } else {
            &self.negative
        }
    }
}

/// Labeled observation table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    features: Array2<f64>,
    schema: Vec<FeatureSchema>,
    labels: Array1<f64>,
    label_encoding: LabelEncoding,
}

impl Dataset {
    /// Build a dataset, validating shapes, codes and labels
    pub fn new(
        features: Array2<f64>,
        schema: Vec<FeatureSchema>,
        labels: Array1<f64>,
        label_encoding: LabelEncoding,
    ) -> Result<Self> {
        if features.ncols() != schema.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} feature columns", schema.len()),
                actual: format!("{} columns", features.ncols()),
            });
        }
        if features.nrows() != labels.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("labels length = {}", features.nrows()),
                actual: format!("labels length = {}", labels.len()),
            });
        }
        if let Some(bad) = labels.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(ExplainError::DataError(format!(
                "labels must be encoded as 0/1, found {}",
                bad
            )));
        }
        for (col, feature) in schema.iter().enumerate() {
            let column = features.column(col);
            if column.iter().any(|v| !v.is_finite()) {
                return Err(ExplainError::DataError(format!(
                    "column '{}' contains missing or non-finite values; impute before loading",
                    feature.name
                )));
            }
            if let Some(levels) = feature.levels() {
                let n_levels = levels.len() as f64;
                if column
                    .iter()
                    .any(|&v| v < 0.0 || v >= n_levels || v.fract() != 0.0)
                {
                    return Err(ExplainError::DataError(format!(
                        "column '{}' holds codes outside its {} levels",
                        feature.name,
                        levels.len()
                    )));
                }
            }
        }

        Ok(Self {
            features,
            schema,
            labels,
            label_encoding,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<f64> {
        &self.labels
    }

    pub fn schema(&self) -> &[FeatureSchema] {
        &self.schema
    }

    pub fn label_encoding(&self) -> &LabelEncoding {
        &self.label_encoding
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.schema.iter().map(|f| f.name.clone()).collect()
    }

    /// Column index of a feature
    pub fn feature_index(&self, name: &str) -> Result<usize> {
        feature_index(&self.schema, name)
    }

    /// Fraction of rows with label 1
    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.sum() / self.labels.len() as f64
    }

    /// Sub-table with the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows()) {
            return Err(ExplainError::ValidationError(format!(
                "row index {} out of bounds (n_rows={})",
                bad,
                self.n_rows()
            )));
        }
        Ok(Self {
            features: self.features.select(Axis(0), indices),
            schema: self.schema.clone(),
            labels: self.labels.select(Axis(0), indices),
            label_encoding: self.label_encoding.clone(),
        })
    }

    /// Encode a named observation into a feature row
    pub fn encode_observation(&self, values: &BTreeMap<String, FeatureValue>) -> Result<Array1<f64>> {
        encode_observation(&self.schema, values)
    }
}

/// Column index of a feature in a schema
pub fn feature_index(schema: &[FeatureSchema], name: &str) -> Result<usize> {
    schema
        .iter()
        .position(|f| f.name == name)
        .ok_or_else(|| ExplainError::FeatureNotFound(name.to_string()))
}

/// Encode a named observation; every schema feature must be present
pub fn encode_observation(
    schema: &[FeatureSchema],
    values: &BTreeMap<String, FeatureValue>,
) -> Result<Array1<f64>> {
    if let Some(unknown) = values.keys().find(|k| schema.iter().all(|f| &f.name != *k)) {
        return Err(ExplainError::FeatureNotFound(unknown.clone()));
    }
    schema
        .iter()
        .map(|feature| {
            let value = values
                .get(&feature.name)
                .ok_or_else(|| ExplainError::FeatureNotFound(feature.name.clone()))?;
            feature.encode(value)
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}

pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}
