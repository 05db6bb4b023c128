//! CSV / DataFrame loading into a [`Dataset`]

use super::{format_number, Dataset, FeatureSchema, LabelEncoding};
use crate::error::{ExplainError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Loads an already-imputed table and coerces the target to a 0/1 label
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    /// Target column name
    target: String,
    /// Original target value treated as the positive class
    positive_label: Option<String>,
    /// Numeric columns that must be treated as nominal
    categorical: Vec<String>,
    /// Explicit feature column order (default: every non-target column)
    feature_columns: Option<Vec<String>>,
}

impl DatasetLoader {
    /// Create a loader for the given target column
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            positive_label: None,
            categorical: Vec::new(),
            feature_columns: None,
        }
    }

    /// Set the target value treated as the positive class
    pub fn with_positive_label(mut self, label: impl Into<String>) -> Self {
        self.positive_label = Some(label.into());
        self
    }

    /// Force numeric columns to be treated as categorical
    pub fn with_categorical(mut self, columns: Vec<String>) -> Self {
        self.categorical = columns;
        self
    }

    /// Restrict and order the feature columns
    pub fn with_feature_columns(mut self, columns: Vec<String>) -> Self {
        self.feature_columns = Some(columns);
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ExplainError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .into_reader_with_file_handle(file)
            .finish()?;

        info!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        self.from_dataframe(&df)
    }

    /// Convert a DataFrame into a dataset
    pub fn from_dataframe(&self, df: &DataFrame) -> Result<Dataset> {
        let feature_cols: Vec<String> = match &self.feature_columns {
            Some(cols) => cols.clone(),
            None => df
                .get_column_names()
                .into_iter()
                .filter(|name| name.as_str() != self.target)
                .map(|s| s.to_string())
                .collect(),
        };

        if feature_cols.is_empty() {
            return Err(ExplainError::DataError("no feature columns".to_string()));
        }

        let n_rows = df.height();
        let mut schema = Vec::with_capacity(feature_cols.len());
        let mut col_data: Vec<Vec<f64>> = Vec::with_capacity(feature_cols.len());

        for name in &feature_cols {
            let series = df
                .column(name)
                .map_err(|_| ExplainError::FeatureNotFound(name.clone()))?
                .as_materialized_series();

            let force_categorical = self.categorical.iter().any(|c| c == name);
            let (feature, values) = if matches!(series.dtype(), DataType::String) || force_categorical {
                categorical_column(name, series)?
            } else {
                (FeatureSchema::numeric(name.clone()), numeric_column(name, series)?)
            };
            debug!(column = %name, categorical = feature.is_categorical(), "Column parsed");
            schema.push(feature);
            col_data.push(values);
        }

        let target = df
            .column(&self.target)
            .map_err(|_| ExplainError::FeatureNotFound(self.target.clone()))?
            .as_materialized_series();
        let raw_target = string_values(&self.target, target)?;
        let encoding = self.label_encoding(&raw_target)?;
        let labels: Array1<f64> = raw_target
            .iter()
            .map(|v| {
                encoding.encode(v).ok_or_else(|| {
                    ExplainError::DataError(format!("unexpected target value '{}'", v))
                })
            })
            .collect::<Result<Vec<f64>>>()?
            .into();

        let features = Array2::from_shape_fn((n_rows, col_data.len()), |(r, c)| col_data[c][r]);

        Dataset::new(features, schema, labels, encoding)
    }

    fn label_encoding(&self, raw: &[String]) -> Result<LabelEncoding> {
        let levels: BTreeSet<&str> = raw.iter().map(|s| s.as_str()).collect();
        if levels.len() != 2 {
            return Err(ExplainError::DataError(format!(
                "target '{}' must have exactly two values, found {:?}",
                self.target, levels
            )));
        }

        let (first, second) = {
            let mut it = levels.iter();
            match (it.next(), it.next()) {
                (Some(a), Some(b)) => (a.to_string(), b.to_string()),
                _ => return Err(ExplainError::DataError("empty target".to_string())),
            }
        };

        match &self.positive_label {
            Some(pos) if pos == &first => Ok(LabelEncoding::new(&self.target, second, first)),
            Some(pos) if pos == &second => Ok(LabelEncoding::new(&self.target, first, second)),
            Some(pos) => Err(ExplainError::invalid_parameter(
                "positive_label",
                pos,
                format!("not a value of '{}'", self.target),
            )),
            // Second level in sorted order: "1" over "0", "yes" over "no"
            None => Ok(LabelEncoding::new(&self.target, first, second)),
        }
    }
}

fn numeric_column(name: &str, series: &Series) -> Result<Vec<f64>> {
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|e| ExplainError::DataError(e.to_string()))?;
    casted
        .f64()
        .map_err(|e| ExplainError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.ok_or_else(|| missing_value(name)))
        .collect()
}

fn categorical_column(name: &str, series: &Series) -> Result<(FeatureSchema, Vec<f64>)> {
    let raw = string_values(name, series)?;
    let levels: Vec<String> = raw
        .iter()
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    let schema = FeatureSchema::categorical(name.to_string(), levels);
    let codes = raw
        .iter()
        .map(|v| schema.level_code(v).ok_or_else(|| missing_value(name)))
        .collect::<Result<Vec<f64>>>()?;
    Ok((schema, codes))
}

/// Column values rendered as strings; numbers drop a trailing `.0`
fn string_values(name: &str, series: &Series) -> Result<Vec<String>> {
    if matches!(series.dtype(), DataType::String) {
        series
            .str()
            .map_err(|e| ExplainError::DataError(e.to_string()))?
            .into_iter()
            .map(|v| {
                v.map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| missing_value(name))
            })
            .collect()
    } else {
        Ok(numeric_column(name, series)?
            .into_iter()
            .map(format_number)
            .collect())
    }
}

fn missing_value(column: &str) -> ExplainError {
    ExplainError::DataError(format!(
        "column '{}' has missing values; the table must be imputed before loading",
        column
    ))
}
