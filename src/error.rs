//! Error types for the explanation pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    /// A label stratum is too small for the requested partitioning
    #[error("Stratification failed: label {label} has {stratum_size} rows, need at least {required}")]
    Stratification {
        label: String,
        stratum_size: usize,
        required: usize,
    },

    /// The explainer could not be built from the given model and data
    #[error("Explainer validation failed: {0}")]
    ExplainerValidation(String),

    /// baseline + contributions does not reproduce the model prediction
    #[error(
        "Inconsistent attribution: baseline + contributions = {reconstructed}, prediction = {prediction} (tolerance {tolerance})"
    )]
    InconsistentAttribution {
        reconstructed: f64,
        prediction: f64,
        tolerance: f64,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl ExplainError {
    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ExplainError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for ExplainError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExplainError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExplainError {
    fn from(err: serde_json::Error) -> Self {
        ExplainError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExplainError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExplainError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExplainError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_stratification_display() {
        let err = ExplainError::Stratification {
            label: "1".to_string(),
            stratum_size: 3,
            required: 10,
        };
        assert_eq!(
            err.to_string(),
            "Stratification failed: label 1 has 3 rows, need at least 10"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExplainError = io_err.into();
        assert!(matches!(err, ExplainError::IoError(_)));
    }
}
