//! Kolosal Explain - Random forest explanation pipeline
//!
//! This crate trains a tuned random forest classifier on a tabular table
//! and explains it:
//! - Stratified train/test split and stratified k-fold resampling
//! - Grid search over forest hyperparameters scored by ROC AUC
//! - Local attributions (break-down, SHAP-style averaging)
//! - Global explanations (permutation importance, partial dependence)
//!
//! # Modules
//!
//! ## Core ML Modules
//! - [`data`] - Dataset model, CSV loading and stratified splitting
//! - [`training`] - Decision trees, random forests, cross-validation, metrics
//! - [`optimizer`] - Hyperparameter grid search
//!
//! ## Explanations
//! - [`explainability`] - Break-down, SHAP, permutation importance, PDP/ICE
//!
//! ## Orchestration
//! - [`config`] - Pipeline configuration
//! - [`pipeline`] - Staged end-to-end run and JSON artifacts
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod data;
pub mod training;
pub mod optimizer;

// Explanations
pub mod explainability;

// Orchestration
pub mod config;
pub mod pipeline;
pub mod cli;

pub use error::{ExplainError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ExplainError, Result};

    // Data
    pub use crate::data::{Dataset, DatasetLoader, FeatureKind, FeatureSchema, FeatureValue};

    // Training
    pub use crate::training::{ForestParams, ModelMetrics, PredictFn, ProbabilisticClassifier, RandomForest, StratifiedKFold};

    // Optimization
    pub use crate::optimizer::{ForestConfig, GridSearch, ParamGrid, SearchConfig, SearchResult};

    // Explainability
    pub use crate::explainability::{
        BreakDownExplainer, Explainer, PartialDependence, PermutationImportance, ShapExplainer,
    };

    // Pipeline
    pub use crate::config::PipelineConfig;
    pub use crate::pipeline::{Pipeline, PipelineOutcome};
}
