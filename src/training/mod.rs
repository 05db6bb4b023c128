//! Model training module
//!
//! Provides the probability random forest used by the pipeline:
//! - Decision trees storing positive-class fractions in their leaves
//! - Bootstrap random forests with per-split feature subsampling
//! - Stratified and plain k-fold splitters
//! - Binary classification metrics (ROC AUC, accuracy, Brier, log loss)

pub mod cross_validation;
pub mod decision_tree;
pub mod metrics;
mod models;
pub mod random_forest;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator, StratifiedKFold};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use models::{ModelMetrics, PredictFn, ProbabilisticClassifier};
pub use random_forest::{ForestParams, MaxFeatures, RandomForest};
