//! Hyperparameter selection for the random forest
//!
//! Provides:
//! - Regular grids over `mtry` and `min_n`
//! - Exhaustive, parallel grid search scored by cross-validated ROC AUC
//! - The final refit on the full training partition

mod config;
mod grid;
mod search;

pub use config::{ForestConfig, SearchConfig};
pub use grid::ParamGrid;
pub use search::{fit_final, CandidateScore, GridSearch, SearchResult};
