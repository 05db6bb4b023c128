//! Pipeline configuration
//!
//! One serializable document covering every stage. A single `seed` feeds
//! every stochastic step through [`PipelineConfig::seed_for`].

use crate::data::{DatasetLoader, FeatureValue};
use crate::error::{ExplainError, Result};
use crate::explainability::{GridType, ImportanceType, LossFunction};
use crate::optimizer::{ForestConfig, SearchConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Stochastic pipeline steps, each with its own derived seed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Split,
    Folds,
    Forest,
    Shap,
    Permutation,
    PartialDependence,
}

impl Stage {
    fn offset(self) -> u64 {
        match self {
            Stage::Split => 0,
            Stage::Folds => 1,
            Stage::Forest => 2,
            Stage::Shap => 3,
            Stage::Permutation => 4,
            Stage::PartialDependence => 5,
        }
    }
}

/// Input table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Label column
    pub target: String,
    /// Label value treated as the positive class; defaults to the second
    /// value in sorted order
    pub positive_label: Option<String>,
    /// Numeric columns to treat as categorical
    pub categorical: Vec<String>,
    /// Feature columns to keep, in order; `None` keeps all but the target
    pub feature_columns: Option<Vec<String>>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target: "survived".to_string(),
            positive_label: None,
            categorical: Vec::new(),
            feature_columns: None,
        }
    }
}

impl DataConfig {
    /// A loader applying these settings
    pub fn loader(&self) -> DatasetLoader {
        let mut loader = DatasetLoader::new(&self.target).with_categorical(self.categorical.clone());
        if let Some(label) = &self.positive_label {
            loader = loader.with_positive_label(label.clone());
        }
        if let Some(columns) = &self.feature_columns {
            loader = loader.with_feature_columns(columns.clone());
        }
        loader
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Share of rows in the training partition
    pub train_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.75,
        }
    }
}

/// Explanation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Explainer label used in every artifact
    pub label: String,
    /// Random orderings for SHAP-style averaging
    pub shap_b: usize,
    /// Permutation repetitions
    pub importance_repeats: usize,
    pub importance_loss: LossFunction,
    pub importance_type: ImportanceType,
    /// Rows sampled per permutation repetition; `None` uses all rows
    pub importance_n_sample: Option<usize>,
    /// Features to profile
    pub pdp_features: Vec<String>,
    pub pdp_grid_points: usize,
    pub pdp_grid_type: GridType,
    /// Categorical feature to split profiles by
    pub pdp_group_by: Option<String>,
    /// Maximum ICE curves kept per profile; `None` skips ICE
    pub max_ice_curves: Option<usize>,
    /// Feature pair for a two-feature surface
    pub pdp_2d: Option<(String, String)>,
    /// Grid points per axis of the surface
    pub pdp_2d_grid_points: usize,
    /// Observation to explain locally; `None` uses the first test row
    pub observation: Option<BTreeMap<String, FeatureValue>>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            label: "Random Forest".to_string(),
            shap_b: 25,
            importance_repeats: 10,
            importance_loss: LossFunction::OneMinusAuc,
            importance_type: ImportanceType::Raw,
            importance_n_sample: None,
            pdp_features: vec!["age".to_string(), "class".to_string()],
            pdp_grid_points: 101,
            pdp_grid_type: GridType::Quantile,
            pdp_group_by: Some("gender".to_string()),
            max_ice_curves: Some(100),
            pdp_2d: None,
            pdp_2d_grid_points: 20,
            observation: None,
        }
    }
}

/// Configuration of the whole pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seed every stochastic stage is derived from
    pub seed: u64,
    pub data: DataConfig,
    pub split: SplitConfig,
    pub search: SearchConfig,
    pub forest: ForestConfig,
    pub explain: ExplainConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            seed: 42,
            ..Default::default()
        }
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_data(mut self, data: DataConfig) -> Self {
        self.data = data;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    pub fn with_explain(mut self, explain: ExplainConfig) -> Self {
        self.explain = explain;
        self
    }

    /// Builder method to set the training share
    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.split.train_fraction = fraction;
        self
    }

    /// Seed of one stochastic step
    pub fn seed_for(&self, stage: Stage) -> u64 {
        self.seed.wrapping_add(stage.offset())
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.target.trim().is_empty() {
            return Err(ExplainError::ConfigError(
                "data.target must name a column".to_string(),
            ));
        }
        let f = self.split.train_fraction;
        if !(f > 0.0 && f < 1.0) {
            return Err(ExplainError::invalid_parameter(
                "split.train_fraction",
                f,
                "must be in (0, 1)",
            ));
        }
        self.search.validate()?;
        self.forest.validate()?;

        let e = &self.explain;
        if e.shap_b == 0 {
            return Err(ExplainError::invalid_parameter("explain.shap_b", 0, "must be at least 1"));
        }
        if e.importance_repeats == 0 {
            return Err(ExplainError::invalid_parameter(
                "explain.importance_repeats",
                0,
                "must be at least 1",
            ));
        }
        if e.pdp_grid_points < 2 || e.pdp_2d_grid_points < 2 {
            return Err(ExplainError::invalid_parameter(
                "explain.pdp_grid_points",
                e.pdp_grid_points.min(e.pdp_2d_grid_points),
                "must be at least 2",
            ));
        }
        if let Some((a, b)) = &e.pdp_2d {
            if a == b {
                return Err(ExplainError::ConfigError(
                    "explain.pdp_2d must name two different features".to_string(),
                ));
            }
        }
        Ok(())
    }
}
