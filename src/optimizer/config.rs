//! Model selection configuration

use super::grid::ParamGrid;
use crate::error::{ExplainError, Result};
use crate::training::{Criterion, ForestParams, RandomForest};
use serde::{Deserialize, Serialize};

/// The forest template shared by every grid candidate and the final fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub n_trees: usize,

    /// Maximum tree depth (unbounded when `None`)
    pub max_depth: Option<usize>,

    /// Split criterion
    pub criterion: Criterion,

    /// Compute the out-of-bag AUC on the final fit
    pub oob_score: bool,

    /// Random seed for bootstrap and feature sampling
    pub random_state: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 500,
            max_depth: None,
            criterion: Criterion::Gini,
            oob_score: true,
            random_state: 42,
        }
    }
}

impl ForestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the number of trees
    pub fn with_n_trees(mut self, n: usize) -> Self {
        self.n_trees = n;
        self
    }

    /// Builder method to cap tree depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builder method to set the criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Builder method to enable OOB scoring
    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    /// Builder method to set the seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(ExplainError::invalid_parameter(
                "n_trees",
                self.n_trees,
                "must be at least 1",
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ExplainError::invalid_parameter(
                "max_depth",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// An unfitted forest with `params` applied
    pub fn build(&self, params: ForestParams) -> RandomForest {
        let mut forest = RandomForest::new(self.n_trees)
            .with_params(params)
            .with_criterion(self.criterion)
            .with_oob_score(self.oob_score)
            .with_random_state(self.random_state);
        if let Some(depth) = self.max_depth {
            forest = forest.with_max_depth(depth);
        }
        forest
    }
}

/// Resampling and grid settings for the hyperparameter search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of stratified folds
    pub n_folds: usize,

    /// Values per hyperparameter in the regular grid
    pub grid_levels: usize,

    /// Inclusive `mtry` range; `None` spans every feature count `[1, p]`
    pub mtry_range: Option<(usize, usize)>,

    /// Inclusive `min_n` range
    pub min_n_range: (usize, usize),

    /// Number of trees per candidate forest; `None` uses the final forest's count
    pub n_trees: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_folds: 10,
            grid_levels: 3,
            mtry_range: None,
            min_n_range: (2, 40),
            n_trees: None,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the number of folds
    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.n_folds = n;
        self
    }

    /// Builder method to set the grid levels
    pub fn with_grid_levels(mut self, levels: usize) -> Self {
        self.grid_levels = levels;
        self
    }

    /// Builder method to set the `mtry` range
    pub fn with_mtry_range(mut self, lo: usize, hi: usize) -> Self {
        self.mtry_range = Some((lo, hi));
        self
    }

    /// Builder method to set the `min_n` range
    pub fn with_min_n_range(mut self, lo: usize, hi: usize) -> Self {
        self.min_n_range = (lo, hi);
        self
    }

    /// Builder method to use smaller forests during the search
    pub fn with_n_trees(mut self, n: usize) -> Self {
        self.n_trees = Some(n);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(ExplainError::invalid_parameter(
                "n_folds",
                self.n_folds,
                "must be at least 2",
            ));
        }
        if self.grid_levels == 0 {
            return Err(ExplainError::invalid_parameter(
                "grid_levels",
                self.grid_levels,
                "must be at least 1",
            ));
        }
        if self.n_trees == Some(0) {
            return Err(ExplainError::invalid_parameter(
                "search n_trees",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// The regular grid for a table with `n_features` columns
    pub fn grid(&self, n_features: usize) -> Result<ParamGrid> {
        let mtry = self.mtry_range.unwrap_or((1, n_features));
        ParamGrid::regular(mtry, self.min_n_range, self.grid_levels)
    }
}
