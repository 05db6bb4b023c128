//! Exhaustive grid search scored by cross-validated ROC AUC

use super::config::ForestConfig;
use super::grid::ParamGrid;
use crate::error::{ExplainError, Result};
use crate::training::metrics::roc_auc;
use crate::training::{CVResults, CVSplit, ForestParams, RandomForest};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Cross-validated score of one grid candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ForestParams,
    /// Mean validation AUC across folds
    pub mean_auc: f64,
    /// Population standard deviation of the fold AUCs
    pub std_auc: f64,
    /// Validation AUC per fold, in fold order
    pub fold_scores: Vec<f64>,
}

/// Every candidate's score plus the winner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Candidates in grid order
    pub candidates: Vec<CandidateScore>,
    /// Index of the winning candidate
    pub best_index: usize,
    pub n_folds: usize,
    pub metric: String,
    pub elapsed_secs: f64,
}

impl SearchResult {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }

    pub fn best_params(&self) -> ForestParams {
        self.best().params
    }

    /// Candidates sorted by descending mean AUC (grid order on ties)
    pub fn ranked(&self) -> Vec<&CandidateScore> {
        let mut ranked: Vec<&CandidateScore> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| {
            b.mean_auc
                .partial_cmp(&a.mean_auc)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

/// Index of the highest mean; the first one wins ties
fn select_best(candidates: &[CandidateScore]) -> usize {
    let mut best = 0;
    for (idx, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.mean_auc > candidates[best].mean_auc {
            best = idx;
        }
    }
    best
}

/// Grid search over forest hyperparameters
pub struct GridSearch {
    forest: ForestConfig,
}

impl GridSearch {
    pub fn new(forest: ForestConfig) -> Self {
        Self { forest }
    }

    /// Score every (fold, candidate) pair and pick the best mean AUC.
    ///
    /// Each evaluation copies its fold's training rows, fits a forest and
    /// scores the validation rows; evaluations share nothing and run in
    /// parallel. All of them use the same forest seed so candidates are
    /// compared on equal footing.
    pub fn search(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        folds: &[CVSplit],
        grid: &ParamGrid,
    ) -> Result<SearchResult> {
        self.forest.validate()?;
        if x.nrows() != y.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if folds.is_empty() {
            return Err(ExplainError::ValidationError(
                "resampling plan has no folds".to_string(),
            ));
        }
        grid.validate(x.ncols())?;
        for fold in folds {
            let out_of_range = fold
                .train_indices
                .iter()
                .chain(&fold.test_indices)
                .any(|&i| i >= x.nrows());
            if out_of_range || fold.train_indices.is_empty() || fold.test_indices.is_empty() {
                return Err(ExplainError::ValidationError(format!(
                    "fold {} has empty or out-of-range indices",
                    fold.fold_idx
                )));
            }
        }

        let start = Instant::now();
        let n_folds = folds.len();
        info!(
            n_candidates = grid.len(),
            n_folds,
            n_trees = self.forest.n_trees,
            "Starting grid search"
        );

        let tasks: Vec<(usize, usize)> = (0..grid.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();

        let scores: Vec<f64> = tasks
            .par_iter()
            .map(|&(c, f)| self.evaluate(x, y, &folds[f], grid.candidates()[c]))
            .collect::<Result<Vec<_>>>()?;

        // tasks are candidate-major, so each chunk holds one candidate's folds
        let candidates: Vec<CandidateScore> = grid
            .iter()
            .zip(scores.chunks(n_folds))
            .map(|(&params, fold_scores)| {
                let cv = CVResults::from_scores(fold_scores.to_vec());
                debug!(%params, mean_auc = cv.mean_score, std_auc = cv.std_score, "Candidate scored");
                CandidateScore {
                    params,
                    mean_auc: cv.mean_score,
                    std_auc: cv.std_score,
                    fold_scores: cv.scores,
                }
            })
            .collect();

        let best_index = select_best(&candidates);
        let result = SearchResult {
            candidates,
            best_index,
            n_folds,
            metric: "roc_auc".to_string(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            best = %result.best_params(),
            mean_auc = result.best().mean_auc,
            elapsed_secs = result.elapsed_secs,
            "Grid search complete"
        );
        Ok(result)
    }

    fn evaluate(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        fold: &CVSplit,
        params: ForestParams,
    ) -> Result<f64> {
        let x_train = x.select(Axis(0), &fold.train_indices);
        let y_train = y.select(Axis(0), &fold.train_indices);
        let x_valid = x.select(Axis(0), &fold.test_indices);
        let y_valid = y.select(Axis(0), &fold.test_indices);

        let mut forest = self.forest.clone().with_oob_score(false).build(params);
        forest.fit(&x_train, &y_train)?;
        let proba = forest.predict_proba(&x_valid)?;
        Ok(roc_auc(&y_valid, &proba))
    }
}

/// Train the selected candidate once on the whole training partition
pub fn fit_final(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    params: ForestParams,
    forest_config: &ForestConfig,
) -> Result<RandomForest> {
    forest_config.validate()?;
    params.validate(x_train.ncols())?;

    let start = Instant::now();
    let mut forest = forest_config.build(params);
    forest.fit(x_train, y_train)?;

    info!(
        %params,
        n_trees = forest.n_trees(),
        oob_auc = ?forest.oob_score_value(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Final model fitted"
    );
    Ok(forest)
}
