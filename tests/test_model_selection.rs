//! Integration tests for resampling, grid search and the final forest

use kolosal_explain::data::fixtures::titanic_like;
use kolosal_explain::data::stratified_split;
use kolosal_explain::error::ExplainError;
use kolosal_explain::optimizer::{fit_final, ForestConfig, GridSearch, ParamGrid, SearchConfig};
use kolosal_explain::training::metrics::roc_auc;
use kolosal_explain::training::{ForestParams, StratifiedKFold};
use ndarray::Array1;

// ============================================================================
// Stratified k-fold
// ============================================================================

#[test]
fn test_folds_cover_training_rows() {
    let data = titanic_like(400, 7).unwrap();
    let folds = StratifiedKFold::new(10)
        .with_random_state(7)
        .split(data.labels())
        .unwrap();
    assert_eq!(folds.len(), 10);

    let mut validated = vec![0usize; data.n_rows()];
    let mut trained = vec![0usize; data.n_rows()];
    for fold in &folds {
        for &i in &fold.test_indices {
            validated[i] += 1;
        }
        for &i in &fold.train_indices {
            trained[i] += 1;
        }
    }
    assert!(validated.iter().all(|&c| c == 1));
    assert!(trained.iter().all(|&c| c == 9));
}

#[test]
fn test_folds_are_stratified() {
    let data = titanic_like(600, 3).unwrap();
    let folds = StratifiedKFold::new(5)
        .with_random_state(3)
        .split(data.labels())
        .unwrap();

    let overall = data.positive_rate();
    for fold in &folds {
        let rate = fold.test_indices.iter().map(|&i| data.labels()[i]).sum::<f64>()
            / fold.test_indices.len() as f64;
        assert!((rate - overall).abs() < 0.03, "fold rate {} vs {}", rate, overall);
    }
}

#[test]
fn test_folds_reject_small_stratum() {
    let labels = Array1::from(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
    let result = StratifiedKFold::new(3).split(&labels);
    assert!(matches!(result, Err(ExplainError::Stratification { .. })));
}

// ============================================================================
// Grid
// ============================================================================

#[test]
fn test_regular_grid_layout() {
    let grid = SearchConfig::new().grid(7).unwrap();
    assert_eq!(grid.len(), 9);

    let c = grid.candidates();
    assert_eq!(c[0], ForestParams::new(1, 2));
    assert_eq!(c[1], ForestParams::new(4, 2));
    assert_eq!(c[2], ForestParams::new(7, 2));
    assert_eq!(c[3], ForestParams::new(1, 21));
    assert_eq!(c[8], ForestParams::new(7, 40));
}

#[test]
fn test_grid_rejects_mtry_above_feature_count() {
    let grid = ParamGrid::regular((1, 9), (2, 10), 2).unwrap();
    assert!(grid.validate(7).is_err());
}

// ============================================================================
// Search
// ============================================================================

fn search_setup() -> (
    kolosal_explain::data::Dataset,
    Vec<kolosal_explain::training::CVSplit>,
) {
    let data = titanic_like(300, 11).unwrap();
    let folds = StratifiedKFold::new(3)
        .with_random_state(11)
        .split(data.labels())
        .unwrap();
    (data, folds)
}

#[test]
fn test_search_picks_highest_mean_auc() {
    let (data, folds) = search_setup();
    let grid = ParamGrid::regular((1, 7), (2, 40), 2).unwrap();
    let search = GridSearch::new(ForestConfig::new().with_n_trees(20).with_random_state(5));

    let result = search
        .search(data.features(), data.labels(), &folds, &grid)
        .unwrap();

    assert_eq!(result.candidates.len(), 4);
    assert_eq!(result.n_folds, 3);
    let best = result.best().mean_auc;
    for (idx, candidate) in result.candidates.iter().enumerate() {
        assert_eq!(candidate.fold_scores.len(), 3);
        assert!(best >= candidate.mean_auc);
        // First occurrence wins ties
        if candidate.mean_auc == best {
            assert!(idx >= result.best_index);
        }
    }
    assert!(best > 0.5);
}

#[test]
fn test_search_is_repeatable() {
    let (data, folds) = search_setup();
    let grid = ParamGrid::regular((2, 5), (5, 20), 2).unwrap();
    let search = GridSearch::new(ForestConfig::new().with_n_trees(15).with_random_state(1));

    let a = search.search(data.features(), data.labels(), &folds, &grid).unwrap();
    let b = search.search(data.features(), data.labels(), &folds, &grid).unwrap();

    assert_eq!(a.best_index, b.best_index);
    for (x, y) in a.candidates.iter().zip(&b.candidates) {
        assert_eq!(x.fold_scores, y.fold_scores);
    }
}

#[test]
fn test_search_ties_keep_first_candidate() {
    let (data, folds) = search_setup();
    // Identical candidates score identically
    let grid = ParamGrid::from_candidates(vec![ForestParams::new(3, 5); 3]);
    let result = GridSearch::new(ForestConfig::new().with_n_trees(10))
        .search(data.features(), data.labels(), &folds, &grid)
        .unwrap();
    assert_eq!(result.best_index, 0);
}

#[test]
fn test_search_rejects_empty_grid() {
    let (data, folds) = search_setup();
    let grid = ParamGrid::from_candidates(Vec::new());
    let result = GridSearch::new(ForestConfig::new().with_n_trees(5))
        .search(data.features(), data.labels(), &folds, &grid);
    assert!(result.is_err());
}

// ============================================================================
// Final model
// ============================================================================

#[test]
fn test_final_forest_generalizes() {
    let data = titanic_like(800, 21).unwrap();
    let split = stratified_split(data.labels(), 0.75, 21).unwrap();
    let (train, test) = split.apply(&data).unwrap();

    let forest = fit_final(
        train.features(),
        train.labels(),
        ForestParams::new(3, 5),
        &ForestConfig::new().with_n_trees(60).with_random_state(21),
    )
    .unwrap();

    let proba = forest.predict_proba(test.features()).unwrap();
    assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    let auc = roc_auc(test.labels(), &proba);
    assert!(auc > 0.7, "test AUC = {}", auc);
    assert!(forest.oob_score_value().is_some());
}

#[test]
fn test_final_forest_is_deterministic() {
    let data = titanic_like(200, 4).unwrap();
    let config = ForestConfig::new().with_n_trees(10).with_random_state(4);
    let a = fit_final(data.features(), data.labels(), ForestParams::new(2, 5), &config).unwrap();
    let b = fit_final(data.features(), data.labels(), ForestParams::new(2, 5), &config).unwrap();
    assert_eq!(
        a.predict_proba(data.features()).unwrap(),
        b.predict_proba(data.features()).unwrap()
    );
}
