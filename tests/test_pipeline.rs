//! End-to-end pipeline tests on the Titanic-like fixture

use kolosal_explain::config::PipelineConfig;
use kolosal_explain::data::fixtures::{example_passenger, titanic_like};
use kolosal_explain::optimizer::{ForestConfig, SearchConfig};
use kolosal_explain::pipeline::Pipeline;

fn quick_config(seed: u64) -> PipelineConfig {
    let mut config = PipelineConfig::new()
        .with_seed(seed)
        .with_search(SearchConfig::new().with_n_folds(3).with_grid_levels(2))
        .with_forest(ForestConfig::new().with_n_trees(20));
    config.explain.shap_b = 6;
    config.explain.importance_repeats = 3;
    config.explain.pdp_grid_points = 8;
    config.explain.max_ice_curves = Some(15);
    config.explain.pdp_2d = Some(("age".to_string(), "fare".to_string()));
    config.explain.pdp_2d_grid_points = 4;
    config
}

#[test]
fn test_full_pipeline_on_example_passenger() {
    let data = titanic_like(300, 42).unwrap();
    let pipeline = Pipeline::new(quick_config(42)).unwrap();
    let outcome = pipeline.run(&data, Some(&example_passenger())).unwrap();

    let s = &outcome.summary;
    assert_eq!(s.n_rows, 300);
    assert_eq!(s.n_train + s.n_test, 300);
    assert_eq!(s.n_folds, 3);
    assert_eq!(s.n_candidates, 4);
    assert_eq!(s.best_params, outcome.selection.search.best_params());
    assert_eq!(s.top_features.len(), 7);

    let e = &outcome.explanations;
    assert_eq!(e.observation["gender"], "female");
    assert_eq!(e.observation["class"], "3rd");
    assert!((e.break_down.intercept + e.break_down.sum_contributions() - e.break_down.prediction).abs() < 1e-6);
    assert!((e.shap.prediction - e.break_down.prediction).abs() < 1e-12);
    assert_eq!(e.profiles.len(), 2);
    assert_eq!(e.profiles[0].feature, "age");
    assert_eq!(e.profiles[1].groups.len(), 2);
    assert!(e.surface.is_some());

    // The explainer is bound to the training partition
    assert_eq!(e.performance.n_samples, s.n_train);
    assert!((s.baseline - e.break_down.intercept).abs() < 1e-12);
}

#[test]
fn test_pipeline_is_deterministic_under_seed() {
    let data = titanic_like(200, 5).unwrap();
    let run = || {
        Pipeline::new(quick_config(7))
            .unwrap()
            .run(&data, None)
            .unwrap()
    };
    let a = run();
    let b = run();

    assert_eq!(a.prepared.split, b.prepared.split);
    assert_eq!(a.selection.search.best_index, b.selection.search.best_index);
    assert_eq!(a.explanations.break_down.prediction, b.explanations.break_down.prediction);
    for (x, y) in a.explanations.shap.features.iter().zip(&b.explanations.shap.features) {
        assert_eq!(x.contributions, y.contributions);
    }
    for (x, y) in a
        .explanations
        .importance
        .features
        .iter()
        .zip(&b.explanations.importance.features)
    {
        assert_eq!(x.values, y.values);
    }
}

#[test]
fn test_default_observation_is_first_test_row() {
    let data = titanic_like(200, 6).unwrap();
    let pipeline = Pipeline::new(quick_config(3)).unwrap();
    let outcome = pipeline.run(&data, None).unwrap();

    let first_test = outcome.prepared.test.features().row(0).to_owned();
    let expected = outcome.selection.model.predict_proba(&first_test.insert_axis(ndarray::Axis(0))).unwrap()[0];
    assert!((outcome.explanations.break_down.prediction - expected).abs() < 1e-12);
}

#[test]
fn test_artifacts_written() {
    let data = titanic_like(200, 8).unwrap();
    let pipeline = Pipeline::new(quick_config(8)).unwrap();
    let outcome = pipeline.run(&data, Some(&example_passenger())).unwrap();

    let dir = std::env::temp_dir().join(format!("kolosal-explain-artifacts-{}", std::process::id()));
    let written = outcome.write_artifacts(&dir).unwrap();

    for name in [
        "break_down.json",
        "shap.json",
        "feature_importance.json",
        "model_selection.json",
        "partial_dependence_age.json",
        "partial_dependence_class.json",
        "partial_dependence_age_fare.json",
        "summary.json",
    ] {
        assert!(dir.join(name).exists(), "missing {}", name);
    }
    assert_eq!(written.len(), 8);

    let text = std::fs::read_to_string(dir.join("feature_importance.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["full_model"]["variable"], "_full_model_");
    assert_eq!(value["features"].as_array().unwrap().len(), 7);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unknown_profile_feature_fails() {
    let data = titanic_like(150, 2).unwrap();
    let mut config = quick_config(2);
    config.explain.pdp_features = vec!["cabin".to_string()];
    let result = Pipeline::new(config).unwrap().run(&data, None);
    assert!(result.is_err());
}
