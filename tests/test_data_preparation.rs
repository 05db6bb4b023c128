//! Integration tests for data loading and stratified splitting

use kolosal_explain::data::fixtures::{example_passenger, titanic_like};
use kolosal_explain::data::{label_proportion, stratified_split, DatasetLoader, FeatureKind, FeatureValue};
use kolosal_explain::error::ExplainError;
use ndarray::Array1;
use polars::prelude::*;

// ============================================================================
// Loader
// ============================================================================

#[test]
fn test_loader_infers_kinds_and_encodes_label() {
    let df = df!(
        "gender" => &["female", "male", "male", "female", "male", "female"],
        "age" => &[16.0, 42.0, 30.0, 8.0, 55.0, 23.0],
        "class" => &[3i64, 1, 2, 3, 1, 2],
        "survived" => &["yes", "no", "no", "yes", "no", "yes"]
    )
    .unwrap();

    let dataset = DatasetLoader::new("survived")
        .with_categorical(vec!["class".to_string()])
        .from_dataframe(&df)
        .unwrap();

    assert_eq!(dataset.n_rows(), 6);
    assert_eq!(dataset.feature_names(), vec!["gender", "age", "class"]);
    assert!(dataset.schema()[0].is_categorical());
    assert_eq!(dataset.schema()[1].kind, FeatureKind::Numeric);
    assert_eq!(
        dataset.schema()[2].levels().unwrap(),
        &["1".to_string(), "2".to_string(), "3".to_string()]
    );

    // "yes" sorts after "no" and becomes the positive class
    assert_eq!(dataset.label_encoding().positive, "yes");
    assert_eq!(dataset.labels().to_vec(), vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
}

#[test]
fn test_loader_explicit_positive_label() {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0],
        "outcome" => &["died", "lived", "died", "lived"]
    )
    .unwrap();

    let dataset = DatasetLoader::new("outcome")
        .with_positive_label("died")
        .from_dataframe(&df)
        .unwrap();
    assert_eq!(dataset.labels().to_vec(), vec![1.0, 0.0, 1.0, 0.0]);

    let unknown = DatasetLoader::new("outcome")
        .with_positive_label("maybe")
        .from_dataframe(&df);
    assert!(unknown.is_err());
}

#[test]
fn test_loader_rejects_missing_values() {
    let df = df!(
        "age" => &[Some(1.0), None, Some(3.0), Some(4.0)],
        "survived" => &[0i64, 1, 0, 1]
    )
    .unwrap();

    assert!(DatasetLoader::new("survived").from_dataframe(&df).is_err());
}

#[test]
fn test_loader_rejects_non_binary_target() {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0],
        "survived" => &[0i64, 1, 2]
    )
    .unwrap();

    assert!(DatasetLoader::new("survived").from_dataframe(&df).is_err());
}

#[test]
fn test_loader_unknown_target() {
    let df = df!("x" => &[1.0, 2.0]).unwrap();
    let result = DatasetLoader::new("survived")
        .with_feature_columns(vec!["x".to_string()])
        .from_dataframe(&df);
    assert!(matches!(result, Err(ExplainError::FeatureNotFound(_))));
}

#[test]
fn test_load_csv() {
    let dir = std::env::temp_dir().join(format!("kolosal-explain-csv-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("titanic.csv");
    std::fs::write(
        &path,
        "gender,age,class,fare,survived\n\
         female,16,3rd,7.13,1\n\
         male,40,1st,80.0,0\n\
         male,28,engineering crew,0,0\n\
         female,35,2nd,21.0,1\n",
    )
    .unwrap();

    let dataset = DatasetLoader::new("survived").load_csv(&path).unwrap();
    assert_eq!(dataset.n_rows(), 4);
    assert_eq!(dataset.n_features(), 4);
    assert!(dataset.schema()[2].is_categorical());

    let mut obs = std::collections::BTreeMap::new();
    obs.insert("gender".to_string(), FeatureValue::from("female"));
    obs.insert("age".to_string(), FeatureValue::from(16.0));
    obs.insert("class".to_string(), FeatureValue::from("3rd"));
    obs.insert("fare".to_string(), FeatureValue::from(7.13));
    let row = dataset.encode_observation(&obs).unwrap();
    assert_eq!(row.to_vec(), dataset.features().row(0).to_vec());

    std::fs::remove_dir_all(&dir).unwrap();
}

// ============================================================================
// Stratified split
// ============================================================================

#[test]
fn test_split_preserves_label_proportion() {
    let data = titanic_like(1000, 42).unwrap();
    let split = stratified_split(data.labels(), 0.75, 42).unwrap();

    let overall = data.positive_rate();
    let train = label_proportion(data.labels(), &split.train_indices);
    let test = label_proportion(data.labels(), &split.test_indices);
    assert!((train - overall).abs() < 0.02, "train {} vs {}", train, overall);
    assert!((test - overall).abs() < 0.02, "test {} vs {}", test, overall);

    let n_train = split.train_indices.len();
    assert!((748..=752).contains(&n_train), "n_train = {}", n_train);
}

#[test]
fn test_split_is_partition_and_repeatable() {
    let data = titanic_like(300, 1).unwrap();
    let a = stratified_split(data.labels(), 0.75, 9).unwrap();
    let b = stratified_split(data.labels(), 0.75, 9).unwrap();
    assert_eq!(a, b);

    let mut all: Vec<usize> = a.train_indices.iter().chain(&a.test_indices).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..300).collect::<Vec<_>>());

    let c = stratified_split(data.labels(), 0.75, 10).unwrap();
    assert_ne!(a.train_indices, c.train_indices);
}

#[test]
fn test_split_apply_keeps_schema() {
    let data = titanic_like(200, 2).unwrap();
    let split = stratified_split(data.labels(), 0.75, 2).unwrap();
    let (train, test) = split.apply(&data).unwrap();
    assert_eq!(train.n_rows() + test.n_rows(), 200);
    assert_eq!(train.schema(), data.schema());
    assert_eq!(test.label_encoding(), data.label_encoding());
}

#[test]
fn test_split_rejects_tiny_stratum() {
    let labels = Array1::from(vec![0.0, 0.0, 0.0, 1.0]);
    match stratified_split(&labels, 0.75, 0) {
        Err(ExplainError::Stratification { stratum_size, .. }) => assert_eq!(stratum_size, 1),
        other => panic!("expected stratification error, got {:?}", other),
    }
}

#[test]
fn test_example_passenger_encodes_against_fixture() {
    let data = titanic_like(50, 0).unwrap();
    let row = data.encode_observation(&example_passenger()).unwrap();
    assert_eq!(row.len(), 7);
    // gender "female" is level 0, class "3rd" is level 2
    assert_eq!(row[0], 0.0);
    assert_eq!(row[1], 16.0);
    assert_eq!(row[2], 2.0);
}
