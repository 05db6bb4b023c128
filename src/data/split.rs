//! Stratified train/test partitioning

use super::Dataset;
use crate::error::{ExplainError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Disjoint train/test row indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    /// Materialize both partitions of a dataset
    pub fn apply(&self, data: &Dataset) -> Result<(Dataset, Dataset)> {
        Ok((
            data.select_rows(&self.train_indices)?,
            data.select_rows(&self.test_indices)?,
        ))
    }
}

/// Group row indices by label value, in ascending label order
pub(crate) fn strata(labels: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut strata: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &val) in labels.iter().enumerate() {
        strata.entry(val.round() as i64).or_default().push(idx);
    }
    strata
}

/// Split rows into train/test so each label keeps its proportion.
///
/// Each stratum is shuffled with `seed` and the first
/// `round(n_stratum * train_fraction)` rows go to train. A stratum needs at
/// least two rows so that it can appear on both sides.
pub fn stratified_split(
    labels: &Array1<f64>,
    train_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(ExplainError::invalid_parameter(
            "train_fraction",
            train_fraction,
            "must be in (0, 1)",
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::new();
    let mut test_indices = Vec::new();

    for (label, mut indices) in strata(labels) {
        if indices.len() < 2 {
            return Err(ExplainError::Stratification {
                label: label.to_string(),
                stratum_size: indices.len(),
                required: 2,
            });
        }
        indices.shuffle(&mut rng);

        let n_train = ((indices.len() as f64 * train_fraction).round() as usize)
            .clamp(1, indices.len() - 1);
        train_indices.extend_from_slice(&indices[..n_train]);
        test_indices.extend_from_slice(&indices[n_train..]);
    }

    train_indices.sort_unstable();
    test_indices.sort_unstable();

    debug!(
        n_train = train_indices.len(),
        n_test = test_indices.len(),
        train_fraction,
        "Stratified split drawn"
    );

    Ok(TrainTestSplit {
        train_indices,
        test_indices,
    })
}

/// Fraction of label-1 rows among `indices`
pub fn label_proportion(labels: &Array1<f64>, indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| labels[i]).sum::<f64>() / indices.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced_labels(n: usize, positive_every: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| if i % positive_every == 0 { 1.0 } else { 0.0 }))
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let y = imbalanced_labels(200, 3);
        let split = stratified_split(&y, 0.75, 7).unwrap();

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
        assert_eq!(split.train_indices.len(), 150);
    }

    #[test]
    fn test_split_preserves_proportions() {
        let y = imbalanced_labels(1000, 3);
        let split = stratified_split(&y, 0.75, 42).unwrap();
        let all: Vec<usize> = (0..y.len()).collect();
        let full = label_proportion(&y, &all);
        let train = label_proportion(&y, &split.train_indices);
        let test = label_proportion(&y, &split.test_indices);
        assert!((full - train).abs() <= 0.02, "train {} vs {}", train, full);
        assert!((full - test).abs() <= 0.02, "test {} vs {}", test, full);
    }

    #[test]
    fn test_split_is_deterministic() {
        let y = imbalanced_labels(100, 4);
        let a = stratified_split(&y, 0.7, 11).unwrap();
        let b = stratified_split(&y, 0.7, 11).unwrap();
        let c = stratified_split(&y, 0.7, 12).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_rejects_tiny_stratum() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let result = stratified_split(&y, 0.5, 1);
        assert!(matches!(result, Err(ExplainError::Stratification { .. })));
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let y = imbalanced_labels(10, 2);
        assert!(stratified_split(&y, 1.0, 1).is_err());
        assert!(stratified_split(&y, 0.0, 1).is_err());
    }
}
