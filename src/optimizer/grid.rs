//! Regular hyperparameter grids

use crate::error::{ExplainError, Result};
use crate::training::ForestParams;
use serde::{Deserialize, Serialize};

/// An ordered, finite list of forest candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    candidates: Vec<ForestParams>,
}

/// `levels` evenly spaced integers from `lo` to `hi`, both included.
///
/// Rounded to the nearest integer and deduplicated, so a narrow range may
/// yield fewer than `levels` values.
fn levels_between(name: &str, lo: usize, hi: usize, levels: usize) -> Result<Vec<usize>> {
    if lo > hi {
        return Err(ExplainError::invalid_parameter(
            name,
            format!("[{}, {}]", lo, hi),
            "lower bound exceeds upper bound",
        ));
    }
    if levels == 0 {
        return Err(ExplainError::invalid_parameter(
            "levels",
            0,
            "must be at least 1",
        ));
    }
    if levels == 1 {
        return Ok(vec![lo]);
    }

    let step = (hi - lo) as f64 / (levels - 1) as f64;
    let mut values: Vec<usize> = (0..levels)
        .map(|i| (lo as f64 + step * i as f64).round() as usize)
        .collect();
    values.dedup();
    Ok(values)
}

impl ParamGrid {
    /// Cartesian grid over both ranges with `levels` values each; `mtry`
    /// varies fastest.
    pub fn regular(
        mtry_range: (usize, usize),
        min_n_range: (usize, usize),
        levels: usize,
    ) -> Result<Self> {
        let mtry = levels_between("mtry", mtry_range.0, mtry_range.1, levels)?;
        let min_n = levels_between("min_n", min_n_range.0, min_n_range.1, levels)?;

        let candidates = min_n
            .iter()
            .flat_map(|&n| mtry.iter().map(move |&m| ForestParams::new(m, n)))
            .collect();
        Ok(Self { candidates })
    }

    /// A grid from an explicit candidate list, kept in the given order
    pub fn from_candidates(candidates: Vec<ForestParams>) -> Self {
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[ForestParams] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForestParams> {
        self.candidates.iter()
    }

    /// Check every candidate against the feature count
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(ExplainError::ValidationError(
                "hyperparameter grid is empty".to_string(),
            ));
        }
        self.candidates
            .iter()
            .try_for_each(|params| params.validate(n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_grid_order() {
        let grid = ParamGrid::regular((1, 7), (2, 40), 3).unwrap();
        assert_eq!(grid.len(), 9);
        let pairs: Vec<(usize, usize)> = grid.iter().map(|p| (p.mtry, p.min_n)).collect();
        assert_eq!(
            pairs,
            vec![
                (1, 2),
                (4, 2),
                (7, 2),
                (1, 21),
                (4, 21),
                (7, 21),
                (1, 40),
                (4, 40),
                (7, 40),
            ]
        );
    }

    #[test]
    fn test_narrow_range_deduplicates() {
        let grid = ParamGrid::regular((1, 2), (5, 5), 4).unwrap();
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(ParamGrid::regular((5, 1), (2, 40), 3).is_err());
        assert!(ParamGrid::regular((1, 5), (2, 40), 0).is_err());
    }

    #[test]
    fn test_validate_against_features() {
        let grid = ParamGrid::regular((1, 7), (2, 40), 3).unwrap();
        assert!(grid.validate(7).is_ok());
        assert!(grid.validate(6).is_err());
        assert!(ParamGrid::from_candidates(vec![]).validate(3).is_err());
    }
}
