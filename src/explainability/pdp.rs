//! Partial dependence profiles and individual conditional expectation

use super::explainer::Explainer;
use crate::data::FeatureSchema;
use crate::error::{ExplainError, Result};
use crate::training::ProbabilisticClassifier;
use ndarray::{Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How grid values are placed over a numeric feature's range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridType {
    /// Empirical quantiles at evenly spaced probabilities
    #[default]
    Quantile,
    /// Evenly spaced between min and max
    Uniform,
}

/// One grid value of a profile curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePoint {
    pub value: f64,
    /// Rendered value (the level name for categorical features)
    pub label: String,
    /// Mean prediction with the feature set to `value`
    pub mean_prediction: f64,
    /// Rows observed at this value, see [`PartialDependence`]
    pub n_support: usize,
    /// No observed rows support this value; the mean is extrapolated
    pub low_confidence: bool,
}

/// A profile over the whole table or one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCurve {
    /// Group level, `None` for the whole table
    pub group: Option<String>,
    pub n_rows: usize,
    pub points: Vec<ProfilePoint>,
}

impl ProfileCurve {
    pub fn mean_predictions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean_prediction).collect()
    }

    /// Difference between the highest and lowest point
    pub fn range(&self) -> f64 {
        let (lo, hi) = self
            .points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.mean_prediction), hi.max(p.mean_prediction))
            });
        if self.points.is_empty() {
            0.0
        } else {
            hi - lo
        }
    }
}

/// Per-row curves, possibly a display subsample of the reference rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCurves {
    /// Reference rows the curves belong to
    pub row_indices: Vec<usize>,
    /// Predictions per row over the grid
    pub predictions: Vec<Vec<f64>>,
    /// Predictions minus each row's value at the first grid point
    pub centered: Vec<Vec<f64>>,
    /// True when fewer curves than reference rows are returned
    pub subsampled: bool,
}

/// Partial dependence of the prediction on one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDependenceProfile {
    pub label: String,
    pub feature: String,
    pub feature_index: usize,
    pub categorical: bool,
    pub grid: Vec<f64>,
    /// Profile over the full reference table
    pub overall: ProfileCurve,
    pub group_by: Option<String>,
    /// One curve per observed level of `group_by`
    pub groups: Vec<ProfileCurve>,
    pub ice: Option<IceCurves>,
    /// Mean standard deviation of the ICE curves across the grid
    pub interaction_strength: f64,
}

impl PartialDependenceProfile {
    pub fn group(&self, level: &str) -> Option<&ProfileCurve> {
        self.groups
            .iter()
            .find(|c| c.group.as_deref() == Some(level))
    }

    /// Every flagged point with its group
    pub fn low_confidence_points(&self) -> Vec<(Option<&str>, &ProfilePoint)> {
        std::iter::once(&self.overall)
            .chain(&self.groups)
            .flat_map(|curve| {
                curve
                    .points
                    .iter()
                    .filter(|p| p.low_confidence)
                    .map(move |p| (curve.group.as_deref(), p))
            })
            .collect()
    }
}

/// Two-feature partial dependence surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDependence2D {
    pub label: String,
    pub features: (String, String),
    pub grid_1: Vec<f64>,
    pub grid_2: Vec<f64>,
    pub labels_1: Vec<String>,
    pub labels_2: Vec<String>,
    /// Mean prediction, shape (grid_1, grid_2)
    pub predictions: Vec<Vec<f64>>,
    pub n_support: Vec<Vec<usize>>,
    pub low_confidence: Vec<Vec<bool>>,
    /// Share of the surface's variance not explained by the two
    /// one-feature profiles (Friedman's H squared)
    pub h_statistic: f64,
}

/// Partial dependence calculator.
///
/// Support counts: for a categorical feature, the rows of the curve's group
/// holding that level; for a numeric feature, all rows of the group when the
/// grid value lies inside the group's observed range, else zero. Points with
/// zero support are kept, flagged `low_confidence` and logged.
#[derive(Debug, Clone)]
pub struct PartialDependence {
    grid_points: usize,
    grid_type: GridType,
    group_by: Option<String>,
    max_ice_curves: Option<usize>,
    seed: u64,
}

impl Default for PartialDependence {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialDependence {
    /// 101 quantile grid points, no grouping, no ICE
    pub fn new() -> Self {
        Self {
            grid_points: 101,
            grid_type: GridType::Quantile,
            group_by: None,
            max_ice_curves: None,
            seed: 42,
        }
    }

    /// Set number of grid points for numeric features
    pub fn with_grid_points(mut self, n: usize) -> Self {
        self.grid_points = n.max(2);
        self
    }

    pub fn with_grid_type(mut self, grid_type: GridType) -> Self {
        self.grid_type = grid_type;
        self
    }

    /// Add one curve per level of a categorical feature
    pub fn with_group_by(mut self, feature: impl Into<String>) -> Self {
        self.group_by = Some(feature.into());
        self
    }

    /// Return ICE curves, at most `max_curves` of them
    pub fn with_ice(mut self, max_curves: usize) -> Self {
        self.max_ice_curves = Some(max_curves);
        self
    }

    /// Seed for the ICE display subsample
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Grid for one column
    pub fn grid(&self, column: ArrayView1<f64>, schema: &FeatureSchema) -> Vec<f64> {
        if let Some(levels) = schema.levels() {
            return (0..levels.len()).map(|l| l as f64).collect();
        }

        let mut values: Vec<f64> = column.iter().copied().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let (Some(&lo), Some(&hi)) = (values.first(), values.last()) else {
            return Vec::new();
        };

        let n = self.grid_points;
        let mut grid: Vec<f64> = match self.grid_type {
            GridType::Quantile => (0..n)
                .map(|i| quantile_sorted(&values, i as f64 / (n - 1) as f64))
                .collect(),
            GridType::Uniform => (0..n)
                .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
                .collect(),
        };
        grid.dedup();
        grid
    }

    /// Profile of the prediction over `feature`
    pub fn compute<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        feature: &str,
    ) -> Result<PartialDependenceProfile> {
        let j = explainer.feature_index(feature)?;
        let schema = &explainer.schema()[j];
        let data = explainer.data();
        let n_rows = data.nrows();

        let group_idx = match &self.group_by {
            Some(name) => {
                let g = explainer.feature_index(name)?;
                if g == j || !explainer.schema()[g].is_categorical() {
                    return Err(ExplainError::invalid_parameter(
                        "group_by",
                        name,
                        "must be a categorical feature other than the profiled one",
                    ));
                }
                Some(g)
            }
            None => None,
        };

        let grid = self.grid(data.column(j), schema);
        let ice = ice_matrix(explainer, j, &grid)?;

        let all_rows: Vec<usize> = (0..n_rows).collect();
        let overall = curve(explainer, j, &grid, &ice, None, &all_rows);

        let mut groups = Vec::new();
        if let Some(g) = group_idx {
            let group_schema = &explainer.schema()[g];
            for (code, level) in group_schema.levels().unwrap_or_default().iter().enumerate() {
                let rows: Vec<usize> = (0..n_rows)
                    .filter(|&r| data[[r, g]] == code as f64)
                    .collect();
                if rows.is_empty() {
                    debug!(group = %level, "Group level has no reference rows");
                    continue;
                }
                groups.push(curve(explainer, j, &grid, &ice, Some(level.clone()), &rows));
            }
        }

        let interaction_strength = mean_column_std(&ice, grid.len());
        let ice_curves = self.max_ice_curves.map(|max| self.ice_curves(&ice, max));

        let profile = PartialDependenceProfile {
            label: explainer.label().to_string(),
            feature: feature.to_string(),
            feature_index: j,
            categorical: schema.is_categorical(),
            grid,
            overall,
            group_by: self.group_by.clone(),
            groups,
            ice: ice_curves,
            interaction_strength,
        };

        for curve in std::iter::once(&profile.overall).chain(&profile.groups) {
            let flagged: Vec<&str> = curve
                .points
                .iter()
                .filter(|p| p.low_confidence)
                .map(|p| p.label.as_str())
                .collect();
            if !flagged.is_empty() {
                warn!(
                    feature,
                    group = curve.group.as_deref().unwrap_or("all"),
                    values = ?flagged,
                    "Partial dependence points without supporting observations"
                );
            }
        }

        debug!(
            feature,
            n_grid = profile.grid.len(),
            n_groups = profile.groups.len(),
            range = profile.overall.range(),
            "Partial dependence computed"
        );
        Ok(profile)
    }

    /// Mean prediction over a grid of two features
    pub fn compute_2d<M: ProbabilisticClassifier>(
        &self,
        explainer: &Explainer<M>,
        feature_1: &str,
        feature_2: &str,
    ) -> Result<PartialDependence2D> {
        let f1 = explainer.feature_index(feature_1)?;
        let f2 = explainer.feature_index(feature_2)?;
        if f1 == f2 {
            return Err(ExplainError::invalid_parameter(
                "feature_2",
                feature_2,
                "must differ from feature_1",
            ));
        }

        let data = explainer.data();
        let schema = explainer.schema();
        let grid_1 = self.grid(data.column(f1), &schema[f1]);
        let grid_2 = self.grid(data.column(f2), &schema[f2]);

        let cells: Vec<(usize, usize)> = (0..grid_1.len())
            .flat_map(|a| (0..grid_2.len()).map(move |b| (a, b)))
            .collect();
        let means = cells
            .par_iter()
            .map(|&(a, b)| -> Result<f64> {
                let mut modified = data.clone();
                modified.column_mut(f1).fill(grid_1[a]);
                modified.column_mut(f2).fill(grid_2[b]);
                explainer.mean_prediction(&modified)
            })
            .collect::<Result<Vec<f64>>>()?;

        let predictions: Vec<Vec<f64>> = means
            .chunks(grid_2.len().max(1))
            .map(|row| row.to_vec())
            .collect();

        let all_rows: Vec<usize> = (0..data.nrows()).collect();
        let n_support: Vec<Vec<usize>> = grid_1
            .iter()
            .map(|&v1| {
                grid_2
                    .iter()
                    .map(|&v2| support(data, schema, &all_rows, &[(f1, v1), (f2, v2)]))
                    .collect()
            })
            .collect();
        let low_confidence: Vec<Vec<bool>> = n_support
            .iter()
            .map(|row| row.iter().map(|&n| n == 0).collect())
            .collect();

        let n_flagged = low_confidence.iter().flatten().filter(|&&f| f).count();
        if n_flagged > 0 {
            warn!(
                feature_1,
                feature_2,
                n_cells = n_flagged,
                "Partial dependence cells without supporting observations"
            );
        }

        let pd_1 = marginal(explainer, f1, &grid_1)?;
        let pd_2 = marginal(explainer, f2, &grid_2)?;
        let h_statistic = h_statistic(&predictions, &pd_1, &pd_2);

        Ok(PartialDependence2D {
            label: explainer.label().to_string(),
            features: (feature_1.to_string(), feature_2.to_string()),
            labels_1: grid_1.iter().map(|&v| schema[f1].format_value(v)).collect(),
            labels_2: grid_2.iter().map(|&v| schema[f2].format_value(v)).collect(),
            grid_1,
            grid_2,
            predictions,
            n_support,
            low_confidence,
            h_statistic,
        })
    }

    fn ice_curves(&self, ice: &Array2<f64>, max_curves: usize) -> IceCurves {
        let n_rows = ice.nrows();
        let row_indices: Vec<usize> = if n_rows > max_curves {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            let mut rows = index::sample(&mut rng, n_rows, max_curves).into_vec();
            rows.sort_unstable();
            rows
        } else {
            (0..n_rows).collect()
        };

        let predictions: Vec<Vec<f64>> = row_indices.iter().map(|&r| ice.row(r).to_vec()).collect();
        let centered = predictions
            .iter()
            .map(|curve| {
                let anchor = curve.first().copied().unwrap_or(0.0);
                curve.iter().map(|p| p - anchor).collect()
            })
            .collect();

        IceCurves {
            subsampled: row_indices.len() < n_rows,
            row_indices,
            predictions,
            centered,
        }
    }
}

/// Type-7 quantile of sorted, non-empty `values`
fn quantile_sorted(values: &[f64], q: f64) -> f64 {
    let h = (values.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    values[lo] + (h - lo as f64) * (values[hi] - values[lo])
}

/// Predictions with column `j` set to each grid value; shape (rows, grid)
fn ice_matrix<M: ProbabilisticClassifier>(
    explainer: &Explainer<M>,
    j: usize,
    grid: &[f64],
) -> Result<Array2<f64>> {
    let data = explainer.data();
    let columns = grid
        .par_iter()
        .map(|&value| {
            let mut modified = data.clone();
            modified.column_mut(j).fill(value);
            explainer.predict(&modified)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut ice = Array2::zeros((data.nrows(), grid.len()));
    for (g, column) in columns.iter().enumerate() {
        ice.column_mut(g).assign(column);
    }
    Ok(ice)
}

fn curve<M: ProbabilisticClassifier>(
    explainer: &Explainer<M>,
    j: usize,
    grid: &[f64],
    ice: &Array2<f64>,
    group: Option<String>,
    rows: &[usize],
) -> ProfileCurve {
    let schema = explainer.schema();
    let points = grid
        .iter()
        .enumerate()
        .map(|(g, &value)| {
            let mean_prediction =
                rows.iter().map(|&r| ice[[r, g]]).sum::<f64>() / rows.len().max(1) as f64;
            let n_support = support(explainer.data(), schema, rows, &[(j, value)]);
            ProfilePoint {
                value,
                label: schema[j].format_value(value),
                mean_prediction,
                n_support,
                low_confidence: n_support == 0,
            }
        })
        .collect();

    ProfileCurve {
        group,
        n_rows: rows.len(),
        points,
    }
}

/// Rows among `rows` that support a combination of feature values.
///
/// Categorical conditions narrow the rows to those holding the level; each
/// numeric value must then lie within the remaining rows' observed range.
fn support(
    data: &Array2<f64>,
    schema: &[FeatureSchema],
    rows: &[usize],
    conditions: &[(usize, f64)],
) -> usize {
    let matching: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&r| {
            conditions
                .iter()
                .filter(|(j, _)| schema[*j].is_categorical())
                .all(|&(j, value)| data[[r, j]] == value)
        })
        .collect();

    let in_range = conditions
        .iter()
        .filter(|(j, _)| !schema[*j].is_categorical())
        .all(|&(j, value)| {
            let (lo, hi) = matching
                .iter()
                .map(|&r| data[[r, j]])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            value >= lo && value <= hi
        });

    if in_range {
        matching.len()
    } else {
        0
    }
}

/// One-feature partial dependence over the full table
fn marginal<M: ProbabilisticClassifier>(
    explainer: &Explainer<M>,
    j: usize,
    grid: &[f64],
) -> Result<Vec<f64>> {
    let ice = ice_matrix(explainer, j, grid)?;
    Ok(ice
        .mean_axis(ndarray::Axis(0))
        .map(|m| m.to_vec())
        .unwrap_or_default())
}

fn h_statistic(surface: &[Vec<f64>], pd_1: &[f64], pd_2: &[f64]) -> f64 {
    let n_cells = (pd_1.len() * pd_2.len()) as f64;
    if n_cells == 0.0 {
        return 0.0;
    }
    let total_mean = surface.iter().flatten().sum::<f64>() / n_cells;
    let mean_1 = pd_1.iter().sum::<f64>() / pd_1.len() as f64;
    let mean_2 = pd_2.iter().sum::<f64>() / pd_2.len() as f64;

    let mut ss_residual = 0.0;
    let mut ss_total = 0.0;
    for (a, row) in surface.iter().enumerate() {
        for (b, &pred) in row.iter().enumerate() {
            let additive = (pd_1[a] - mean_1) + (pd_2[b] - mean_2) + total_mean;
            ss_residual += (pred - additive).powi(2);
            ss_total += (pred - total_mean).powi(2);
        }
    }

    if ss_total > 0.0 {
        ss_residual / ss_total
    } else {
        0.0
    }
}

fn mean_column_std(ice: &Array2<f64>, n_grid: usize) -> f64 {
    if n_grid == 0 || ice.nrows() == 0 {
        return 0.0;
    }
    ice.std_axis(ndarray::Axis(0), 0.0).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::PredictFn;
    use ndarray::{array, Array1};

    fn linear(x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.rows()
            .into_iter()
            .map(|r| 0.1 + 0.08 * r[0])
            .collect())
    }

    fn reference() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 * 10.0 });
        let y = Array1::from_iter((0..10).map(|i| if i >= 5 { 1.0 } else { 0.0 }));
        (x, y)
    }

    #[test]
    fn test_quantile_grid() {
        let pd = PartialDependence::new().with_grid_points(5);
        let schema = FeatureSchema::numeric("x");
        let column = array![4.0, 0.0, 2.0, 1.0, 3.0];
        assert_eq!(pd.grid(column.view(), &schema), vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        let uniform = pd.clone().with_grid_type(GridType::Uniform);
        let column = array![0.0, 0.0, 0.0, 8.0];
        assert_eq!(uniform.grid(column.view(), &schema), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        // quantiles of a skewed column collapse onto repeated values
        assert_eq!(pd.grid(column.view(), &schema), vec![0.0, 2.0, 8.0]);
    }

    #[test]
    fn test_categorical_grid_is_levels() {
        let pd = PartialDependence::new();
        let schema = FeatureSchema::categorical("c", vec!["a", "b", "c"]);
        assert_eq!(pd.grid(array![0.0, 0.0].view(), &schema), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_ignored_feature_is_flat() {
        let (x, y) = reference();
        let explainer = Explainer::new(PredictFn(linear), x, y, "lm").unwrap();
        let profile = PartialDependence::new().compute(&explainer, "x2").unwrap();
        assert!(profile.overall.range() < 1e-12);

        let used = PartialDependence::new().compute(&explainer, "x1").unwrap();
        assert!((used.overall.range() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_ice_subsample_keeps_full_aggregate() {
        let (x, y) = reference();
        let explainer = Explainer::new(PredictFn(linear), x, y, "lm").unwrap();
        let full = PartialDependence::new().with_grid_points(4).compute(&explainer, "x1").unwrap();
        let sampled = PartialDependence::new()
            .with_grid_points(4)
            .with_ice(3)
            .with_seed(1)
            .compute(&explainer, "x1")
            .unwrap();

        let ice = sampled.ice.as_ref().unwrap();
        assert!(ice.subsampled);
        assert_eq!(ice.row_indices.len(), 3);
        assert_eq!(ice.centered[0][0], 0.0);
        assert_eq!(full.overall.mean_predictions(), sampled.overall.mean_predictions());
    }

    #[test]
    fn test_support_flags() {
        let data = array![[0.0, 0.0, 1.0], [0.0, 1.0, 2.0], [1.0, 1.0, 5.0]];
        let schema = vec![
            FeatureSchema::categorical("g", vec!["f", "m"]),
            FeatureSchema::categorical("c", vec!["a", "b"]),
            FeatureSchema::numeric("age"),
        ];
        let female: Vec<usize> = vec![0, 1];
        assert_eq!(support(&data, &schema, &female, &[(1, 1.0)]), 1);
        assert_eq!(support(&data, &schema, &[2], &[(1, 0.0)]), 0);
        assert_eq!(support(&data, &schema, &female, &[(2, 1.5)]), 2);
        assert_eq!(support(&data, &schema, &female, &[(2, 4.0)]), 0);
        assert_eq!(support(&data, &schema, &[0, 1, 2], &[(1, 1.0), (2, 4.0)]), 2);
    }

    #[test]
    fn test_grouped_profile_flags_unsupported_level() {
        let x = array![[0.0, 0.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![1.0, 1.0, 0.0, 0.0];
        let model = PredictFn(|x: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(x.rows().into_iter().map(|r| 0.2 + 0.3 * r[1]).collect())
        });
        let explainer = Explainer::new(model, x, y, "m")
            .unwrap()
            .with_schema(vec![
                FeatureSchema::categorical("gender", vec!["female", "male"]),
                FeatureSchema::categorical("class", vec!["3rd", "crew"]),
            ])
            .unwrap();

        let profile = PartialDependence::new()
            .with_group_by("gender")
            .compute(&explainer, "class")
            .unwrap();

        let female = profile.group("female").unwrap();
        assert_eq!(female.points[1].n_support, 0);
        assert!(female.points[1].low_confidence);
        // The value is still reported
        assert!((female.points[1].mean_prediction - 0.5).abs() < 1e-12);
        assert_eq!(profile.low_confidence_points().len(), 1);
    }

    #[test]
    fn test_group_by_must_be_categorical() {
        let (x, y) = reference();
        let explainer = Explainer::new(PredictFn(linear), x, y, "lm").unwrap();
        assert!(PartialDependence::new()
            .with_group_by("x2")
            .compute(&explainer, "x1")
            .is_err());
    }

    #[test]
    fn test_2d_additive_has_no_interaction() {
        let (x, y) = reference();
        let model = PredictFn(|x: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(x.rows().into_iter().map(|r| 0.05 + 0.05 * r[0] + 0.01 * r[1]).collect())
        });
        let explainer = Explainer::new(model, x, y, "lm").unwrap();
        let surface = PartialDependence::new()
            .with_grid_points(4)
            .compute_2d(&explainer, "x1", "x2")
            .unwrap();

        assert_eq!(surface.predictions.len(), surface.grid_1.len());
        assert_eq!(surface.predictions[0].len(), surface.grid_2.len());
        assert!(surface.h_statistic < 1e-9);
        assert!(surface.low_confidence.iter().flatten().all(|&f| !f));
    }

    #[test]
    fn test_h_statistic_detects_product() {
        let surface = vec![vec![0.0, 0.0], vec![0.0, 1.0]];
        let h = h_statistic(&surface, &[0.0, 0.5], &[0.0, 0.5]);
        assert!(h > 0.1);
    }
}
