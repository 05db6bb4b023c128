//! End-to-end explanation pipeline
//!
//! Stages run in a fixed order and hand owned values to each other:
//!
//! 1. [`Pipeline::prepare`]: stratified train/test split and CV folds
//! 2. [`Pipeline::select_model`]: grid search and the final forest
//! 3. [`Pipeline::explainer`]: binds the forest to the training partition
//! 4. [`Pipeline::explain`]: local and global explanations
//!
//! [`Pipeline::run`] chains them into a [`PipelineOutcome`] whose artifacts
//! can be written as JSON with [`PipelineOutcome::write_artifacts`].

use crate::config::{PipelineConfig, Stage};
use crate::data::{stratified_split, Dataset, FeatureValue, TrainTestSplit};
use crate::error::{ExplainError, Result};
use crate::explainability::{
    BreakDown, BreakDownExplainer, Explainer, FeatureImportance, PartialDependence,
    PartialDependence2D, PartialDependenceProfile, PermutationImportance, ShapExplainer,
    ShapExplanation,
};
use crate::optimizer::{fit_final, GridSearch, SearchResult};
use crate::training::{CVSplit, ForestParams, ModelMetrics, RandomForest, StratifiedKFold};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Output of the preparation stage
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub split: TrainTestSplit,
    pub train: Dataset,
    pub test: Dataset,
    /// Folds over the training partition
    pub folds: Vec<CVSplit>,
}

/// Output of the model selection stage
#[derive(Debug)]
pub struct ModelSelection {
    pub search: SearchResult,
    pub params: ForestParams,
    pub model: RandomForest,
    /// Held-out performance of the final forest
    pub test_metrics: ModelMetrics,
}

/// Output of the explanation stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanations {
    /// Feature values of the explained observation, rendered with levels
    pub observation: BTreeMap<String, String>,
    pub break_down: BreakDown,
    pub shap: ShapExplanation,
    pub importance: FeatureImportance,
    pub profiles: Vec<PartialDependenceProfile>,
    pub surface: Option<PartialDependence2D>,
    /// Performance of the model on the explainer's reference table
    pub performance: ModelMetrics,
}

/// Headline numbers of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub generated_at: String,
    pub seed: u64,
    pub target: String,
    pub positive_label: String,
    pub n_rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub train_positive_rate: f64,
    pub test_positive_rate: f64,
    pub n_folds: usize,
    pub n_candidates: usize,
    pub best_params: ForestParams,
    pub cv_auc: f64,
    pub oob_auc: Option<f64>,
    pub train_metrics: ModelMetrics,
    pub test_metrics: ModelMetrics,
    pub baseline: f64,
    pub prediction: f64,
    /// Features by importance, largest first
    pub top_features: Vec<(String, f64)>,
    pub low_confidence_points: usize,
    pub elapsed_secs: f64,
}

/// Everything a run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub prepared: PreparedData,
    pub selection: ModelSelection,
    pub explanations: Explanations,
    pub summary: Summary,
}

impl PipelineOutcome {
    /// Write every artifact as pretty JSON into `dir`, creating it if needed
    pub fn write_artifacts(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let e = &self.explanations;
        let mut written = vec![
            write_json(dir, "break_down.json", &e.break_down)?,
            write_json(dir, "shap.json", &e.shap)?,
            write_json(dir, "feature_importance.json", &e.importance)?,
            write_json(dir, "model_selection.json", &self.selection.search)?,
        ];
        for profile in &e.profiles {
            let name = format!("partial_dependence_{}.json", file_stem(&profile.feature));
            written.push(write_json(dir, &name, profile)?);
        }
        if let Some(surface) = &e.surface {
            let name = format!(
                "partial_dependence_{}_{}.json",
                file_stem(&surface.features.0),
                file_stem(&surface.features.1)
            );
            written.push(write_json(dir, &name, surface)?);
        }
        written.push(write_json(dir, "summary.json", &self.summary)?);

        info!(dir = %dir.display(), n_files = written.len(), "Artifacts written");
        Ok(written)
    }
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
    debug!(path = %path.display(), "Artifact written");
    Ok(path)
}

fn file_stem(feature: &str) -> String {
    feature
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Staged pipeline driven by a [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Split the table and build the resampling plan over the training rows
    pub fn prepare(&self, dataset: &Dataset) -> Result<PreparedData> {
        let split = stratified_split(
            dataset.labels(),
            self.config.split.train_fraction,
            self.config.seed_for(Stage::Split),
        )?;
        let (train, test) = split.apply(dataset)?;

        let folds = StratifiedKFold::new(self.config.search.n_folds)
            .with_random_state(self.config.seed_for(Stage::Folds))
            .split(train.labels())?;

        info!(
            n_rows = dataset.n_rows(),
            n_train = train.n_rows(),
            n_test = test.n_rows(),
            train_positive_rate = train.positive_rate(),
            test_positive_rate = test.positive_rate(),
            n_folds = folds.len(),
            "Data prepared"
        );
        Ok(PreparedData {
            split,
            train,
            test,
            folds,
        })
    }

    /// Search the grid, fit the winner on the full training partition and
    /// score it on the test partition
    pub fn select_model(&self, prepared: &PreparedData) -> Result<ModelSelection> {
        let forest = self
            .config
            .forest
            .clone()
            .with_random_state(self.config.seed_for(Stage::Forest));
        let mut search_forest = forest.clone();
        if let Some(n_trees) = self.config.search.n_trees {
            search_forest = search_forest.with_n_trees(n_trees);
        }

        let train = &prepared.train;
        let grid = self.config.search.grid(train.n_features())?;
        let search = GridSearch::new(search_forest).search(
            train.features(),
            train.labels(),
            &prepared.folds,
            &grid,
        )?;
        let params = search.best_params();

        let model = fit_final(train.features(), train.labels(), params, &forest)?;
        let test_proba = model.predict_proba(prepared.test.features())?;
        let test_metrics =
            ModelMetrics::compute_classification(prepared.test.labels(), &test_proba);

        info!(
            %params,
            cv_auc = search.best().mean_auc,
            test_auc = test_metrics.auc_roc,
            test_accuracy = test_metrics.accuracy,
            "Model selected"
        );
        Ok(ModelSelection {
            search,
            params,
            model,
            test_metrics,
        })
    }

    /// Bind the selected forest to the training partition
    pub fn explainer<'a>(
        &self,
        prepared: &PreparedData,
        selection: &'a ModelSelection,
    ) -> Result<Explainer<&'a RandomForest>> {
        Explainer::from_dataset(&selection.model, &prepared.train, &self.config.explain.label)
    }

    /// Resolve the observation to explain: `values` if given, then the
    /// configured observation, then the first test row
    pub fn observation(
        &self,
        prepared: &PreparedData,
        values: Option<&BTreeMap<String, FeatureValue>>,
    ) -> Result<Array1<f64>> {
        match values.or(self.config.explain.observation.as_ref()) {
            Some(values) => prepared.train.encode_observation(values),
            None => {
                if prepared.test.n_rows() == 0 {
                    return Err(ExplainError::DataError(
                        "test partition is empty; pass an observation to explain".to_string(),
                    ));
                }
                Ok(prepared.test.features().row(0).to_owned())
            }
        }
    }

    /// Local explanations of `observation` and global explanations of the model
    pub fn explain(
        &self,
        explainer: &Explainer<&RandomForest>,
        observation: &Array1<f64>,
    ) -> Result<Explanations> {
        let cfg = &self.config.explain;
        let start = Instant::now();

        let break_down = BreakDownExplainer::new().explain(explainer, observation)?;
        let shap = ShapExplainer::new()
            .with_b(cfg.shap_b)
            .with_seed(self.config.seed_for(Stage::Shap))
            .explain(explainer, observation)?;
        let importance = PermutationImportance::new()
            .with_n_repeats(cfg.importance_repeats)
            .with_seed(self.config.seed_for(Stage::Permutation))
            .with_loss(cfg.importance_loss)
            .with_type(cfg.importance_type)
            .with_n_sample(cfg.importance_n_sample)
            .compute(explainer)?;

        let pdp_seed = self.config.seed_for(Stage::PartialDependence);
        let mut profiles = Vec::with_capacity(cfg.pdp_features.len());
        for feature in &cfg.pdp_features {
            let mut pdp = PartialDependence::new()
                .with_grid_points(cfg.pdp_grid_points)
                .with_grid_type(cfg.pdp_grid_type)
                .with_seed(pdp_seed);
            if let Some(group) = cfg.pdp_group_by.as_ref().filter(|g| *g != feature) {
                pdp = pdp.with_group_by(group.clone());
            }
            if let Some(max) = cfg.max_ice_curves {
                pdp = pdp.with_ice(max);
            }
            profiles.push(pdp.compute(explainer, feature)?);
        }

        let surface = match &cfg.pdp_2d {
            Some((f1, f2)) => Some(
                PartialDependence::new()
                    .with_grid_points(cfg.pdp_2d_grid_points)
                    .with_grid_type(cfg.pdp_grid_type)
                    .compute_2d(explainer, f1, f2)?,
            ),
            None => None,
        };

        let observation_values = explainer
            .schema()
            .iter()
            .zip(observation.iter())
            .map(|(s, &v)| (s.name.clone(), s.format_value(v)))
            .collect();

        info!(
            prediction = break_down.prediction,
            baseline = break_down.intercept,
            n_profiles = profiles.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Explanations computed"
        );
        Ok(Explanations {
            observation: observation_values,
            break_down,
            shap,
            importance,
            profiles,
            surface,
            performance: explainer.model_performance(),
        })
    }

    /// Run every stage on `dataset`
    pub fn run(
        &self,
        dataset: &Dataset,
        observation: Option<&BTreeMap<String, FeatureValue>>,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        info!(seed = self.config.seed, "Pipeline started");

        let prepared = self.prepare(dataset)?;
        let selection = self.select_model(&prepared)?;
        let explanations = {
            let explainer = self.explainer(&prepared, &selection)?;
            let observation = self.observation(&prepared, observation)?;
            self.explain(&explainer, &observation)?
        };

        let summary = self.summarize(
            dataset,
            &prepared,
            &selection,
            &explanations,
            start.elapsed().as_secs_f64(),
        );
        info!(elapsed_secs = summary.elapsed_secs, "Pipeline finished");
        Ok(PipelineOutcome {
            prepared,
            selection,
            explanations,
            summary,
        })
    }

    fn summarize(
        &self,
        dataset: &Dataset,
        prepared: &PreparedData,
        selection: &ModelSelection,
        explanations: &Explanations,
        elapsed_secs: f64,
    ) -> Summary {
        let low_confidence_points = explanations
            .profiles
            .iter()
            .map(|p| p.low_confidence_points().len())
            .sum();

        Summary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            seed: self.config.seed,
            target: dataset.label_encoding().target.clone(),
            positive_label: dataset.label_encoding().positive.clone(),
            n_rows: dataset.n_rows(),
            n_train: prepared.train.n_rows(),
            n_test: prepared.test.n_rows(),
            train_positive_rate: prepared.train.positive_rate(),
            test_positive_rate: prepared.test.positive_rate(),
            n_folds: prepared.folds.len(),
            n_candidates: selection.search.candidates.len(),
            best_params: selection.params,
            cv_auc: selection.search.best().mean_auc,
            oob_auc: selection.model.oob_score_value(),
            train_metrics: explanations.performance.clone(),
            test_metrics: selection.test_metrics.clone(),
            baseline: explanations.break_down.intercept,
            prediction: explanations.break_down.prediction,
            top_features: explanations
                .importance
                .top_k(explanations.importance.features.len())
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            low_confidence_points,
            elapsed_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{example_passenger, titanic_like};
    use crate::optimizer::{ForestConfig, SearchConfig};

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::new()
            .with_seed(11)
            .with_search(SearchConfig::new().with_n_folds(3).with_grid_levels(2))
            .with_forest(ForestConfig::new().with_n_trees(15));
        config.explain.shap_b = 5;
        config.explain.importance_repeats = 2;
        config.explain.pdp_grid_points = 6;
        config.explain.max_ice_curves = Some(10);
        config
    }

    #[test]
    fn test_prepare_partitions_rows() {
        let data = titanic_like(200, 3).unwrap();
        let pipeline = Pipeline::new(small_config()).unwrap();
        let prepared = pipeline.prepare(&data).unwrap();

        assert_eq!(prepared.train.n_rows() + prepared.test.n_rows(), 200);
        assert_eq!(prepared.folds.len(), 3);
        let validated: usize = prepared.folds.iter().map(|f| f.test_indices.len()).sum();
        assert_eq!(validated, prepared.train.n_rows());
    }

    #[test]
    fn test_observation_resolution() {
        let data = titanic_like(120, 5).unwrap();
        let pipeline = Pipeline::new(small_config()).unwrap();
        let prepared = pipeline.prepare(&data).unwrap();

        let first_test = pipeline.observation(&prepared, None).unwrap();
        assert_eq!(first_test, prepared.test.features().row(0).to_owned());

        let passenger = example_passenger();
        let encoded = pipeline.observation(&prepared, Some(&passenger)).unwrap();
        assert_eq!(encoded.len(), data.n_features());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Age"), "age");
        assert_eq!(file_stem("sib sp/2"), "sib_sp_2");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = small_config().with_train_fraction(0.0);
        assert!(Pipeline::new(config).is_err());
    }
}
