//! Model explainability module
//!
//! Every method works through an [`Explainer`], which binds a fitted
//! [`ProbabilisticClassifier`](crate::training::ProbabilisticClassifier) to
//! the reference table the explanations are computed against:
//! - Break-down attribution of a single prediction
//! - SHAP-style attribution averaged over random orderings
//! - Permutation feature importance
//! - Partial dependence profiles (PDP) and individual conditional
//!   expectation (ICE)

mod break_down;
mod explainer;
mod importance;
mod pdp;
mod shap;

pub use break_down::{BreakDown, BreakDownExplainer, BreakDownStep, ADDITIVITY_TOLERANCE};
pub use explainer::Explainer;
pub use importance::{
    FeatureImportance, ImportanceRow, ImportanceType, LossFunction, PermutationImportance,
    BASELINE, FULL_MODEL,
};
pub use pdp::{
    GridType, IceCurves, PartialDependence, PartialDependence2D, PartialDependenceProfile,
    ProfileCurve, ProfilePoint,
};
pub use shap::{ShapExplainer, ShapExplanation, ShapFeature, ShapSummary, ShapSummaryFeature};
