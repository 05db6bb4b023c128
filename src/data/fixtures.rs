//! Deterministic Titanic-like table for demos, tests and benchmarks
//!
//! Mirrors the column layout of the imputed Titanic data (passengers and
//! crew): gender, age, class, embarked, fare, sibsp, parch, survived. Survival
//! is drawn from a logistic model dominated by gender and class, with a child
//! bonus, so the overall survival rate lands near one third.

use super::{Dataset, FeatureSchema, FeatureValue, LabelEncoding};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

pub const GENDERS: [&str; 2] = ["female", "male"];
pub const CLASSES: [&str; 7] = [
    "1st",
    "2nd",
    "3rd",
    "deck crew",
    "engineering crew",
    "restaurant staff",
    "victualling crew",
];
pub const PORTS: [&str; 4] = ["Belfast", "Cherbourg", "Queenstown", "Southampton"];

// Relative class sizes of the full passenger + crew list
const CLASS_WEIGHTS: [f64; 7] = [324.0, 284.0, 709.0, 66.0, 324.0, 69.0, 431.0];

/// Feature schema of the Titanic-like table
pub fn titanic_schema() -> Vec<FeatureSchema> {
    vec![
        FeatureSchema::categorical("gender", GENDERS.to_vec()),
        FeatureSchema::numeric("age"),
        FeatureSchema::categorical("class", CLASSES.to_vec()),
        FeatureSchema::categorical("embarked", PORTS.to_vec()),
        FeatureSchema::numeric("fare"),
        FeatureSchema::numeric("sibsp"),
        FeatureSchema::numeric("parch"),
    ]
}

/// Generate `n_rows` passengers and crew members
pub fn titanic_like(n_rows: usize, seed: u64) -> Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Array2::zeros((n_rows, 7));
    let mut labels = Array1::zeros(n_rows);

    for i in 0..n_rows {
        let class = weighted_choice(&mut rng, &CLASS_WEIGHTS);
        let crew = class >= 3;

        let female_share = match class {
            0 => 0.45,
            1 => 0.37,
            2 => 0.30,
            5 => 0.04,
            6 => 0.05,
            _ => 0.0,
        };
        let gender = if rng.gen::<f64>() < female_share { 0 } else { 1 };

        let age = if crew {
            clamp_round(18.0 + 40.0 * irwin_hall(&mut rng), 16.0, 65.0)
        } else {
            clamp_round(2.0 + 60.0 * irwin_hall(&mut rng), 0.0, 74.0)
        };

        let embarked = if crew {
            if rng.gen::<f64>() < 0.1 { 0 } else { 3 }
        } else {
            weighted_choice(&mut rng, &[0.02, 0.19, 0.09, 0.70])
        };

        let fare = match class {
            0 => 26.0 + 180.0 * rng.gen::<f64>().powi(2),
            1 => 10.5 + 30.0 * rng.gen::<f64>(),
            2 => 6.9 + 18.0 * rng.gen::<f64>().powi(3),
            _ => 0.0,
        };
        let fare = (fare * 100.0).round() / 100.0;

        let (sibsp, parch) = if crew {
            (0.0, 0.0)
        } else {
            (
                weighted_choice(&mut rng, &[0.68, 0.23, 0.05, 0.04]) as f64,
                if age < 14.0 {
                    1.0 + weighted_choice(&mut rng, &[0.7, 0.3]) as f64
                } else {
                    weighted_choice(&mut rng, &[0.80, 0.12, 0.08]) as f64
                },
            )
        };

        let mut logit: f64 = -1.35;
        if gender == 0 {
            logit += 2.3;
        }
        logit += [1.0, 0.15, -0.75, 0.9, -0.15, -2.0, -0.4][class];
        if age < 10.0 {
            logit += 1.2;
        } else if age > 60.0 {
            logit -= 0.6;
        }
        if embarked == 1 {
            logit += 0.3;
        }
        logit -= 0.25 * (sibsp + parch - 1.0).max(0.0);
        let p_survive = 1.0 / (1.0 + (-logit).exp());

        features[[i, 0]] = gender as f64;
        features[[i, 1]] = age;
        features[[i, 2]] = class as f64;
        features[[i, 3]] = embarked as f64;
        features[[i, 4]] = fare;
        features[[i, 5]] = sibsp;
        features[[i, 6]] = parch;
        labels[i] = if rng.gen::<f64>() < p_survive { 1.0 } else { 0.0 };
    }

    Dataset::new(
        features,
        titanic_schema(),
        labels,
        LabelEncoding::new("survived", "0", "1"),
    )
}

/// A 16-year-old girl travelling alone in 3rd class from Southampton
pub fn example_passenger() -> BTreeMap<String, FeatureValue> {
    let mut obs = BTreeMap::new();
    obs.insert("gender".to_string(), FeatureValue::from("female"));
    obs.insert("age".to_string(), FeatureValue::from(16.0));
    obs.insert("class".to_string(), FeatureValue::from("3rd"));
    obs.insert("embarked".to_string(), FeatureValue::from("Southampton"));
    obs.insert("fare".to_string(), FeatureValue::from(7.13));
    obs.insert("sibsp".to_string(), FeatureValue::from(0.0));
    obs.insert("parch".to_string(), FeatureValue::from(0.0));
    obs
}

fn weighted_choice<R: Rng>(rng: &mut R, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut draw = rng.gen::<f64>() * total;
    for (idx, &w) in weights.iter().enumerate() {
        if draw < w {
            return idx;
        }
        draw -= w;
    }
    weights.len() - 1
}

/// Bell-shaped draw on [0, 1]
fn irwin_hall<R: Rng>(rng: &mut R) -> f64 {
    (0..4).map(|_| rng.gen::<f64>()).sum::<f64>() / 4.0
}

fn clamp_round(v: f64, lo: f64, hi: f64) -> f64 {
    v.clamp(lo, hi).round()
}
