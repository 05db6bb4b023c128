//! Kolosal Explain CLI Module
//!
//! Command-line interface for running the explanation pipeline.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::data::{fixtures, Dataset, FeatureValue};
use crate::optimizer::{ForestConfig, SearchConfig};
use crate::pipeline::{Pipeline, PipelineOutcome};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 190, 90) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn signed(v: f64) -> String {
    format!("{:+.4}", v)
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-explain")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Random forest training and model explanation")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline on a CSV file
    Run {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for JSON artifacts
        #[arg(short, long, default_value = "explain_output")]
        output: PathBuf,

        /// Observation to explain (JSON object of feature values)
        #[arg(long)]
        observation: Option<PathBuf>,
    },

    /// Run the pipeline on the built-in Titanic-like table
    Demo {
        /// Number of generated passengers
        #[arg(short, long, default_value = "800")]
        rows: usize,

        /// Directory for JSON artifacts
        #[arg(short, long, default_value = "explain_output")]
        output: PathBuf,
    },

    /// Write the default configuration
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "explain_config.json")]
        output: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn load_observation(path: &Path) -> anyhow::Result<BTreeMap<String, FeatureValue>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    observation_path: Option<&Path>,
) -> anyhow::Result<()> {
    section("Run");

    let config = match config_path {
        Some(path) => {
            step_run(&format!("Loading config {}", path.display()));
            let config = PipelineConfig::from_file(path)?;
            step_done("");
            config
        }
        None => PipelineConfig::new(),
    };

    step_run("Loading data");
    let start = Instant::now();
    let dataset = config.data.loader().load_csv(data_path)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        start.elapsed()
    ));

    let observation = observation_path.map(load_observation).transpose()?;
    run_pipeline(config, &dataset, observation.as_ref(), output)
}

pub fn cmd_demo(rows: usize, output: &Path) -> anyhow::Result<()> {
    section("Demo");

    let mut config = PipelineConfig::new()
        .with_search(SearchConfig::new().with_n_folds(5).with_n_trees(50))
        .with_forest(ForestConfig::new().with_n_trees(100));
    config.explain.pdp_2d = Some(("age".to_string(), "fare".to_string()));

    step_run("Generating passengers");
    let dataset = fixtures::titanic_like(rows, config.seed)?;
    step_done(&format!(
        "{} rows, {:.1}% survived",
        dataset.n_rows(),
        100.0 * dataset.positive_rate()
    ));

    let passenger = fixtures::example_passenger();
    run_pipeline(config, &dataset, Some(&passenger), output)
}

pub fn cmd_init_config(output: &Path) -> anyhow::Result<()> {
    PipelineConfig::new().to_file(output)?;
    step_ok(&format!("Default configuration written to {}", output.display()));
    Ok(())
}

fn run_pipeline(
    config: PipelineConfig,
    dataset: &Dataset,
    observation: Option<&BTreeMap<String, FeatureValue>>,
    output: &Path,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;

    step_run("Training and explaining");
    let start = Instant::now();
    let outcome = pipeline.run(dataset, observation)?;
    step_done(&format!("{:?}", start.elapsed()));

    let written = outcome.write_artifacts(output)?;
    print_outcome(&outcome);

    section("Artifacts");
    for path in &written {
        step_ok(&path.display().to_string());
    }
    println!();
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    let s = &outcome.summary;
    let e = &outcome.explanations;

    println!();
    line_box_top();
    line_box(&format!("{}", "Kolosal Explain".white().bold()));
    line_box(&kv("Rows", &format!("{} train / {} test", s.n_train, s.n_test)));
    line_box(&kv("Best", &format!("{}", s.best_params)));
    line_box(&kv("CV AUC", &format!("{:.4}", s.cv_auc)));
    line_box(&kv("Test AUC", &format!("{:.4}", s.test_metrics.auc_roc)));
    line_box_bottom();

    section("Model selection");
    for (rank, candidate) in outcome.selection.search.ranked().into_iter().take(5).enumerate() {
        println!(
            "  {:>2}. {:<22} {} {}",
            rank + 1,
            candidate.params.to_string(),
            format!("{:.4}", candidate.mean_auc).white(),
            dim(&format!("± {:.4}", candidate.std_auc))
        );
    }

    section("Observation");
    for (name, value) in &e.observation {
        println!("  {}", kv(&format!("{:<12}", name), value));
    }

    section("Break-down");
    println!("  {:<26} {}", muted("intercept"), format!("{:.4}", e.break_down.intercept).white());
    for step in &e.break_down.steps {
        println!(
            "  {:<26} {}",
            muted(&format!("{} = {}", step.feature, step.value)),
            signed(step.contribution).white()
        );
    }
    println!("  {:<26} {}", muted("prediction"), format!("{:.4}", e.break_down.prediction).white().bold());

    section(&format!("SHAP (B = {})", e.shap.b));
    for f in e.shap.sorted() {
        println!(
            "  {:<26} {} {}",
            muted(&format!("{} = {}", f.feature, f.value)),
            signed(f.mean).white(),
            dim(&format!("[{:+.4}, {:+.4}]", f.min, f.max))
        );
    }

    section(&format!("Permutation importance ({})", e.importance.loss_function.name()));
    println!("  {:<16} {}", muted("full model"), format!("{:.4}", e.importance.full_model.mean).white());
    for row in e.importance.sorted() {
        println!(
            "  {:<16} {} {}",
            muted(&row.variable),
            format!("{:.4}", row.mean).white(),
            dim(&format!("± {:.4}", row.std))
        );
    }
    println!("  {:<16} {}", muted("baseline"), format!("{:.4}", e.importance.baseline.mean).white());

    if !e.profiles.is_empty() {
        section("Partial dependence");
        for profile in &e.profiles {
            let flagged = profile.low_confidence_points().len();
            let note = if flagged > 0 {
                warn(&format!("{} unsupported points", flagged))
            } else {
                dim("")
            };
            println!(
                "  {:<16} {} {}",
                muted(&profile.feature),
                kv("range", &format!("{:.4}", profile.overall.range())),
                note
            );
            for group in &profile.groups {
                println!(
                    "    {:<14} {}",
                    dim(group.group.as_deref().unwrap_or("")),
                    kv("range", &format!("{:.4}", group.range()))
                );
            }
        }
        if let Some(surface) = &e.surface {
            println!(
                "  {:<16} {}",
                muted(&format!("{} × {}", surface.features.0, surface.features.1)),
                kv("H²", &format!("{:.4}", surface.h_statistic))
            );
        }
    }
}
