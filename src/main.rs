//! Kolosal Explain - Main Entry Point
//!
//! Trains a tuned random forest and explains its predictions from the
//! command line.

use clap::Parser;
use kolosal_explain::cli::{cmd_demo, cmd_init_config, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_explain=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, output, observation } => {
            cmd_run(&data, config.as_deref(), &output, observation.as_deref())?;
        }
        Commands::Demo { rows, output } => {
            cmd_demo(rows, &output)?;
        }
        Commands::InitConfig { output } => {
            cmd_init_config(&output)?;
        }
    }

    Ok(())
}
