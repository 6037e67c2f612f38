//! Command-line interface wiring for factsum.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    config::Settings,
    tracking::{FileStore, MlflowStore, TrackingStore},
};

pub mod prompt;
pub mod report;
pub mod run;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "Fact-grounded LLM summarization with run tracking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Run(args) => run::run(args, settings).await,
            Commands::Report(args) => report::run(args, settings).await,
            Commands::Prompt(args) => prompt::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize the facts file, record the run and write its report.
    Run(run::Args),
    /// Write the report of the latest recorded run.
    Report(report::Args),
    /// Print the prompt that would be sent, without calling the model.
    Prompt(prompt::Args),
}

/// Open the tracking store selected by `settings`.
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn TrackingStore>> {
    if let Some(uri) = &settings.mlflow_tracking_uri {
        info!(%uri, "using MLflow tracking server");
        let store = MlflowStore::new(uri.as_str()).context("building MLflow client")?;
        return Ok(Arc::new(store));
    }
    let store = FileStore::open(&settings.tracking_dir)
        .await
        .with_context(|| format!("opening tracking store {}", settings.tracking_dir.display()))?;
    Ok(Arc::new(store))
}
