//! CLI entry-point for rendering the latest run report.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{cli::open_store, config::Settings, report::ReportRenderer};

/// Args for the `report` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Experiment to report on.
    #[arg(long)]
    pub experiment: Option<String>,
    /// Report destination.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let experiment = args.experiment.unwrap_or(settings.experiment.clone());
    let output = args.output.unwrap_or(settings.report_file.clone());

    let store = open_store(&settings).await?;
    let outcome = ReportRenderer::new(store)
        .render(&experiment, &output)
        .await?;
    println!("{}", outcome.message());
    Ok(())
}
