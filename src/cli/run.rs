//! CLI entry-point for a full summarization run.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use crate::{
    cli::open_store,
    completion::GeminiClient,
    config::Settings,
    facts::load_facts,
    recorder::RunRecorder,
    report::ReportRenderer,
    summarizer::Summarizer,
};

/// Args for the `run` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// JSON facts file.
    #[arg(long)]
    pub facts: Option<PathBuf>,
    /// Question the summary should answer.
    #[arg(long)]
    pub query: Option<String>,
    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,
    /// Experiment to record into.
    #[arg(long)]
    pub experiment: Option<String>,
    /// Report destination.
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Skip writing the report after the run.
    #[arg(long)]
    pub no_report: bool,
    /// Print the run outcome as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, mut settings: Settings) -> Result<()> {
    if let Some(facts) = args.facts {
        settings.facts_file = facts;
    }
    if let Some(query) = args.query {
        settings.query = query;
    }
    if let Some(temperature) = args.temperature {
        settings.temperature = temperature;
    }
    if let Some(experiment) = args.experiment {
        settings.experiment = experiment;
    }
    if let Some(report) = args.report {
        settings.report_file = report;
    }

    let Some(api_key) = settings.gemini_api_key.clone() else {
        warn!("GEMINI_API_KEY is not set; skipping run");
        println!("no api key");
        return Ok(());
    };

    let facts = load_facts(&settings.facts_file).await?;

    let client = GeminiClient::builder(api_key, settings.model_name.as_str())
        .base_url(settings.gemini_base_url.as_str())
        .build()
        .context("building Gemini client")?;
    let store = open_store(&settings).await?;
    let recorder = RunRecorder::open(Arc::clone(&store), &settings.experiment)
        .await
        .with_context(|| format!("opening experiment {}", settings.experiment))?;
    let summarizer = Summarizer::new(Arc::new(client), recorder, settings.prices);

    let out = summarizer
        .run(&settings.query, &facts, settings.temperature)
        .await
        .context("recording summarization run")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("model: {}", summarizer.model_name());
        println!("facts: {}", facts.len());
        println!("\nsummary:\n");
        println!("{}", out.text);
        println!("\nrun id: {}", out.run_id);
        println!("cost (usd): {:.6}", out.cost_total);
    }

    if args.no_report {
        return Ok(());
    }
    let outcome = ReportRenderer::new(store)
        .render(&settings.experiment, &settings.report_file)
        .await?;
    info!(?outcome, "report step finished");
    if !args.json {
        println!("{}", outcome.message());
    }
    Ok(())
}
