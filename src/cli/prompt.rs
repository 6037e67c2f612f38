//! CLI entry-point printing the prompt for the configured facts and query.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{config::Settings, facts::load_facts, prompt};

/// Args for the `prompt` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// JSON facts file.
    #[arg(long)]
    pub facts: Option<PathBuf>,
    /// Question the summary should answer.
    #[arg(long)]
    pub query: Option<String>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let facts_file = args.facts.unwrap_or(settings.facts_file);
    let query = args.query.unwrap_or(settings.query);

    let facts = load_facts(&facts_file).await?;
    let prompt = prompt::build(&query, &facts);
    for message in prompt.messages() {
        println!("[{}]\n{}\n", message.role, message.content);
    }
    Ok(())
}
