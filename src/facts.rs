//! Facts input file: a JSON array of `{"Topic": ..., "Content": ...}` objects.

use std::path::Path;

use tracing::info;

use crate::{error::FactsError, prompt::Fact};

pub async fn load_facts(path: &Path) -> Result<Vec<Fact>, FactsError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| FactsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let facts: Vec<Fact> = serde_json::from_slice(&bytes).map_err(|source| FactsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), count = facts.len(), "loaded facts");
    Ok(facts)
}
