//! Plain-text report of the latest finished run in an experiment.
//!
//! Lookup and formatting are best-effort: a missing experiment, an empty
//! experiment or an unreadable store produce a [`RenderOutcome`] rather than
//! an error, and nothing is written. Only the final write of a fully
//! assembled report can fail the call.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::{
    error::{Error, Result, TrackingError},
    recorder::{keys, RESPONSE_ARTIFACT, SYSTEM_PROMPT_ARTIFACT, USER_PROMPT_ARTIFACT},
    tracking::{RunRecord, TrackingStore},
};

const NOT_AVAILABLE: &str = "N/A";

/// Result of a render attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Saved(PathBuf),
    /// Experiment or run missing; carries the diagnostic.
    NotFound(String),
    /// Lookup failed for another reason; carries the diagnostic.
    Failed(String),
}

impl RenderOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, RenderOutcome::Saved(_))
    }

    pub fn message(&self) -> String {
        match self {
            RenderOutcome::Saved(path) => format!("report saved: {}", path.display()),
            RenderOutcome::NotFound(message) => message.clone(),
            RenderOutcome::Failed(message) => format!("error while creating report: {message}"),
        }
    }
}

/// Everything shown in a run report.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub experiment_id: String,
    pub status: String,
    pub artifact_uri: String,
    /// Epoch milliseconds.
    pub start_time: Option<i64>,
    pub model: Option<String>,
    pub temperature: Option<String>,
    pub query: Option<String>,
    pub input_tokens: f64,
    pub output_tokens: f64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub system_prompt: String,
    pub user_prompt: String,
    pub response: String,
}

impl RunReport {
    /// Render the fixed report layout, trimmed of surrounding whitespace.
    pub fn format(&self) -> String {
        let opt = |value: &Option<String>| value.clone().unwrap_or_else(|| NOT_AVAILABLE.into());
        let document = format!(
            "LLM run report\n\
             \n\
             run id:        {run_id}\n\
             experiment id: {experiment_id}\n\
             status:        {status}\n\
             artifact uri:  {artifact_uri}\n\
             start time:    {start_time}\n\
             \n\
             model:         {model}\n\
             temperature:   {temperature}\n\
             query:         {query}\n\
             \n\
             total tokens:  {total_tokens:.0}\n\
             input tokens:  {input_tokens:.0} (${input_cost:.6})\n\
             output tokens: {output_tokens:.0} (${output_cost:.6})\n\
             total cost:    ${total_cost:.6}\n\
             \n\
             [system prompt]\n\
             {system_prompt}\n\
             \n\
             [user prompt]\n\
             {user_prompt}\n\
             \n\
             [model output]\n\
             {response}\n",
            run_id = self.run_id,
            experiment_id = self.experiment_id,
            status = self.status,
            artifact_uri = self.artifact_uri,
            start_time = format_start_time(self.start_time),
            model = opt(&self.model),
            temperature = opt(&self.temperature),
            query = opt(&self.query),
            total_tokens = self.input_tokens + self.output_tokens,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            input_cost = self.input_cost,
            output_cost = self.output_cost,
            total_cost = self.total_cost,
            system_prompt = self.system_prompt,
            user_prompt = self.user_prompt,
            response = self.response,
        );
        document.trim().to_string()
    }
}

/// `YYYY-MM-DD HH:MM:SS UTC` for epoch millis, `N/A` when absent or out of range.
pub fn format_start_time(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

enum Lookup {
    Found(Box<RunReport>),
    Missing(String),
}

/// Builds reports from whatever a tracking store holds.
#[derive(Clone)]
pub struct ReportRenderer {
    store: Arc<dyn TrackingStore>,
}

impl ReportRenderer {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Write the report of the latest finished run of `experiment_name` to
    /// `destination`, replacing any existing file.
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn render(&self, experiment_name: &str, destination: &Path) -> Result<RenderOutcome> {
        let report = match self.lookup(experiment_name).await {
            Ok(Lookup::Found(report)) => report,
            Ok(Lookup::Missing(message)) => {
                warn!(%message, "nothing to report");
                return Ok(RenderOutcome::NotFound(message));
            }
            Err(err) => {
                warn!(error = %err, "report lookup failed");
                return Ok(RenderOutcome::Failed(err.to_string()));
            }
        };

        let document = report.format();
        write_atomic(destination, &document)?;
        info!(run_id = %report.run_id, "report saved");
        Ok(RenderOutcome::Saved(destination.to_path_buf()))
    }

    async fn lookup(&self, experiment_name: &str) -> std::result::Result<Lookup, TrackingError> {
        let Some(experiment) = self.store.experiment_by_name(experiment_name).await? else {
            return Ok(Lookup::Missing(format!(
                "experiment not found: {experiment_name}"
            )));
        };
        let Some(run) = self.store.latest_finished_run(&experiment).await? else {
            return Ok(Lookup::Missing("no runs found".to_string()));
        };
        Ok(Lookup::Found(Box::new(self.collect(run).await?)))
    }

    async fn collect(&self, run: RunRecord) -> std::result::Result<RunReport, TrackingError> {
        let data = self.store.run_data(&run).await?;
        let system_prompt = self.store.load_text(&run, SYSTEM_PROMPT_ARTIFACT).await?;
        let user_prompt = self.store.load_text(&run, USER_PROMPT_ARTIFACT).await?;
        let response = self.store.load_text(&run, RESPONSE_ARTIFACT).await?;

        let metric = |key: &str| data.metrics.get(key).copied().unwrap_or(0.0);
        let param = |key: &str| data.params.get(key).cloned();

        Ok(RunReport {
            status: run.status.to_string(),
            start_time: run.start_time,
            model: param(keys::MODEL),
            temperature: param(keys::TEMPERATURE),
            query: param(keys::QUERY),
            input_tokens: metric(keys::INPUT_TOKENS),
            output_tokens: metric(keys::OUTPUT_TOKENS),
            input_cost: metric(keys::INPUT_COST),
            output_cost: metric(keys::OUTPUT_COST),
            total_cost: metric(keys::TOTAL_COST),
            system_prompt,
            user_prompt,
            response,
            run_id: run.run_id,
            experiment_id: run.experiment_id,
            artifact_uri: run.artifact_uri,
        })
    }
}

/// Write through a sibling temp file so `destination` is never left partial.
fn write_atomic(destination: &Path, document: &str) -> Result<()> {
    let wrap = |source: std::io::Error| Error::ReportWrite {
        path: destination.to_path_buf(),
        source,
    };
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(wrap)?;
    file.write_all(document.as_bytes()).map_err(wrap)?;
    file.persist(destination).map_err(|e| wrap(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_utc() {
        assert_eq!(
            format_start_time(Some(1_700_000_000_000)),
            "2023-11-14 22:13:20 UTC"
        );
    }

    #[test]
    fn start_time_out_of_range_is_not_available() {
        assert_eq!(format_start_time(None), "N/A");
        assert_eq!(format_start_time(Some(i64::MAX)), "N/A");
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(
            RenderOutcome::NotFound("no runs found".into()).message(),
            "no runs found"
        );
        assert!(RenderOutcome::Failed("boom".into())
            .message()
            .ends_with("boom"));
    }
}
