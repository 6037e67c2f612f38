//! Experiment tracking: experiments own runs, runs own params, metrics and
//! text artifacts.
//!
//! ```text
//! Experiment (1) ──< Run (N)
//!                     ├── params    key → string
//!                     ├── metrics   key → f64
//!                     └── artifacts name → text
//! ```
//!
//! A run becomes visible to [`TrackingStore::latest_finished_run`] only once
//! it has been closed as [`RunStatus::Finished`].

mod file;
mod mlflow;

use std::fmt::{self, Display};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::TrackingError;

pub use file::FileStore;
pub use mlflow::MlflowStore;

/// Ordered string parameters of a run.
pub type Params = IndexMap<String, String>;

/// Ordered numeric metrics of a run.
pub type Metrics = IndexMap<String, f64>;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
}

/// Run metadata as assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment_id: String,
    pub status: RunStatus,
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "lenient_millis")]
    pub start_time: Option<i64>,
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "lenient_millis")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub artifact_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunData {
    pub params: Params,
    pub metrics: Metrics,
}

/// Accept timestamps as JSON numbers or numeric strings; anything else is `None`.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Backend holding experiments and runs.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExperimentRecord>, TrackingError>;

    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord, TrackingError>;

    /// Open a new run in `experiment`, started now.
    async fn create_run(&self, experiment: &ExperimentRecord) -> Result<RunRecord, TrackingError>;

    async fn log_params(&self, run: &RunRecord, params: &Params) -> Result<(), TrackingError>;

    async fn log_metrics(&self, run: &RunRecord, metrics: &Metrics) -> Result<(), TrackingError>;

    /// Store `text` as the artifact `artifact_path` of `run`.
    async fn log_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
        text: &str,
    ) -> Result<(), TrackingError>;

    /// Close `run` with `status`, publishing it.
    async fn finish_run(
        &self,
        run: &RunRecord,
        status: RunStatus,
    ) -> Result<RunRecord, TrackingError>;

    /// Most recently started finished run of `experiment`.
    async fn latest_finished_run(
        &self,
        experiment: &ExperimentRecord,
    ) -> Result<Option<RunRecord>, TrackingError>;

    async fn run_data(&self, run: &RunRecord) -> Result<RunData, TrackingError>;

    async fn load_text(&self, run: &RunRecord, artifact_path: &str)
        -> Result<String, TrackingError>;

    async fn get_or_create_experiment(
        &self,
        name: &str,
    ) -> Result<ExperimentRecord, TrackingError> {
        if let Some(experiment) = self.experiment_by_name(name).await? {
            return Ok(experiment);
        }
        let experiment = self.create_experiment(name).await?;
        info!(
            experiment_id = %experiment.experiment_id,
            name,
            "created experiment"
        );
        Ok(experiment)
    }
}

/// Artifact names are flat file names relative to the run.
pub(crate) fn validate_artifact_path(artifact_path: &str) -> Result<(), TrackingError> {
    let valid = !artifact_path.is_empty()
        && artifact_path != "."
        && artifact_path != ".."
        && !artifact_path.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(TrackingError::InvalidArtifactPath(artifact_path.to_string()))
    }
}
