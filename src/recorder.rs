//! Persist one summarization run into a tracking store.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    error::TrackingError,
    tracking::{ExperimentRecord, Metrics, Params, RunRecord, RunStatus, TrackingStore},
};

pub const SYSTEM_PROMPT_ARTIFACT: &str = "system_prompt.txt";
pub const USER_PROMPT_ARTIFACT: &str = "user_prompt.txt";
pub const RESPONSE_ARTIFACT: &str = "assistant_response.txt";

/// Parameter and metric keys shared by the recorder and the report renderer.
pub mod keys {
    pub const MODEL: &str = "model";
    pub const TEMPERATURE: &str = "temperature";
    pub const QUERY: &str = "query";

    pub const INPUT_TOKENS: &str = "input_tokens";
    pub const OUTPUT_TOKENS: &str = "output_tokens";
    pub const LATENCY_SECONDS: &str = "latency_seconds";
    pub const INPUT_COST: &str = "input_cost";
    pub const OUTPUT_COST: &str = "output_cost";
    pub const TOTAL_COST: &str = "total_cost";
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub model: String,
    pub temperature: f64,
    pub query: String,
}

impl RunParams {
    fn to_params(&self) -> Params {
        Params::from([
            (keys::MODEL.to_string(), self.model.clone()),
            (keys::TEMPERATURE.to_string(), format!("{:?}", self.temperature)),
            (keys::QUERY.to_string(), self.query.clone()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_seconds: f64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl RunMetrics {
    fn to_metrics(&self) -> Metrics {
        Metrics::from([
            (keys::INPUT_TOKENS.to_string(), self.input_tokens as f64),
            (keys::OUTPUT_TOKENS.to_string(), self.output_tokens as f64),
            (keys::LATENCY_SECONDS.to_string(), self.latency_seconds),
            (keys::INPUT_COST.to_string(), self.input_cost),
            (keys::OUTPUT_COST.to_string(), self.output_cost),
            (keys::TOTAL_COST.to_string(), self.total_cost),
        ])
    }
}

/// The three text artifacts attached to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub system_prompt: String,
    pub user_prompt: String,
    pub response: String,
}

impl RunArtifacts {
    fn named(&self) -> [(&'static str, &str); 3] {
        [
            (SYSTEM_PROMPT_ARTIFACT, self.system_prompt.as_str()),
            (USER_PROMPT_ARTIFACT, self.user_prompt.as_str()),
            (RESPONSE_ARTIFACT, self.response.as_str()),
        ]
    }
}

/// Records runs into a single experiment.
///
/// The experiment is resolved (and created if missing) once, in
/// [`RunRecorder::open`].
#[derive(Clone)]
pub struct RunRecorder {
    store: Arc<dyn TrackingStore>,
    experiment: ExperimentRecord,
}

impl RunRecorder {
    pub async fn open(
        store: Arc<dyn TrackingStore>,
        experiment_name: &str,
    ) -> Result<Self, TrackingError> {
        let experiment = store.get_or_create_experiment(experiment_name).await?;
        info!(
            experiment_id = %experiment.experiment_id,
            experiment = experiment_name,
            "run recorder ready"
        );
        Ok(Self { store, experiment })
    }

    pub fn experiment(&self) -> &ExperimentRecord {
        &self.experiment
    }

    /// Write a complete run and return its id.
    ///
    /// The run only becomes visible once every write has succeeded. On any
    /// failure the run is closed as failed and the original error returned.
    #[instrument(skip_all, fields(experiment_id = %self.experiment.experiment_id))]
    pub async fn record(
        &self,
        params: &RunParams,
        metrics: &RunMetrics,
        artifacts: &RunArtifacts,
    ) -> Result<String, TrackingError> {
        let run = self.store.create_run(&self.experiment).await?;

        if let Err(err) = self.populate(&run, params, metrics, artifacts).await {
            if let Err(close_err) = self.store.finish_run(&run, RunStatus::Failed).await {
                warn!(run_id = %run.run_id, error = %close_err, "could not mark run failed");
            }
            return Err(err);
        }

        let closed = self.store.finish_run(&run, RunStatus::Finished).await?;
        info!(run_id = %closed.run_id, "recorded run");
        Ok(closed.run_id)
    }

    async fn populate(
        &self,
        run: &RunRecord,
        params: &RunParams,
        metrics: &RunMetrics,
        artifacts: &RunArtifacts,
    ) -> Result<(), TrackingError> {
        self.store.log_params(run, &params.to_params()).await?;
        self.store.log_metrics(run, &metrics.to_metrics()).await?;
        for (name, text) in artifacts.named() {
            self.store.log_text(run, name, text).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RunRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRecorder")
            .field("experiment", &self.experiment)
            .finish_non_exhaustive()
    }
}
