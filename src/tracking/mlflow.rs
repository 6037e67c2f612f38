//! MLflow tracking server backend (REST API 2.0 plus the artifact proxy).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use super::{
    validate_artifact_path, ExperimentRecord, Metrics, Params, RunData, RunRecord, RunStatus,
    TrackingStore,
};
use crate::error::TrackingError;

const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

/// Client for a remote MLflow tracking server.
///
/// Artifacts must be served through the server's `mlflow-artifacts` proxy
/// (the default for `mlflow server`).
#[derive(Debug, Clone)]
pub struct MlflowStore {
    base: String,
    http: Client,
}

impl MlflowStore {
    pub fn new(tracking_uri: impl Into<String>) -> Result<Self, TrackingError> {
        let http = Client::builder()
            .user_agent(concat!("factsum/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;
        Ok(Self::with_http(tracking_uri, http))
    }

    pub fn with_http(tracking_uri: impl Into<String>, http: Client) -> Self {
        let base = tracking_uri.into().trim_end_matches('/').to_string();
        Self { base, http }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base)
    }

    fn artifact_url(&self, run: &RunRecord, artifact_path: &str) -> Result<String, TrackingError> {
        let rest = run
            .artifact_uri
            .strip_prefix(ARTIFACT_SCHEME)
            .ok_or_else(|| TrackingError::UnsupportedArtifactUri(run.artifact_uri.clone()))?;
        // `mlflow-artifacts://host:port/path` carries an authority; only the path matters here.
        let path = match rest.strip_prefix("//") {
            Some(with_authority) => with_authority
                .split_once('/')
                .map_or("", |(_, path)| path),
            None => rest.trim_start_matches('/'),
        };
        Ok(format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{artifact_path}",
            self.base,
            path.trim_end_matches('/')
        ))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TrackingError> {
        let resp = self.http.post(self.api(path)).json(body).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TrackingError> {
        let resp = self.http.get(self.api(path)).query(query).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }
}

async fn ensure_success(resp: Response) -> Result<Response, TrackingError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(TrackingError::Api { status, body })
}

#[async_trait]
impl TrackingStore for MlflowStore {
    async fn experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExperimentRecord>, TrackingError> {
        let resp = self
            .http
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: ExperimentEnvelope = ensure_success(resp).await?.json().await?;
        let experiment = payload.experiment;
        if experiment.lifecycle_stage.as_deref() == Some("deleted") {
            return Ok(None);
        }
        Ok(Some(ExperimentRecord {
            experiment_id: experiment.experiment_id,
            name: experiment.name,
            artifact_location: experiment.artifact_location,
        }))
    }

    #[instrument(skip(self))]
    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord, TrackingError> {
        let created: CreatedExperiment = self
            .post("experiments/create", &json!({ "name": name }))
            .await?;
        Ok(ExperimentRecord {
            experiment_id: created.experiment_id,
            name: name.to_string(),
            artifact_location: None,
        })
    }

    async fn create_run(&self, experiment: &ExperimentRecord) -> Result<RunRecord, TrackingError> {
        let created: RunEnvelope = self
            .post(
                "runs/create",
                &json!({
                    "experiment_id": experiment.experiment_id,
                    "start_time": Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        debug!(run_id = %created.run.info.run_id, "opened mlflow run");
        Ok(created.run.info)
    }

    async fn log_params(&self, run: &RunRecord, params: &Params) -> Result<(), TrackingError> {
        let params: Vec<_> = params
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        let _: serde_json::Value = self
            .post(
                "runs/log-batch",
                &json!({ "run_id": run.run_id, "params": params }),
            )
            .await?;
        Ok(())
    }

    async fn log_metrics(&self, run: &RunRecord, metrics: &Metrics) -> Result<(), TrackingError> {
        let timestamp = Utc::now().timestamp_millis();
        let metrics: Vec<_> = metrics
            .iter()
            .map(|(key, value)| {
                json!({ "key": key, "value": value, "timestamp": timestamp, "step": 0 })
            })
            .collect();
        let _: serde_json::Value = self
            .post(
                "runs/log-batch",
                &json!({ "run_id": run.run_id, "metrics": metrics }),
            )
            .await?;
        Ok(())
    }

    async fn log_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
        text: &str,
    ) -> Result<(), TrackingError> {
        validate_artifact_path(artifact_path)?;
        let url = self.artifact_url(run, artifact_path)?;
        let resp = self.http.put(url).body(text.to_string()).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    async fn finish_run(
        &self,
        run: &RunRecord,
        status: RunStatus,
    ) -> Result<RunRecord, TrackingError> {
        let updated: RunInfoEnvelope = self
            .post(
                "runs/update",
                &json!({
                    "run_id": run.run_id,
                    "status": status,
                    "end_time": Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        Ok(updated.run_info)
    }

    async fn latest_finished_run(
        &self,
        experiment: &ExperimentRecord,
    ) -> Result<Option<RunRecord>, TrackingError> {
        let found: SearchRuns = self
            .post(
                "runs/search",
                &json!({
                    "experiment_ids": [experiment.experiment_id],
                    "filter": "attributes.status = 'FINISHED'",
                    "run_view_type": "ACTIVE_ONLY",
                    "max_results": 1,
                    "order_by": ["attributes.start_time DESC"],
                }),
            )
            .await?;
        Ok(found.runs.into_iter().next().map(|run| run.info))
    }

    async fn run_data(&self, run: &RunRecord) -> Result<RunData, TrackingError> {
        let fetched: RunEnvelope = self.get("runs/get", &[("run_id", run.run_id.as_str())]).await?;
        let data = fetched.run.data;
        Ok(RunData {
            params: data.params.into_iter().map(|p| (p.key, p.value)).collect(),
            metrics: data.metrics.into_iter().map(|m| (m.key, m.value)).collect(),
        })
    }

    async fn load_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
    ) -> Result<String, TrackingError> {
        validate_artifact_path(artifact_path)?;
        let url = self.artifact_url(run, artifact_path)?;
        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(TrackingError::not_found("artifact", artifact_path));
        }
        Ok(ensure_success(resp).await?.text().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ExperimentEnvelope {
    experiment: MlflowExperiment,
}

#[derive(Debug, Deserialize)]
struct MlflowExperiment {
    experiment_id: String,
    name: String,
    artifact_location: Option<String>,
    lifecycle_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedExperiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    run: MlflowRun,
}

#[derive(Debug, Deserialize)]
struct RunInfoEnvelope {
    run_info: RunRecord,
}

#[derive(Debug, Deserialize)]
struct SearchRuns {
    #[serde(default)]
    runs: Vec<MlflowRun>,
}

#[derive(Debug, Deserialize)]
struct MlflowRun {
    info: RunRecord,
    #[serde(default)]
    data: MlflowRunData,
}

#[derive(Debug, Default, Deserialize)]
struct MlflowRunData {
    #[serde(default)]
    metrics: Vec<MlflowMetric>,
    #[serde(default)]
    params: Vec<MlflowParam>,
}

#[derive(Debug, Deserialize)]
struct MlflowMetric {
    key: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct MlflowParam {
    key: String,
    value: String,
}
