use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use factsum::{
    completion::StaticClient,
    cost::PriceTable,
    error::TrackingError,
    prompt::Fact,
    recorder::{RunRecorder, RESPONSE_ARTIFACT},
    report::{RenderOutcome, ReportRenderer},
    summarizer::Summarizer,
    tracking::{
        ExperimentRecord, FileStore, Metrics, Params, RunData, RunRecord, RunStatus,
        TrackingStore,
    },
};

async fn file_store(dir: &Path) -> Arc<dyn TrackingStore> {
    Arc::new(FileStore::open(dir.join("mlruns")).await.unwrap())
}

async fn summarizer(
    store: Arc<dyn TrackingStore>,
    experiment: &str,
    client: Arc<StaticClient>,
) -> Summarizer {
    let recorder = RunRecorder::open(store, experiment).await.unwrap();
    Summarizer::new(client, recorder, PriceTable::default())
}

#[tokio::test]
async fn cost_flows_from_token_usage() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let client = Arc::new(StaticClient::text("stub-model", "ok", 1_000_000, 500_000));
    let svc = summarizer(store.clone(), "costs", client).await;

    let out = svc.run("Q", &[Fact::new("X", "Y")], 0.4).await.unwrap();
    assert!((out.cost_total - 0.30).abs() < 1e-12);

    let experiment = store.experiment_by_name("costs").await.unwrap().unwrap();
    let run = store.latest_finished_run(&experiment).await.unwrap().unwrap();
    assert_eq!(run.run_id, out.run_id);
    let data = store.run_data(&run).await.unwrap();
    assert_eq!(data.metrics["input_tokens"], 1_000_000.0);
    assert_eq!(data.metrics["output_tokens"], 500_000.0);
    assert!((data.metrics["input_cost"] - 0.10).abs() < 1e-12);
    assert!((data.metrics["output_cost"] - 0.20).abs() < 1e-12);
    assert!(data.metrics.contains_key("latency_seconds"));
    assert_eq!(data.params["model"], "stub-model");
}

#[tokio::test]
async fn recorded_run_round_trips_into_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let client = Arc::new(StaticClient::text("stub-model", "Summary text", 10, 5));
    let svc = summarizer(store.clone(), "round-trip", client).await;

    let out = svc.run("Q2", &[Fact::new("X", "Y")], 0.4).await.unwrap();
    assert_eq!(out.text, "Summary text");

    let destination = dir.path().join("report.txt");
    let outcome = ReportRenderer::new(store)
        .render("round-trip", &destination)
        .await
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Saved(destination.clone()));

    let report = std::fs::read_to_string(&destination).unwrap();
    assert!(report.starts_with("LLM run report"));
    assert!(report.contains(&format!("run id:        {}", out.run_id)));
    assert!(report.contains("status:        FINISHED"));
    assert!(report.contains("model:         stub-model"));
    assert!(report.contains("query:         Q2"));
    assert!(report.contains("temperature:   0.4"));
    assert!(report.contains("total tokens:  15"));
    assert!(report.contains("[X]\nY"));
    assert!(report.ends_with("[model output]\nSummary text"));
}

#[tokio::test]
async fn whole_number_temperature_is_reported_with_decimal() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let client = Arc::new(StaticClient::text("stub-model", "warm", 1, 1));
    let svc = summarizer(store.clone(), "warm", client).await;
    svc.run("Q", &[], 1.0).await.unwrap();

    let destination = dir.path().join("report.txt");
    ReportRenderer::new(store)
        .render("warm", &destination)
        .await
        .unwrap();
    let report = std::fs::read_to_string(&destination).unwrap();
    assert!(report.contains("temperature:   1.0\n"));
}

#[tokio::test]
async fn empty_experiment_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    RunRecorder::open(store.clone(), "empty").await.unwrap();

    let destination = dir.path().join("report.txt");
    let outcome = ReportRenderer::new(store)
        .render("empty", &destination)
        .await
        .unwrap();

    assert_eq!(outcome, RenderOutcome::NotFound("no runs found".into()));
    assert!(!destination.exists());
}

#[tokio::test]
async fn missing_experiment_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;

    let destination = dir.path().join("report.txt");
    let outcome = ReportRenderer::new(store)
        .render("nobody", &destination)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RenderOutcome::NotFound("experiment not found: nobody".into())
    );
    assert!(!destination.exists());
}

#[tokio::test]
async fn repeated_runs_get_distinct_ids_and_latest_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let client = Arc::new(StaticClient::text("stub-model", "same", 1, 1));
    let svc = summarizer(store.clone(), "repeat", client.clone()).await;
    let facts = [Fact::new("X", "Y")];

    let first = svc.run("Q", &facts, 0.4).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = svc.run("Q", &facts, 0.4).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(client.calls(), 2);

    let destination = dir.path().join("report.txt");
    ReportRenderer::new(store)
        .render("repeat", &destination)
        .await
        .unwrap();
    let report = std::fs::read_to_string(&destination).unwrap();
    assert!(report.contains(&second.run_id));
}

#[tokio::test]
async fn completion_failure_is_still_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let client = Arc::new(StaticClient::failing("stub-model", "network down"));
    let svc = summarizer(store.clone(), "failures", client).await;

    let out = svc.run("Q", &[], 0.4).await.unwrap();
    assert_eq!(out.text, "error: network down");
    assert_eq!(out.cost_total, 0.0);

    let experiment = store.experiment_by_name("failures").await.unwrap().unwrap();
    let run = store.latest_finished_run(&experiment).await.unwrap().unwrap();
    assert_eq!(
        store.load_text(&run, RESPONSE_ARTIFACT).await.unwrap(),
        "error: network down"
    );
}

#[tokio::test]
async fn experiments_are_isolated_when_run_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let alpha = summarizer(
        store.clone(),
        "alpha",
        Arc::new(StaticClient::text("m", "alpha text", 1, 1)),
    )
    .await;
    let beta = summarizer(
        store.clone(),
        "beta",
        Arc::new(StaticClient::text("m", "beta text", 1, 1)),
    )
    .await;

    let (a, b) = tokio::join!(alpha.run("A", &[], 0.1), beta.run("B", &[], 0.2));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(
        alpha.recorder().experiment().experiment_id,
        beta.recorder().experiment().experiment_id
    );

    let renderer = ReportRenderer::new(store);
    let alpha_report = dir.path().join("alpha.txt");
    let beta_report = dir.path().join("beta.txt");
    renderer.render("alpha", &alpha_report).await.unwrap();
    renderer.render("beta", &beta_report).await.unwrap();

    let alpha_report = std::fs::read_to_string(alpha_report).unwrap();
    let beta_report = std::fs::read_to_string(beta_report).unwrap();
    assert!(alpha_report.contains(&a.run_id) && alpha_report.contains("alpha text"));
    assert!(beta_report.contains(&b.run_id) && beta_report.contains("beta text"));
}

#[tokio::test]
async fn report_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path()).await;
    let svc = summarizer(
        store.clone(),
        "overwrite",
        Arc::new(StaticClient::text("m", "fresh", 1, 1)),
    )
    .await;
    svc.run("Q", &[], 0.4).await.unwrap();

    let destination = dir.path().join("report.txt");
    std::fs::write(&destination, "stale contents that are much longer than nothing").unwrap();
    ReportRenderer::new(store)
        .render("overwrite", &destination)
        .await
        .unwrap();

    let report = std::fs::read_to_string(&destination).unwrap();
    assert!(!report.contains("stale"));
    assert!(report.ends_with("fresh"));
}

/// Delegates to a [`FileStore`] but fails chosen operations.
struct FlakyStore {
    inner: FileStore,
    fail_log_text: bool,
    fail_load_text: bool,
}

fn injected() -> TrackingError {
    TrackingError::NotFound {
        kind: "injected failure",
        id: "flaky".into(),
    }
}

#[async_trait]
impl TrackingStore for FlakyStore {
    async fn experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExperimentRecord>, TrackingError> {
        self.inner.experiment_by_name(name).await
    }

    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord, TrackingError> {
        self.inner.create_experiment(name).await
    }

    async fn create_run(&self, experiment: &ExperimentRecord) -> Result<RunRecord, TrackingError> {
        self.inner.create_run(experiment).await
    }

    async fn log_params(&self, run: &RunRecord, params: &Params) -> Result<(), TrackingError> {
        self.inner.log_params(run, params).await
    }

    async fn log_metrics(&self, run: &RunRecord, metrics: &Metrics) -> Result<(), TrackingError> {
        self.inner.log_metrics(run, metrics).await
    }

    async fn log_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
        text: &str,
    ) -> Result<(), TrackingError> {
        if self.fail_log_text && artifact_path == RESPONSE_ARTIFACT {
            return Err(injected());
        }
        self.inner.log_text(run, artifact_path, text).await
    }

    async fn finish_run(
        &self,
        run: &RunRecord,
        status: RunStatus,
    ) -> Result<RunRecord, TrackingError> {
        self.inner.finish_run(run, status).await
    }

    async fn latest_finished_run(
        &self,
        experiment: &ExperimentRecord,
    ) -> Result<Option<RunRecord>, TrackingError> {
        self.inner.latest_finished_run(experiment).await
    }

    async fn run_data(&self, run: &RunRecord) -> Result<RunData, TrackingError> {
        self.inner.run_data(run).await
    }

    async fn load_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
    ) -> Result<String, TrackingError> {
        if self.fail_load_text {
            return Err(injected());
        }
        self.inner.load_text(run, artifact_path).await
    }
}

async fn flaky(dir: &Path, fail_log_text: bool, fail_load_text: bool) -> Arc<FlakyStore> {
    Arc::new(FlakyStore {
        inner: FileStore::open(dir.join("mlruns")).await.unwrap(),
        fail_log_text,
        fail_load_text,
    })
}

#[tokio::test]
async fn recording_failure_propagates_and_stays_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let store = flaky(dir.path(), true, false).await;
    let svc = summarizer(
        store.clone(),
        "broken",
        Arc::new(StaticClient::text("m", "lost", 1, 1)),
    )
    .await;

    let err = svc.run("Q", &[], 0.4).await.unwrap_err();
    assert!(matches!(err, TrackingError::NotFound { kind: "injected failure", .. }));

    let experiment = store.experiment_by_name("broken").await.unwrap().unwrap();
    assert!(store.latest_finished_run(&experiment).await.unwrap().is_none());
}

#[tokio::test]
async fn unreadable_artifact_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = flaky(dir.path(), false, true).await;
    let svc = summarizer(
        store.clone(),
        "unreadable",
        Arc::new(StaticClient::text("m", "fine", 1, 1)),
    )
    .await;
    svc.run("Q", &[], 0.4).await.unwrap();

    let destination = dir.path().join("report.txt");
    let outcome = ReportRenderer::new(store)
        .render("unreadable", &destination)
        .await
        .unwrap();

    assert!(matches!(outcome, RenderOutcome::Failed(_)));
    assert!(!outcome.is_saved());
    assert!(!destination.exists());
}
