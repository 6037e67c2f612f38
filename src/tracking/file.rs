//! Directory-backed tracking store.
//!
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/.pending/<run_id>/...   while the run is open
//! <root>/<experiment_id>/<run_id>/meta.json      once closed
//!                                /params.json
//!                                /metrics.json
//!                                /artifacts/<name>
//! ```
//!
//! Closing a run renames its pending directory into place, so a run is
//! either absent or complete from a reader's point of view.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    validate_artifact_path, ExperimentRecord, Metrics, Params, RunData, RunRecord, RunStatus,
    TrackingStore,
};
use crate::error::TrackingError;

const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.json";
const ARTIFACTS_DIR: &str = "artifacts";
const PENDING_DIR: &str = ".pending";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, TrackingError> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .await
            .map_err(|e| TrackingError::io(root, e))?;
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| TrackingError::io(root, e))?;
        info!(root = %root.display(), "opened file tracking store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.root.join(experiment_id)
    }

    fn published_dir(&self, run: &RunRecord) -> PathBuf {
        self.experiment_dir(&run.experiment_id).join(&run.run_id)
    }

    fn pending_dir(&self, run: &RunRecord) -> PathBuf {
        self.experiment_dir(&run.experiment_id)
            .join(PENDING_DIR)
            .join(&run.run_id)
    }

    /// Directory of a run that is still open for writes.
    async fn open_run_dir(&self, run: &RunRecord) -> Result<PathBuf, TrackingError> {
        let pending = self.pending_dir(run);
        if exists(&pending).await? {
            return Ok(pending);
        }
        if exists(&self.published_dir(run)).await? {
            return Err(TrackingError::RunClosed {
                run_id: run.run_id.clone(),
            });
        }
        Err(TrackingError::not_found("run", &run.run_id))
    }

    /// Directory of a run for reading, closed or not.
    async fn readable_run_dir(&self, run: &RunRecord) -> Result<PathBuf, TrackingError> {
        let published = self.published_dir(run);
        if exists(&published).await? {
            return Ok(published);
        }
        let pending = self.pending_dir(run);
        if exists(&pending).await? {
            return Ok(pending);
        }
        Err(TrackingError::not_found("run", &run.run_id))
    }

    async fn experiment_ids(&self) -> Result<Vec<u64>, TrackingError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| TrackingError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TrackingError::io(&self.root, e))?
        {
            if let Some(id) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl TrackingStore for FileStore {
    async fn experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExperimentRecord>, TrackingError> {
        for id in self.experiment_ids().await? {
            let meta = self.experiment_dir(&id.to_string()).join(META_FILE);
            let Some(experiment) = read_json_opt::<ExperimentRecord>(&meta).await? else {
                continue;
            };
            if experiment.name == name {
                return Ok(Some(experiment));
            }
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord, TrackingError> {
        let mut next = self.experiment_ids().await?.last().map_or(1, |id| id + 1);
        // Claim the id with an exclusive mkdir; another writer may win the race.
        let dir = loop {
            let dir = self.experiment_dir(&next.to_string());
            match fs::create_dir(&dir).await {
                Ok(()) => break dir,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => next += 1,
                Err(e) => return Err(TrackingError::io(dir, e)),
            }
        };

        let experiment = ExperimentRecord {
            experiment_id: next.to_string(),
            name: name.to_string(),
            artifact_location: Some(format!("file://{}", dir.display())),
        };
        write_json_atomic(&dir.join(META_FILE), &experiment).await?;
        Ok(experiment)
    }

    async fn create_run(&self, experiment: &ExperimentRecord) -> Result<RunRecord, TrackingError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let experiment_dir = self.experiment_dir(&experiment.experiment_id);
        let run = RunRecord {
            artifact_uri: format!(
                "file://{}",
                experiment_dir.join(&run_id).join(ARTIFACTS_DIR).display()
            ),
            run_id,
            experiment_id: experiment.experiment_id.clone(),
            status: RunStatus::Running,
            start_time: Some(Utc::now().timestamp_millis()),
            end_time: None,
        };

        let pending = self.pending_dir(&run);
        let artifacts = pending.join(ARTIFACTS_DIR);
        fs::create_dir_all(&artifacts)
            .await
            .map_err(|e| TrackingError::io(&artifacts, e))?;
        write_json(&pending.join(META_FILE), &run).await?;
        debug!(run_id = %run.run_id, "opened run");
        Ok(run)
    }

    async fn log_params(&self, run: &RunRecord, params: &Params) -> Result<(), TrackingError> {
        let path = self.open_run_dir(run).await?.join(PARAMS_FILE);
        let mut merged: Params = read_json_opt(&path).await?.unwrap_or_default();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_json(&path, &merged).await
    }

    async fn log_metrics(&self, run: &RunRecord, metrics: &Metrics) -> Result<(), TrackingError> {
        let path = self.open_run_dir(run).await?.join(METRICS_FILE);
        let mut merged: Metrics = read_json_opt(&path).await?.unwrap_or_default();
        merged.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        write_json(&path, &merged).await
    }

    async fn log_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
        text: &str,
    ) -> Result<(), TrackingError> {
        validate_artifact_path(artifact_path)?;
        let path = self
            .open_run_dir(run)
            .await?
            .join(ARTIFACTS_DIR)
            .join(artifact_path);
        fs::write(&path, text)
            .await
            .map_err(|e| TrackingError::io(path, e))
    }

    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    async fn finish_run(
        &self,
        run: &RunRecord,
        status: RunStatus,
    ) -> Result<RunRecord, TrackingError> {
        let pending = self.open_run_dir(run).await?;
        let mut closed: RunRecord = read_json(&pending.join(META_FILE)).await?;
        closed.status = status;
        closed.end_time = Some(Utc::now().timestamp_millis());
        write_json(&pending.join(META_FILE), &closed).await?;

        let published = self.published_dir(run);
        fs::rename(&pending, &published)
            .await
            .map_err(|e| TrackingError::io(&published, e))?;
        debug!(%status, "closed run");
        Ok(closed)
    }

    async fn latest_finished_run(
        &self,
        experiment: &ExperimentRecord,
    ) -> Result<Option<RunRecord>, TrackingError> {
        let dir = self.experiment_dir(&experiment.experiment_id);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| TrackingError::io(&dir, e))?;

        let mut latest: Option<RunRecord> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TrackingError::io(&dir, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| TrackingError::io(entry.path(), e))?
                .is_dir();
            if !is_dir || entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let meta = entry.path().join(META_FILE);
            let Some(run) = read_json_opt::<RunRecord>(&meta).await? else {
                continue;
            };
            if run.status != RunStatus::Finished {
                continue;
            }
            let newer = latest.as_ref().map_or(true, |best| {
                (run.start_time, run.end_time) > (best.start_time, best.end_time)
            });
            if newer {
                latest = Some(run);
            }
        }
        Ok(latest)
    }

    async fn run_data(&self, run: &RunRecord) -> Result<RunData, TrackingError> {
        let dir = self.readable_run_dir(run).await?;
        Ok(RunData {
            params: read_json_opt(&dir.join(PARAMS_FILE))
                .await?
                .unwrap_or_default(),
            metrics: read_json_opt(&dir.join(METRICS_FILE))
                .await?
                .unwrap_or_default(),
        })
    }

    async fn load_text(
        &self,
        run: &RunRecord,
        artifact_path: &str,
    ) -> Result<String, TrackingError> {
        validate_artifact_path(artifact_path)?;
        let path = self
            .readable_run_dir(run)
            .await?
            .join(ARTIFACTS_DIR)
            .join(artifact_path);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TrackingError::not_found("artifact", artifact_path))
            }
            Err(e) => Err(TrackingError::io(path, e)),
        }
    }
}

async fn exists(path: &Path) -> Result<bool, TrackingError> {
    fs::try_exists(path)
        .await
        .map_err(|e| TrackingError::io(path, e))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TrackingError> {
    read_json_opt(path)
        .await?
        .ok_or_else(|| TrackingError::not_found("record", path.display().to_string()))
}

async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, TrackingError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TrackingError::io(path, e)),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackingError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)
        .await
        .map_err(|e| TrackingError::io(path, e))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackingError> {
    let staging = path.with_extension("json.tmp");
    write_json(&staging, value).await?;
    fs::rename(&staging, path)
        .await
        .map_err(|e| TrackingError::io(path, e))
}
