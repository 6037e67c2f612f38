//! Error types for the fatal tier: tracking-store access and facts input.
//!
//! Completion and report lookups never surface these to callers; they are
//! folded into [`crate::completion::CompletionOutcome`] and
//! [`crate::report::RenderOutcome`] instead.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias used by the library modules.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a [`crate::tracking::TrackingStore`].
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("tracking store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tracking record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tracking request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MLflow returned non-success status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("artifact uri `{0}` is not served by this store")]
    UnsupportedArtifactUri(String),

    #[error("invalid artifact path `{0}`")]
    InvalidArtifactPath(String),

    #[error("run {run_id} is closed and can no longer be written")]
    RunClosed { run_id: String },
}

impl TrackingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Failures while reading the facts input file.
#[derive(Debug, Error)]
pub enum FactsError {
    #[error("reading facts file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing facts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level library error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Facts(#[from] FactsError),

    #[error("writing report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
