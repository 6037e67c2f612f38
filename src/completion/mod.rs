//! Completion backends and the best-effort completion contract.
//!
//! Implementors provide the raw backend call ([`CompletionClient::generate`]);
//! the provided [`CompletionClient::complete`] wraps it so callers always get
//! a well-formed [`CompletionResult`], whatever the backend did.

mod gemini;
mod stub;

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompt::Message;

pub use gemini::{GeminiClient, GeminiClientBuilder, DEFAULT_GEMINI_BASE_URL};
pub use stub::StaticClient;

/// Upper bound on generated tokens requested from every backend.
pub const MAX_OUTPUT_TOKENS: u32 = 500;

/// What the backend produced for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Usable model output, trimmed.
    Text(String),
    /// The backend answered without usable text (safety block, empty candidates).
    Blocked,
    /// The backend call failed; carries the diagnostic.
    Error(String),
    /// No messages were supplied, so no call was made.
    NoMessages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub outcome: CompletionOutcome,
    pub in_tokens: u64,
    pub out_tokens: u64,
    pub latency_seconds: f64,
}

impl CompletionResult {
    fn empty(outcome: CompletionOutcome, latency_seconds: f64) -> Self {
        Self {
            outcome,
            in_tokens: 0,
            out_tokens: 0,
            latency_seconds,
        }
    }

    /// Text logged as the model output, including the sentinel strings.
    pub fn text(&self) -> String {
        match &self.outcome {
            CompletionOutcome::Text(text) => text.clone(),
            CompletionOutcome::Blocked => "blocked or empty".to_string(),
            CompletionOutcome::Error(diagnostic) => format!("error: {diagnostic}"),
            CompletionOutcome::NoMessages => "no messages".to_string(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.outcome, CompletionOutcome::Text(_))
    }
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
}

/// Raw backend answer before the sentinel mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReply {
    pub text: Option<String>,
    pub usage: Option<Usage>,
}

/// Backend request: the single user turn plus generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub user_text: &'a str,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned non-success status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{0}")]
    Backend(String),
}

/// A language-model completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier recorded with every run.
    fn model_name(&self) -> &str;

    /// Perform one backend round-trip.
    async fn generate(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<BackendReply, CompletionError>;

    /// Complete `messages`, never failing.
    ///
    /// Only the last message is sent, as a single user turn.
    async fn complete(&self, messages: &[Message], temperature: f64) -> CompletionResult {
        let Some(last) = messages.last() else {
            return CompletionResult::empty(CompletionOutcome::NoMessages, 0.0);
        };

        let request = CompletionRequest {
            model: self.model_name(),
            user_text: &last.content,
            temperature,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        };

        let started = Instant::now();
        let reply = self.generate(request).await;
        let latency_seconds = started.elapsed().as_secs_f64();

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!(model = self.model_name(), error = %err, "completion failed");
                return CompletionResult::empty(
                    CompletionOutcome::Error(err.to_string()),
                    latency_seconds,
                );
            }
        };

        let text = reply
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let Some(text) = text else {
            warn!(model = self.model_name(), "completion blocked or empty");
            return CompletionResult::empty(CompletionOutcome::Blocked, latency_seconds);
        };

        let usage = reply.usage.unwrap_or_default();
        debug!(
            in_tokens = usage.prompt_tokens,
            out_tokens = usage.candidates_tokens,
            latency_seconds,
            "completion finished"
        );
        CompletionResult {
            outcome: CompletionOutcome::Text(text.to_string()),
            in_tokens: usage.prompt_tokens,
            out_tokens: usage.candidates_tokens,
            latency_seconds,
        }
    }
}
