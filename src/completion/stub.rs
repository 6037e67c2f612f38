//! Deterministic in-process backend.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;

use super::{BackendReply, CompletionClient, CompletionError, CompletionRequest, Usage};

/// Backend that always answers with a fixed reply or a fixed failure.
///
/// Records how often it was called and the last user text it received.
#[derive(Debug)]
pub struct StaticClient {
    model: String,
    reply: Result<BackendReply, String>,
    calls: AtomicUsize,
    last_user_text: Mutex<Option<String>>,
}

impl StaticClient {
    pub fn reply(model: impl Into<String>, reply: BackendReply) -> Self {
        Self::with(model, Ok(reply))
    }

    /// Answer `text` with the given token usage.
    pub fn text(
        model: impl Into<String>,
        text: impl Into<String>,
        in_tokens: u64,
        out_tokens: u64,
    ) -> Self {
        Self::reply(
            model,
            BackendReply {
                text: Some(text.into()),
                usage: Some(Usage {
                    prompt_tokens: in_tokens,
                    candidates_tokens: out_tokens,
                }),
            },
        )
    }

    /// Fail every call with `diagnostic`.
    pub fn failing(model: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::with(model, Err(diagnostic.into()))
    }

    fn with(model: impl Into<String>, reply: Result<BackendReply, String>) -> Self {
        Self {
            model: model.into(),
            reply,
            calls: AtomicUsize::new(0),
            last_user_text: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_text(&self) -> Option<String> {
        self.last_user_text
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for StaticClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<BackendReply, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_user_text.lock() {
            *last = Some(request.user_text.to_string());
        }
        self.reply.clone().map_err(CompletionError::Backend)
    }
}
