//! Run orchestration: prompt → completion → cost → recorded run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    completion::CompletionClient,
    cost::{cost, PriceTable},
    error::TrackingError,
    prompt::{self, Fact},
    recorder::{RunArtifacts, RunMetrics, RunParams, RunRecorder},
};

/// What a caller gets back from one summarization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub text: String,
    pub run_id: String,
    pub cost_total: f64,
}

pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    recorder: RunRecorder,
    prices: PriceTable,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, recorder: RunRecorder, prices: PriceTable) -> Self {
        Self {
            client,
            recorder,
            prices,
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    /// Summarize `facts` for `query` and record the run.
    ///
    /// Completion failures are recorded as sentinel text; only a failure to
    /// record the run is returned as an error.
    #[instrument(skip(self, facts), fields(model = %self.client.model_name(), facts = facts.len()))]
    pub async fn run(
        &self,
        query: &str,
        facts: &[Fact],
        temperature: f64,
    ) -> Result<RunOutput, TrackingError> {
        let prompt = prompt::build(query, facts);
        let result = self.client.complete(prompt.messages(), temperature).await;
        let breakdown = cost(result.in_tokens, result.out_tokens, &self.prices);
        let text = result.text();

        let params = RunParams {
            model: self.client.model_name().to_string(),
            temperature,
            query: query.to_string(),
        };
        let metrics = RunMetrics {
            input_tokens: result.in_tokens,
            output_tokens: result.out_tokens,
            latency_seconds: result.latency_seconds,
            input_cost: breakdown.input_cost,
            output_cost: breakdown.output_cost,
            total_cost: breakdown.total_cost,
        };
        let artifacts = RunArtifacts {
            system_prompt: prompt.system().content.clone(),
            user_prompt: prompt.user().content.clone(),
            response: text.clone(),
        };

        let run_id = self.recorder.record(&params, &metrics, &artifacts).await?;
        info!(
            %run_id,
            in_tokens = result.in_tokens,
            out_tokens = result.out_tokens,
            total_cost = breakdown.total_cost,
            usable = result.is_text(),
            "summarization run complete"
        );

        Ok(RunOutput {
            text,
            run_id,
            cost_total: breakdown.total_cost,
        })
    }
}
