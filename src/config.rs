//! Runtime configuration utilities for factsum.

use std::{env, path::PathBuf};

use crate::{completion::DEFAULT_GEMINI_BASE_URL, cost::PriceTable};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_EXPERIMENT: &str = "AI_Summarization_Pipeline";
const DEFAULT_QUERY: &str = "Summarize the core technologies and risks of Large Language Models.";

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Gemini API key; `run` refuses to start without it.
    pub gemini_api_key: Option<String>,
    /// Model sent to the completion backend and recorded with each run.
    pub model_name: String,
    /// Root of the Generative Language API.
    pub gemini_base_url: String,
    /// Experiment runs are recorded into and reported from.
    pub experiment: String,
    /// JSON array of facts fed into the prompt.
    pub facts_file: PathBuf,
    pub query: String,
    pub temperature: f64,
    /// Where the run report is written.
    pub report_file: PathBuf,
    /// Root of the local tracking store.
    pub tracking_dir: PathBuf,
    /// Remote MLflow server; takes precedence over `tracking_dir` when set.
    pub mlflow_tracking_uri: Option<String>,
    pub prices: PriceTable,
}

impl Settings {
    /// Load configuration from `.env` and the environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Resolve settings through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string_or = |key: &str, default: &str| non_empty(key).unwrap_or_else(|| default.to_string());
        let float_or = |key: &str, default: f64| {
            non_empty(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let defaults = PriceTable::default();

        Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            model_name: string_or("GEMINI_MODEL_NAME", DEFAULT_MODEL),
            gemini_base_url: string_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            experiment: string_or("FACTSUM_EXPERIMENT", DEFAULT_EXPERIMENT),
            facts_file: PathBuf::from(string_or("FACTSUM_FACTS_FILE", "facts.json")),
            query: string_or("FACTSUM_QUERY", DEFAULT_QUERY),
            temperature: float_or("FACTSUM_TEMPERATURE", 0.4),
            report_file: PathBuf::from(string_or("FACTSUM_REPORT_FILE", "llm_run_report.txt")),
            tracking_dir: PathBuf::from(string_or("FACTSUM_TRACKING_DIR", "./mlruns")),
            mlflow_tracking_uri: non_empty("MLFLOW_TRACKING_URI")
                .filter(|uri| uri.starts_with("http://") || uri.starts_with("https://")),
            prices: PriceTable {
                input_per_million: float_or(
                    "PRICE_INPUT_PER_MILLION",
                    defaults.input_per_million,
                ),
                output_per_million: float_or(
                    "PRICE_OUTPUT_PER_MILLION",
                    defaults.output_per_million,
                ),
            },
        }
    }
}
