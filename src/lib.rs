//! Fact-grounded LLM summarization runs.
//!
//! A [`summarizer::Summarizer`] builds a prompt from a query and facts, asks a
//! [`completion::CompletionClient`] for a summary, prices the token usage and
//! records the run in a [`tracking::TrackingStore`]. A
//! [`report::ReportRenderer`] later rebuilds the latest run of an experiment
//! from the store alone.

pub mod cli;
pub mod completion;
pub mod config;
pub mod cost;
pub mod error;
pub mod facts;
pub mod logging;
pub mod prompt;
pub mod recorder;
pub mod report;
pub mod summarizer;
pub mod tracking;
