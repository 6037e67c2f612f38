//! Prompt construction from a query and grounding facts.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Separator placed between rendered fact blocks.
pub const FACT_DELIMITER: &str = "\n\n---\n\n";

/// Content of the system message.
pub const SYSTEM_INSTRUCTION: &str = "summarize technical content";

/// One topic/content pair supplied as grounding context.
///
/// Both keys are optional in the input file; missing values are substituted
/// when the fact is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(rename = "Topic", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(rename = "Content", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Fact {
    pub fn new(topic: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            content: Some(content.into()),
        }
    }

    /// Render as `[topic]\ncontent`.
    pub fn block(&self) -> String {
        format!(
            "[{}]\n{}",
            self.topic.as_deref().unwrap_or("N/A"),
            self.content.as_deref().unwrap_or_default()
        )
    }
}

/// Chat role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The system + user message pair sent to the completion backend.
///
/// The pair is fixed-size so a prompt always holds exactly one system
/// message followed by exactly one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    messages: [Message; 2],
}

impl Prompt {
    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    pub fn user(&self) -> &Message {
        &self.messages[1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Build the summarization prompt for `query` over `facts`.
///
/// Pure and deterministic: identical inputs always yield identical prompts.
pub fn build(query: &str, facts: &[Fact]) -> Prompt {
    let doc = facts
        .iter()
        .map(Fact::block)
        .collect::<Vec<_>>()
        .join(FACT_DELIMITER);

    let user = format!(
        "Summarize for a technical reader.\n\n\
         Query:\n{query}\n\n\
         Facts:\n{doc}\n\n\
         One short paragraph. No lists. No extra knowledge."
    );

    Prompt {
        messages: [
            Message::new(Role::System, SYSTEM_INSTRUCTION),
            Message::new(Role::User, user),
        ],
    }
}
