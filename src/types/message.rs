//! Tagged message and event variants.
//!
//! The source system represents LLM messages, tool calls, and traces with
//! ad-hoc dictionaries. We keep the same concepts but model them as closed
//! tagged unions so the compiler — not a key lookup at runtime — enforces
//! which fields exist on which variant.

use serde::{Deserialize, Serialize};

/// A single chat message sent to the LLM Invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Validation outcome reported by the Validator (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Warning,
}

impl Default for ValidationStatus {
    fn default() -> Self {
        Self::Passed
    }
}

/// Trace verbosity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    None,
    #[default]
    Summary,
    Full,
}

/// Progress stage emitted alongside `Event::Progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    SchemaRetrieval,
    RagSearch,
    ContextGathered,
    QueryGeneration,
    QueryGenerated,
    Validation,
    ValidationComplete,
    ExecutionComplete,
    Completed,
}

/// Optional trace payload attached to an event, shaped by `TraceLevel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracePayload {
    pub reasoning_steps: Vec<String>,
    pub prompt_preview: Option<String>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub cost_usd: Option<f64>,
}

/// The ordered event stream the orchestrator emits for one request.
///
/// `Result` and terminal `Error` are the only variants that may end the
/// stream; every other variant must be followed by at least one more event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Progress {
        iteration: u32,
        stage: Stage,
        /// Monotonically non-decreasing within one request.
        progress: f64,
        trace: Option<TracePayload>,
    },
    Clarification {
        iteration: u32,
        question: String,
        trace: Option<TracePayload>,
    },
    Result {
        turn_id: uuid::Uuid,
        conversation_id: uuid::Uuid,
        generated_query: String,
        confidence_score: f64,
        validation_status: ValidationStatus,
        iterations: u32,
        needs_clarification: bool,
        trace: Option<TracePayload>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Event {
    /// `true` for the two variants that may legally terminate a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Result { .. } | Event::Error { .. })
    }

    pub fn progress_value(&self) -> Option<f64> {
        match self {
            Event::Progress { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_result_and_error_are_terminal() {
        let progress = Event::Progress { iteration: 1, stage: Stage::Started, progress: 0.0, trace: None };
        let clarification = Event::Clarification { iteration: 1, question: "?".into(), trace: None };
        let result = Event::Result {
            turn_id: uuid::Uuid::nil(),
            conversation_id: uuid::Uuid::nil(),
            generated_query: "SELECT 1".into(),
            confidence_score: 0.9,
            validation_status: ValidationStatus::Passed,
            iterations: 1,
            needs_clarification: false,
            trace: None,
        };
        let error = Event::Error { kind: "Timeout".into(), message: "x".into() };

        assert!(!progress.is_terminal());
        assert!(!clarification.is_terminal());
        assert!(result.is_terminal());
        assert!(error.is_terminal());
    }
}
