//! Conversation and Turn — the two entities the Orchestrator (C9) persists.
//!
//! Conversations reference Turns, Turns reference Examples, Examples
//! reference Conversations: a textbook ORM cycle in the source system. We
//! break it by keeping only id references here (arena-index style) and
//! materializing full graphs only at query time via explicit joins in
//! `storage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::types::message::ValidationStatus;
use crate::types::schema::SchemaContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub workspace_id: String,
    pub provider_id: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered turn ids. Turn numbers are `1..=turn_ids.len()`, dense and
    /// unique, per the turn-numbering invariant (§3, §8 invariant 3).
    pub turn_ids: Vec<Uuid>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, workspace_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            workspace_id: workspace_id.into(),
            provider_id: provider_id.into(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            turn_ids: Vec::new(),
        }
    }

    /// The turn_number a newly-appended turn would receive.
    pub fn next_turn_number(&self) -> u32 {
        self.turn_ids.len() as u32 + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub row_count: Option<u64>,
    pub columns: Vec<String>,
    pub sample_rows: Vec<serde_json::Value>,
    pub affected_rows: Option<u64>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// A single (user_input, generated_query, evaluation) record.
///
/// Created by the orchestrator once the iterative loop terminates;
/// immutable after creation (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub turn_number: u32,
    pub user_input: String,
    pub generated_query: String,
    pub confidence_score: f64,
    pub iteration_count: u32,
    pub validation_result: ValidationOutcome,
    pub execution_result: Option<ExecutionOutcome>,
    pub reasoning_trace: Vec<String>,
    pub schema_context_snapshot: SchemaContext,
    pub examples_used: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
}
