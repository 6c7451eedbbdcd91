//! The Example entity — a stored (question, query) pair the retrieval
//! engine (C6) ranks and the query builder (C7) grounds generations on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleStatus {
    PendingReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Aggregation,
    Filter,
    Join,
    Sort,
    GroupBy,
    Subquery,
    WindowFn,
    Cte,
    Union,
    Insert,
    Update,
    Delete,
    Create,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub id: Uuid,
    pub provider_id: String,
    pub question: String,
    pub query: String,
    pub is_good_example: bool,
    pub status: ExampleStatus,
    pub involved_tables: BTreeSet<String>,
    pub intent: Intent,
    pub complexity: Complexity,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub corrected_query: Option<String>,
    pub review_notes: Option<String>,
    pub source_conversation_id: Option<Uuid>,
    pub embedding_indexed: bool,
}

impl Example {
    /// A new example created from user feedback or manual ingest, always
    /// starting life in `PendingReview` — nothing here goes directly to
    /// `Approved` except via the auto-approve feedback rule (§4.8), which
    /// constructs the row itself rather than calling this constructor.
    pub fn new_pending(
        provider_id: impl Into<String>,
        question: impl Into<String>,
        query: impl Into<String>,
        is_good_example: bool,
        involved_tables: BTreeSet<String>,
        intent: Intent,
        complexity: Complexity,
        source_conversation_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id: provider_id.into(),
            question: question.into(),
            query: query.into(),
            is_good_example,
            status: ExampleStatus::PendingReview,
            involved_tables,
            intent,
            complexity,
            reviewer: None,
            reviewed_at: None,
            corrected_query: None,
            review_notes: None,
            source_conversation_id,
            embedding_indexed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    IncorrectResult,
    SyntaxError,
    MissingContext,
    PerformanceIssue,
    ClarificationNeeded,
    GreatResult,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    /// One Feedback per Turn; re-submission for the same turn must be
    /// rejected by the caller (the Feedback Router enforces idempotence by
    /// updating rather than duplicating the derived Example, see §4.8).
    pub turn_id: Uuid,
    pub rating: Rating,
    pub category: FeedbackCategory,
    pub text: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}
