//! Core types shared across every component of the query orchestrator.

pub mod conversation;
pub mod error;
pub mod example;
pub mod message;
pub mod schema;

pub use conversation::{Conversation, ConversationStatus, ExecutionOutcome, Turn, ValidationOutcome};
pub use error::{OrchestratorError, Result};
pub use example::{Complexity, Example, ExampleStatus, Feedback, FeedbackCategory, Intent, Rating};
pub use message::{Event, Message, Role, Stage, TraceLevel, TracePayload, ValidationStatus};
pub use schema::{
    column_target_name, Annotation, Column, ForeignKey, QueryLanguage, Relationship, SchemaContext, SearchType, Table,
    TargetKind,
};
