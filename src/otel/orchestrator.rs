//! Spans for the per-request phase pipeline (§4.7).

use tracing::{span, Level, Span};

#[derive(Debug, Clone, Copy)]
pub enum Phase {
    Phase1SchemaAndRetrieval,
    Phase2QueryBuilder,
    Phase3Validator,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase1SchemaAndRetrieval => "phase1.schema_and_retrieval",
            Self::Phase2QueryBuilder => "phase2.query_builder",
            Self::Phase3Validator => "phase3.validator",
        }
    }
}

/// Span for one phase of one iteration of one request.
pub fn phase_span(phase: Phase, conversation_id: uuid::Uuid, iteration: u32) -> Span {
    span!(
        Level::INFO,
        "orchestrator.phase",
        otel.name = phase.as_str(),
        otel.kind = "internal",
        conversation_id = %conversation_id,
        iteration = iteration,
    )
}
