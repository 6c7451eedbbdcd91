//! OpenTelemetry instrumentation for the query orchestrator.
//!
//! Follows OpenTelemetry semantic conventions for database operations:
//! - https://opentelemetry.io/docs/specs/semconv/database/database-spans/
//!
//! # Database Semantic Conventions
//!
//! **Span naming**: `{db.operation.name} {target}`
//! - Example: `get turns`, `scan examples`, `put conversations`
//!
//! **Required attributes**:
//! - `db.system.name`: Always `"rocksdb"`
//!
//! **Conditionally required**:
//! - `db.collection.name`: Column family name
//! - `db.operation.name`: Operation type (get, put, scan, delete, etc.)
//!
//! # Background Job Conventions
//!
//! For background operations (embedding indexing, review promotion):
//! - Use `INTERNAL` span kind
//! - Custom attributes: `job.type`, `job.status`, `job.batch_size`
//!
//! # Orchestrator Phase Conventions
//!
//! Each phase of the per-request pipeline (§4.7) gets its own `INTERNAL`
//! span tagged with `conversation_id` and `iteration` so a trace query can
//! reconstruct the full phase timeline for one request.

pub mod background;
pub mod context;
pub mod db;
pub mod orchestrator;

pub use background::{background_span, record_background_metrics, BackgroundJobType};
pub use context::{attach_trace_context, extract_trace_context, TraceContext};
pub use db::{db_query_span, db_span, record_db_metrics, DbOperation};
pub use orchestrator::{phase_span, Phase};

/// Install the process-wide tracing subscriber. Call once at startup.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
