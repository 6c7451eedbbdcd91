//! The Provider abstraction (C1) — the contract the orchestrator consumes
//! from pluggable data-source backends.
//!
//! Concrete database drivers are an explicit out-of-scope collaborator; this
//! module defines the trait and wire-shaping helpers every Provider
//! implementation must honor, plus one reference implementation (`sql`) good
//! enough to drive the orchestrator end to end in tests.

pub mod sql;

use crate::types::{OrchestratorError, QueryLanguage, Result, Table};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SchemaIntrospection,
    QueryValidation,
    QueryExecution,
    QueryExplanation,
    DryRun,
    CostEstimation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescription {
    pub provider_id: String,
    pub query_language: QueryLanguage,
    pub capabilities: HashSet<Capability>,
}

impl ProviderDescription {
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaDefinition {
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub row_count: Option<u64>,
    pub columns: Vec<String>,
    /// At most 10 sample rows, per §4.1.
    pub sample_rows: Vec<serde_json::Value>,
    pub affected_rows: Option<u64>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub const MAX_SAMPLE_ROWS: usize = 10;
}

/// Adapter over one data source: a relational DB, a document DB, or a
/// log-search platform. All operations are fallible with a typed error;
/// implementations must never let an uncategorized failure reach the
/// orchestrator.
#[async_trait]
pub trait Provider: Send + Sync {
    fn describe(&self) -> ProviderDescription;

    /// Must be safe to call concurrently. The orchestrator does not cache
    /// this itself — it consumes a cached view through an external schema
    /// service — but the reference implementation may cache internally.
    async fn get_schema(&self) -> Result<SchemaDefinition>;

    /// Must complete without executing the query against user data. Must
    /// detect: empty queries, multi-statement input where the dialect
    /// forbids it, and grammar errors the underlying engine reports.
    async fn validate_syntax(&self, query: &str) -> Result<ValidationReport>;

    /// Injects `row_limit` into the outgoing query and sets a statement-level
    /// timeout on the underlying connection. Fails with
    /// `OrchestratorError::Timeout` when the provider-configured deadline
    /// elapses.
    async fn execute_query(&self, query: &str, row_limit: u64) -> Result<ExecutionResult>;
}

/// Dialect-specific dangerous-operation detection, shared by the Validator
/// (§4.6) regardless of which concrete Provider is in play.
pub fn is_dangerous_operation(query: &str, language: QueryLanguage) -> bool {
    match language {
        QueryLanguage::Sql => sql_is_dangerous(query),
        QueryLanguage::MongoDb => mongo_is_dangerous(query),
        QueryLanguage::Spl => false,
    }
}

fn sql_is_dangerous(query: &str) -> bool {
    let upper = query.to_uppercase();
    let has_where = upper.contains("WHERE");
    if upper.contains("DROP ") || upper.contains("TRUNCATE ") {
        return true;
    }
    if upper.trim_start().starts_with("DELETE") && !has_where {
        return true;
    }
    if upper.trim_start().starts_with("UPDATE") && !has_where {
        return true;
    }
    false
}

fn mongo_is_dangerous(query: &str) -> bool {
    let lower = query.to_lowercase();
    if lower.contains("\"delete_many\"") && !lower.contains("\"filter\"") {
        return true;
    }
    if lower.contains("\"update_many\"") && !lower.contains("\"filter\"") {
        return true;
    }
    false
}

/// Inject a dialect-appropriate row cap into the outgoing query, per §6.
pub fn inject_row_limit(query: &str, language: QueryLanguage, row_limit: u64) -> Result<String> {
    match language {
        QueryLanguage::Sql => Ok(sql_inject_limit(query, row_limit)),
        QueryLanguage::MongoDb => Ok(query.to_string()), // caller sets limit via driver options
        QueryLanguage::Spl => Ok(spl_inject_head(query, row_limit)),
    }
}

fn sql_inject_limit(query: &str, row_limit: u64) -> String {
    let trimmed = query.trim_end().trim_end_matches(';');
    if trimmed.to_uppercase().contains("LIMIT") {
        trimmed.to_string()
    } else {
        format!("{trimmed} LIMIT {row_limit}")
    }
}

fn spl_inject_head(query: &str, row_limit: u64) -> String {
    let trimmed = query.trim_end();
    let upper = trimmed.to_uppercase();
    if upper.contains("| HEAD") || upper.contains("| TAIL") || upper.contains("| LIMIT") {
        trimmed.to_string()
    } else {
        format!("{trimmed} | head {row_limit}")
    }
}

pub fn validate_spl_entrypoint(query: &str) -> Result<()> {
    let trimmed = query.trim_start();
    if trimmed.starts_with("search") || trimmed.starts_with('|') {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidRequest(
            "SPL queries must begin with `search` or `|`".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_delete_without_where() {
        assert!(sql_is_dangerous("DELETE FROM customers"));
        assert!(!sql_is_dangerous("DELETE FROM customers WHERE id = 1"));
    }

    #[test]
    fn detects_update_without_where() {
        assert!(sql_is_dangerous("UPDATE customers SET active = false"));
        assert!(!sql_is_dangerous("UPDATE customers SET active = false WHERE id = 1"));
    }

    #[test]
    fn detects_drop_and_truncate() {
        assert!(sql_is_dangerous("DROP TABLE customers"));
        assert!(sql_is_dangerous("TRUNCATE TABLE customers"));
    }

    #[test]
    fn sql_limit_injection_is_idempotent() {
        let q = sql_inject_limit("SELECT * FROM customers", 50);
        assert_eq!(q, "SELECT * FROM customers LIMIT 50");
        let q2 = sql_inject_limit("SELECT * FROM customers LIMIT 10", 50);
        assert_eq!(q2, "SELECT * FROM customers LIMIT 10");
    }

    #[test]
    fn spl_head_injection_skips_existing_bound() {
        let q = spl_inject_head("search index=main", 100);
        assert_eq!(q, "search index=main | head 100");
        let q2 = spl_inject_head("search index=main | head 10", 100);
        assert_eq!(q2, "search index=main | head 10");
    }

    #[test]
    fn spl_entrypoint_validation() {
        assert!(validate_spl_entrypoint("search index=main").is_ok());
        assert!(validate_spl_entrypoint("| makeresults").is_ok());
        assert!(validate_spl_entrypoint("select * from t").is_err());
    }
}
