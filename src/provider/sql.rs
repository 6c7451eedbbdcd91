//! Reference SQL Provider.
//!
//! Uses `sqlparser` for syntax validation (parse-only — never touches user
//! data) and delegates execution to a pluggable `QueryExecutor` so this
//! module stays free of any concrete database driver dependency. A concrete
//! driver (Postgres, MySQL, SQLite, …) is an out-of-scope collaborator the
//! deployer supplies by implementing `QueryExecutor`.

use crate::provider::{
    inject_row_limit, is_dangerous_operation, Capability, ExecutionResult, Provider,
    ProviderDescription, SchemaDefinition, ValidationReport,
};
use crate::types::{OrchestratorError, QueryLanguage, Result, Table};
use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Executes a validated, row-limited SQL string against a concrete backend.
///
/// This is the seam a deployer fills in with a real driver. The in-memory
/// `StaticExecutor` below is enough to exercise the orchestrator's full
/// loop in tests without depending on one.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str, row_limit: u64) -> Result<ExecutionResult>;
}

/// A deterministic in-memory executor for tests and local smoke-testing.
/// Always "succeeds" with zero rows unless a canned response was registered
/// for the exact query string.
pub struct StaticExecutor {
    canned: std::collections::HashMap<String, ExecutionResult>,
}

impl StaticExecutor {
    pub fn new() -> Self {
        Self { canned: std::collections::HashMap::new() }
    }

    pub fn with_response(mut self, query: impl Into<String>, result: ExecutionResult) -> Self {
        self.canned.insert(query.into(), result);
        self
    }
}

impl Default for StaticExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn execute(&self, query: &str, _row_limit: u64) -> Result<ExecutionResult> {
        if let Some(result) = self.canned.get(query) {
            return Ok(result.clone());
        }
        Ok(ExecutionResult {
            success: true,
            row_count: Some(0),
            columns: vec![],
            sample_rows: vec![],
            affected_rows: None,
            execution_time_ms: 0,
            error: None,
        })
    }
}

pub struct SqlProvider {
    provider_id: String,
    schema: SchemaDefinition,
    executor: Arc<dyn QueryExecutor>,
    statement_timeout: Duration,
    allow_execution: bool,
}

impl SqlProvider {
    pub fn new(provider_id: impl Into<String>, schema: SchemaDefinition, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            provider_id: provider_id.into(),
            schema,
            executor,
            statement_timeout: Duration::from_secs(10),
            allow_execution: true,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    fn known_table_names(&self) -> HashSet<String> {
        self.schema.tables.iter().map(|t: &Table| t.name.to_lowercase()).collect()
    }
}

#[async_trait]
impl Provider for SqlProvider {
    fn describe(&self) -> ProviderDescription {
        let mut capabilities = HashSet::new();
        capabilities.insert(Capability::SchemaIntrospection);
        capabilities.insert(Capability::QueryValidation);
        if self.allow_execution {
            capabilities.insert(Capability::QueryExecution);
        }
        ProviderDescription {
            provider_id: self.provider_id.clone(),
            query_language: QueryLanguage::Sql,
            capabilities,
        }
    }

    async fn get_schema(&self) -> Result<SchemaDefinition> {
        Ok(self.schema.clone())
    }

    async fn validate_syntax(&self, query: &str) -> Result<ValidationReport> {
        if query.trim().is_empty() {
            return Ok(ValidationReport {
                valid: false,
                error: Some("query is empty".to_string()),
                warnings: vec![],
            });
        }

        let dialect = GenericDialect {};
        let statements = match Parser::parse_sql(&dialect, query) {
            Ok(stmts) => stmts,
            Err(e) => {
                return Ok(ValidationReport {
                    valid: false,
                    error: Some(e.to_string()),
                    warnings: vec![],
                })
            }
        };

        if statements.is_empty() {
            return Ok(ValidationReport {
                valid: false,
                error: Some("query parsed to zero statements".to_string()),
                warnings: vec![],
            });
        }
        if statements.len() > 1 {
            return Ok(ValidationReport {
                valid: false,
                error: Some("multi-statement queries are not permitted".to_string()),
                warnings: vec![],
            });
        }

        let mut warnings = Vec::new();
        let known = self.known_table_names();
        for table in referenced_tables(&statements[0]) {
            if !known.contains(&table.to_lowercase()) {
                return Ok(ValidationReport {
                    valid: false,
                    error: Some(format!("unknown table {table}")),
                    warnings,
                });
            }
        }
        if is_dangerous_operation(query, QueryLanguage::Sql) {
            warnings.push("query contains a dangerous, broadly-scoped operation".to_string());
        }

        Ok(ValidationReport { valid: true, error: None, warnings })
    }

    async fn execute_query(&self, query: &str, row_limit: u64) -> Result<ExecutionResult> {
        if is_dangerous_operation(query, QueryLanguage::Sql) {
            return Err(OrchestratorError::InvalidRequest(
                "refusing to execute a dangerous, broadly-scoped operation".to_string(),
            ));
        }

        let limited = inject_row_limit(query, QueryLanguage::Sql, row_limit)?;
        match timeout(self.statement_timeout, self.executor.execute(&limited, row_limit)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout(self.statement_timeout)),
        }
    }
}

/// Best-effort extraction of table names referenced by a parsed statement,
/// used only to catch unknown-table errors before hitting the backend.
fn referenced_tables(statement: &sqlparser::ast::Statement) -> Vec<String> {
    use sqlparser::ast::{SetExpr, Statement, TableFactor};

    fn from_table_factor(factor: &TableFactor, out: &mut Vec<String>) {
        if let TableFactor::Table { name, .. } = factor {
            out.push(name.to_string());
        }
    }

    let mut out = Vec::new();
    if let Statement::Query(query) = statement {
        if let SetExpr::Select(select) = query.body.as_ref() {
            for twj in &select.from {
                from_table_factor(&twj.relation, &mut out);
                for join in &twj.joins {
                    from_table_factor(&join.relation, &mut out);
                }
            }
        }
    }
    out
}
