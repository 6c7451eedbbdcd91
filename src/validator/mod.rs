//! Validator (C8) — runs Provider syntax (and optionally execution)
//! validation and emits a structured report the loop consumes as feedback.

use crate::provider::{is_dangerous_operation, ExecutionResult, Provider};
use crate::types::{QueryLanguage, Result, ValidationStatus};

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    /// Populated whenever execution actually ran, so callers that persist a
    /// Turn can carry the full result without re-executing the query.
    pub execution: Option<ExecutionResult>,
}

pub struct Validator;

impl Validator {
    /// Runs syntax validation and, when the Provider supports execution and
    /// the caller's request allows it, execution with a row cap. Warnings
    /// never fail the gate; errors always do. Execution timeouts and engine
    /// errors are failures, not fatal errors — the loop may refine further.
    pub async fn validate(
        provider: &dyn Provider,
        query: &str,
        language: QueryLanguage,
        allow_execution: bool,
        execution_row_cap: u64,
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        let syntax = provider.validate_syntax(query).await?;
        report.warnings.extend(syntax.warnings);
        if !syntax.valid {
            report.status = ValidationStatus::Failed;
            if let Some(error) = syntax.error {
                report.errors.push(error.clone());
                report.suggestions.push(format!("fix the reported syntax error: {error}"));
            }
        }

        if is_dangerous_operation(query, language) {
            report
                .warnings
                .push("query contains a dangerous, broadly-scoped operation".to_string());
            if allow_execution && report.status != ValidationStatus::Failed {
                report.status = ValidationStatus::Failed;
                report.errors.push("refusing to execute a dangerous, broadly-scoped operation".to_string());
                return Ok(report);
            }
        }

        if report.status == ValidationStatus::Failed {
            return Ok(report);
        }

        let capabilities = provider.describe();
        let can_execute = capabilities.has(crate::provider::Capability::QueryExecution);
        if allow_execution && can_execute {
            match provider.execute_query(query, execution_row_cap).await {
                Ok(result) if result.success => {
                    report.status = ValidationStatus::Passed;
                    report.execution = Some(result);
                }
                Ok(result) => {
                    report.status = ValidationStatus::Failed;
                    if let Some(error) = &result.error {
                        report.errors.push(error.clone());
                    }
                    report.execution = Some(result);
                }
                Err(e) => {
                    report.status = ValidationStatus::Failed;
                    report.errors.push(e.to_string());
                }
            }
        } else if report.status != ValidationStatus::Failed {
            report.status = ValidationStatus::Passed;
        }

        if !report.warnings.is_empty() && report.status == ValidationStatus::Passed {
            report.status = ValidationStatus::Warning;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sql::{SqlProvider, StaticExecutor};
    use crate::provider::SchemaDefinition;
    use crate::types::{Column, Table};
    use std::sync::Arc;

    fn schema_with_customers() -> SchemaDefinition {
        SchemaDefinition {
            tables: vec![Table {
                name: "customers".into(),
                schema_namespace: None,
                columns: vec![Column {
                    name: "id".into(),
                    type_name: "integer".into(),
                    nullable: false,
                    default: None,
                    is_primary_key: true,
                    is_unique: true,
                    comment: None,
                    nested: None,
                }],
                primary_key: vec!["id".into()],
                indexes: vec![],
                foreign_keys: vec![],
                comment: None,
            }],
        }
    }

    #[tokio::test]
    async fn syntax_error_fails_the_gate() {
        let provider = SqlProvider::new("p1", schema_with_customers(), Arc::new(StaticExecutor::new()));
        let report =
            Validator::validate(&provider, "SELEC * FROM customers", QueryLanguage::Sql, false, 10).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Failed);
    }

    #[tokio::test]
    async fn warnings_do_not_fail_the_gate() {
        let provider = SqlProvider::new("p1", schema_with_customers(), Arc::new(StaticExecutor::new()));
        let report =
            Validator::validate(&provider, "DELETE FROM customers WHERE id = 1", QueryLanguage::Sql, false, 10)
                .await
                .unwrap();
        assert_ne!(report.status, ValidationStatus::Failed);
    }

    #[tokio::test]
    async fn execution_mode_refuses_dangerous_operations() {
        let provider = SqlProvider::new("p1", schema_with_customers(), Arc::new(StaticExecutor::new()));
        let report = Validator::validate(&provider, "DELETE FROM customers", QueryLanguage::Sql, true, 10).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Failed);
    }

    #[tokio::test]
    async fn passes_on_valid_query_without_execution() {
        let provider = SqlProvider::new("p1", schema_with_customers(), Arc::new(StaticExecutor::new()));
        let report =
            Validator::validate(&provider, "SELECT * FROM customers", QueryLanguage::Sql, false, 10).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Passed);
    }
}
