//! Query Builder (C7) — drafts and refines candidate queries across
//! iterations and scores the confidence that gates termination.

use crate::llm::invoker::LlmResponse;
use crate::types::{Example, Message, QueryLanguage, Role, SchemaContext};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Parsed LLM output: `{reasoning_steps, query}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDraft {
    pub reasoning_steps: Vec<String>,
    pub query: String,
}

/// Validator feedback fed back into the refinement prompt.
#[derive(Debug, Clone)]
pub struct PriorFeedback {
    pub error_message: Option<String>,
    pub suggestions: Vec<String>,
}

/// Builds the iteration-1 generation prompt: question, flattened schema, and
/// up to 3 top-ranked good examples plus any surfaced bad examples paired
/// with their expert corrections.
pub fn generation_prompt(question: &str, schema: &SchemaContext, examples: &[Example]) -> Vec<Message> {
    let mut body = String::new();
    body.push_str("# Question\n");
    body.push_str(question);
    body.push_str("\n\n# Schema\n");
    body.push_str(&schema.flatten());

    let good: Vec<&Example> = examples.iter().filter(|e| e.is_good_example).take(3).collect();
    if !good.is_empty() {
        body.push_str("\n\n# Good examples\n");
        for example in good {
            body.push_str(&format!("Q: {}\nQuery: {}\n\n", example.question, example.query));
        }
    }

    let bad: Vec<&Example> = examples.iter().filter(|e| !e.is_good_example).collect();
    if !bad.is_empty() {
        body.push_str("# Known-bad examples (do not repeat)\n");
        for example in bad {
            body.push_str(&format!("Q: {}\nWrong query: {}\n", example.question, example.query));
            if let Some(corrected) = &example.corrected_query {
                body.push_str(&format!("Correction: {corrected}\n"));
            }
            body.push('\n');
        }
    }

    body.push_str(&format!(
        "\nRespond with a tagged structure: <reasoning_steps>...</reasoning_steps><query>...</query> \
         targeting the {:?} dialect.",
        schema.query_language
    ));

    vec![
        Message { role: Role::System, content: "You are a careful query-drafting assistant.".to_string() },
        Message { role: Role::User, content: body },
    ]
}

/// Builds an iteration 2..N refinement prompt: question, schema, prior draft,
/// prior validator feedback.
pub fn refinement_prompt(
    question: &str,
    schema: &SchemaContext,
    prior_draft: &str,
    prior_feedback: &PriorFeedback,
) -> Vec<Message> {
    let mut body = String::new();
    body.push_str("# Question\n");
    body.push_str(question);
    body.push_str("\n\n# Schema\n");
    body.push_str(&schema.flatten());
    body.push_str("\n\n# Prior draft\n");
    body.push_str(prior_draft);
    body.push_str("\n\n# Prior validator feedback\n");
    if let Some(error) = &prior_feedback.error_message {
        body.push_str(&format!("Error: {error}\n"));
    }
    for suggestion in &prior_feedback.suggestions {
        body.push_str(&format!("Suggestion: {suggestion}\n"));
    }
    body.push_str(
        "\nRevise the draft to address the feedback. Respond with a tagged structure: \
         <reasoning_steps>...</reasoning_steps><query>...</query>.",
    );

    vec![
        Message { role: Role::System, content: "You are a careful query-drafting assistant.".to_string() },
        Message { role: Role::User, content: body },
    ]
}

fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).expect("static tag pattern is valid regex")
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("static fence pattern is valid regex"))
}

/// Parses the LLM's raw text into a `QueryDraft`. Falls back to extracting
/// the first fenced code block matching the provider's query language (or
/// any fenced block if none matches) when the tagged structure is absent.
pub fn parse_query_draft(raw: &str, language: QueryLanguage) -> QueryDraft {
    let query_tag = tag_regex("query");
    let reasoning_tag = tag_regex("reasoning_steps");

    if let Some(query_match) = query_tag.captures(raw) {
        let query = query_match[1].trim().to_string();
        let reasoning_steps = reasoning_tag
            .captures(raw)
            .map(|c| c[1].lines().map(|l| l.trim().trim_start_matches('-').trim().to_string()))
            .map(|lines| lines.filter(|l| !l.is_empty()).collect())
            .unwrap_or_default();
        return QueryDraft { reasoning_steps, query };
    }

    let wanted_fence = match language {
        QueryLanguage::Sql => "sql",
        QueryLanguage::MongoDb => "json",
        QueryLanguage::Spl => "spl",
    };

    let mut fallback_block: Option<String> = None;
    let mut matched_block: Option<String> = None;
    for capture in fence_regex().captures_iter(raw) {
        let tag = capture[1].to_lowercase();
        let body = capture[2].trim().to_string();
        if fallback_block.is_none() {
            fallback_block = Some(body.clone());
        }
        if tag == wanted_fence {
            matched_block = Some(body);
            break;
        }
    }

    QueryDraft {
        reasoning_steps: Vec::new(),
        query: matched_block.or(fallback_block).unwrap_or_else(|| raw.trim().to_string()),
    }
}

/// The five confidence signals, each normalized to `[0, 1]`, per §4.5.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceSignals {
    pub schema_coverage: f64,
    pub example_similarity: f64,
    pub complexity_match: f64,
    pub iteration_penalty: f64,
    pub non_ambiguity: f64,
}

const WEIGHT_SCHEMA_COVERAGE: f64 = 0.30;
const WEIGHT_EXAMPLE_SIMILARITY: f64 = 0.20;
const WEIGHT_COMPLEXITY_MATCH: f64 = 0.20;
const WEIGHT_ITERATION_PENALTY: f64 = 0.15;
const WEIGHT_NON_AMBIGUITY: f64 = 0.15;

impl ConfidenceSignals {
    /// Weighted sum, rounded to three decimals.
    pub fn score(&self) -> f64 {
        let raw = self.schema_coverage * WEIGHT_SCHEMA_COVERAGE
            + self.example_similarity * WEIGHT_EXAMPLE_SIMILARITY
            + self.complexity_match * WEIGHT_COMPLEXITY_MATCH
            + self.iteration_penalty * WEIGHT_ITERATION_PENALTY
            + self.non_ambiguity * WEIGHT_NON_AMBIGUITY;
        (raw * 1000.0).round() / 1000.0
    }
}

const AMBIGUITY_WORDS: &[&str] = &["maybe", "perhaps", "something", "some", "any", "stuff", "thing", "kind of"];
const COMPLEXITY_KEYWORDS: &[&str] = &["join", "group", "total", "average", "sum", "count", "compare", "across"];

/// `schema_coverage`: fraction of tables named in the draft that exist in
/// the SchemaContext; 0.7 neutral if no explicit table references. The
/// denominator is the number of distinct known tables actually mentioned in
/// the draft, not the size of the whole SchemaContext — a draft naming one
/// valid table out of an eight-table context still fully covers what it
/// named.
pub fn schema_coverage(draft_query: &str, schema: &SchemaContext) -> f64 {
    let lower = draft_query.to_lowercase();
    let known: Vec<String> = schema.table_names().into_iter().map(|t| t.to_lowercase()).collect();

    let tokens: Vec<&str> =
        lower.split(|c: char| !c.is_alphanumeric() && c != '_').filter(|t| t.len() > 2).collect();
    let referenced = tokens.iter().filter(|t| known.iter().any(|k| k == *t)).count();

    if referenced == 0 {
        return 0.7;
    }
    let distinct_known_referenced = known.iter().filter(|k| tokens.iter().any(|t| t == k)).count();
    (referenced as f64 / distinct_known_referenced.max(1) as f64).clamp(0.0, 1.0)
}

/// `example_similarity`: maximum similarity among retrieved good examples;
/// 0.5 neutral if none retrieved. `similarities` are the retrieval engine's
/// final per-example scores for examples flagged `is_good_example`.
pub fn example_similarity(good_example_similarities: &[f64]) -> f64 {
    good_example_similarities
        .iter()
        .cloned()
        .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.max(x))))
        .unwrap_or(0.5)
}

/// `complexity_match`: 0.9 if the draft's complexity markers match the
/// question's implied complexity keywords, 0.7 otherwise.
pub fn complexity_match(draft_query: &str, question: &str) -> f64 {
    let draft_lower = draft_query.to_lowercase();
    let draft_has_complexity = draft_lower.contains("join")
        || draft_lower.contains("group by")
        || draft_lower.contains("sum(")
        || draft_lower.contains("avg(")
        || draft_lower.contains("count(");
    let question_lower = question.to_lowercase();
    let question_implies_complexity = COMPLEXITY_KEYWORDS.iter().any(|kw| question_lower.contains(kw));

    if draft_has_complexity == question_implies_complexity {
        0.9
    } else {
        0.7
    }
}

/// `iteration_penalty`: `max(0.5, 1 - (iteration-1)*0.1)`.
pub fn iteration_penalty(iteration: u32) -> f64 {
    (1.0 - (iteration.saturating_sub(1) as f64) * 0.1).max(0.5)
}

/// `non_ambiguity`: `1 - min(1, ambiguity_word_count * 0.3)`, where a
/// question with fewer than 3 whitespace tokens also contributes ambiguity.
pub fn non_ambiguity(question: &str) -> f64 {
    let lower = question.to_lowercase();
    let mut ambiguity_word_count = AMBIGUITY_WORDS.iter().filter(|w| lower.contains(*w)).count();
    if question.split_whitespace().count() < 3 {
        ambiguity_word_count += 1;
    }
    1.0 - (ambiguity_word_count as f64 * 0.3).min(1.0)
}

pub fn score_draft(
    draft_query: &str,
    question: &str,
    schema: &SchemaContext,
    good_example_similarities: &[f64],
    iteration: u32,
) -> ConfidenceSignals {
    ConfidenceSignals {
        schema_coverage: schema_coverage(draft_query, schema),
        example_similarity: example_similarity(good_example_similarities),
        complexity_match: complexity_match(draft_query, question),
        iteration_penalty: iteration_penalty(iteration),
        non_ambiguity: non_ambiguity(question),
    }
}

/// Token accounting surfaced alongside a draft for `reasoning_trace` rollups.
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftUsage {
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
}

impl From<&LlmResponse> for DraftUsage {
    fn from(response: &LlmResponse) -> Self {
        Self { tokens_in: response.tokens_in, tokens_out: response.tokens_out, cost_usd: response.cost_usd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Table};
    use std::collections::BTreeMap;

    fn schema() -> SchemaContext {
        SchemaContext {
            tables: vec![Table {
                name: "orders".into(),
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
            relationships: vec![],
            annotations: BTreeMap::new(),
            query_language: Some(QueryLanguage::Sql),
        }
    }

    fn bare_table(name: &str) -> Table {
        Table {
            name: name.into(),
            schema_namespace: None,
            columns: vec![],
            primary_key: vec!["id".into()],
            indexes: vec![],
            foreign_keys: vec![],
            comment: None,
        }
    }

    fn multi_table_schema() -> SchemaContext {
        SchemaContext {
            tables: vec![
                bare_table("orders"),
                bare_table("customers"),
                bare_table("products"),
                bare_table("warehouses"),
                bare_table("shipments"),
                bare_table("invoices"),
                bare_table("payments"),
                bare_table("suppliers"),
            ],
            relationships: vec![],
            annotations: BTreeMap::new(),
            query_language: Some(QueryLanguage::Sql),
        }
    }

    #[test]
    fn parses_tagged_structure() {
        let raw = "<reasoning_steps>\n- look at orders\n</reasoning_steps><query>SELECT * FROM orders</query>";
        let draft = parse_query_draft(raw, QueryLanguage::Sql);
        assert_eq!(draft.query, "SELECT * FROM orders");
        assert_eq!(draft.reasoning_steps, vec!["look at orders"]);
    }

    #[test]
    fn falls_back_to_matching_fenced_block() {
        let raw = "here you go\n```sql\nSELECT * FROM orders\n```\nhope that helps";
        let draft = parse_query_draft(raw, QueryLanguage::Sql);
        assert_eq!(draft.query, "SELECT * FROM orders");
    }

    #[test]
    fn falls_back_to_any_fenced_block_when_no_match() {
        let raw = "```text\nSELECT * FROM orders\n```";
        let draft = parse_query_draft(raw, QueryLanguage::Sql);
        assert_eq!(draft.query, "SELECT * FROM orders");
    }

    #[test]
    fn schema_coverage_is_neutral_without_table_references() {
        assert_eq!(schema_coverage("SELECT 1", &schema()), 0.7);
    }

    #[test]
    fn schema_coverage_is_full_for_known_table() {
        assert_eq!(schema_coverage("SELECT * FROM orders", &schema()), 1.0);
    }

    #[test]
    fn schema_coverage_is_full_when_draft_names_one_valid_table_in_a_large_schema() {
        assert_eq!(schema_coverage("SELECT * FROM customers", &multi_table_schema()), 1.0);
    }

    #[test]
    fn schema_coverage_is_full_when_draft_names_several_valid_tables() {
        let draft = "SELECT * FROM orders JOIN customers ON orders.customer_id = customers.id";
        assert_eq!(schema_coverage(draft, &multi_table_schema()), 1.0);
    }

    #[test]
    fn example_similarity_is_neutral_when_empty() {
        assert_eq!(example_similarity(&[]), 0.5);
    }

    #[test]
    fn example_similarity_takes_the_maximum() {
        assert_eq!(example_similarity(&[0.3, 0.8, 0.5]), 0.8);
    }

    #[test]
    fn iteration_penalty_floors_at_half() {
        assert!((iteration_penalty(1) - 1.0).abs() < 1e-9);
        assert!((iteration_penalty(2) - 0.9).abs() < 1e-9);
        assert!((iteration_penalty(10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn non_ambiguity_penalizes_hedging_and_short_questions() {
        assert!((non_ambiguity("show revenue by month") - 1.0).abs() < 1e-9);
        assert!(non_ambiguity("maybe something") < 1.0);
        assert!(non_ambiguity("orders") < 1.0);
    }

    #[test]
    fn confidence_score_rounds_to_three_decimals() {
        let signals = ConfidenceSignals {
            schema_coverage: 1.0,
            example_similarity: 0.8333333,
            complexity_match: 0.9,
            iteration_penalty: 1.0,
            non_ambiguity: 1.0,
        };
        let score = signals.score();
        assert_eq!((score * 1000.0).round(), score * 1000.0);
    }
}
