//! Intent classification and keyword extraction for the Retrieval Engine's
//! Intent strategy (§4.4). Both use the LLM Invoker at temperature 0 and
//! fall back to a deterministic heuristic on failure.

use crate::types::Intent;

const HEDGING_WORDS: &[&str] = &["maybe", "perhaps", "something", "stuff", "kind of", "sort of"];

/// Deterministic fallback: whitespace tokens of length >= 4, intent = Filter.
pub fn heuristic_keywords(question: &str) -> Vec<String> {
    question
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| t.len() >= 4)
        .collect()
}

pub fn heuristic_intent() -> Intent {
    Intent::Filter
}

/// Classifies the coarse-grained intent of a question from surface syntax
/// alone, used when the LLM call for intent classification is unavailable.
/// A real Intent classification LLM call is wired in by the Retrieval
/// Engine via `llm::invoker::LlmInvoker`; this is the offline fallback path.
pub fn classify_intent_heuristically(question: &str) -> Intent {
    let lower = question.to_lowercase();
    if lower.contains("join") || lower.contains(" and their ") || lower.contains("with their") {
        Intent::Join
    } else if lower.contains("group by")
        || lower.contains("per ")
        || lower.contains("average")
        || lower.contains("sum of")
        || lower.contains("total")
    {
        Intent::Aggregation
    } else if lower.contains("sort") || lower.contains("order by") || lower.contains("highest") || lower.contains("lowest")
    {
        Intent::Sort
    } else if lower.contains("insert") || lower.contains("create a") {
        Intent::Insert
    } else if lower.contains("update") {
        Intent::Update
    } else if lower.contains("delete") || lower.contains("remove") {
        Intent::Delete
    } else {
        heuristic_intent()
    }
}

pub fn is_hedging(question: &str) -> bool {
    let lower = question.to_lowercase();
    HEDGING_WORDS.iter().any(|w| lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_keywords_of_length_four_or_more() {
        let keywords = heuristic_keywords("show me all orders from last year");
        assert_eq!(keywords, vec!["show", "orders", "from", "last", "year"]);
    }

    #[test]
    fn classifies_aggregation_intent() {
        assert_eq!(classify_intent_heuristically("total revenue per region"), Intent::Aggregation);
    }

    #[test]
    fn classifies_join_intent() {
        assert_eq!(classify_intent_heuristically("customers with their orders"), Intent::Join);
    }

    #[test]
    fn falls_back_to_filter_intent() {
        assert_eq!(classify_intent_heuristically("show active customers"), Intent::Filter);
    }

    #[test]
    fn detects_hedging_language() {
        assert!(is_hedging("maybe something about orders"));
        assert!(!is_hedging("show active customers"));
    }
}
