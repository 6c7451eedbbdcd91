//! LLM-powered components: invocation (C2), query drafting (C7), and the
//! intent/keyword heuristics the Retrieval Engine (C6) falls back on.

pub mod intent;
pub mod invoker;
pub mod openai;
pub mod query_builder;

pub use intent::{classify_intent_heuristically, heuristic_intent, heuristic_keywords, is_hedging};
pub use invoker::{model_cost, LlmInvoker, LlmResponse, ModelCost, RateLimitedInvoker};
pub use openai::OpenAiInvoker;
pub use query_builder::{
    complexity_match, example_similarity, generation_prompt, iteration_penalty, non_ambiguity,
    parse_query_draft, refinement_prompt, schema_coverage, score_draft, ConfidenceSignals, DraftUsage,
    PriorFeedback, QueryDraft,
};
