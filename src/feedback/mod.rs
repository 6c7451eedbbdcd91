//! Feedback Router (C10) — turns a user's Up/Down rating on a Turn into an
//! Example, or updates an existing one idempotently.

use crate::example_store::ExampleStore;
use crate::types::{Complexity, Example, ExampleStatus, Feedback, Intent, Rating, Result, Turn};

pub struct FeedbackRouter;

impl FeedbackRouter {
    /// Applies the Feedback Router decision table (§4.8) to one piece of
    /// feedback on `turn`, creating or updating the derived Example.
    pub async fn route(store: &ExampleStore, turn: &Turn, feedback: &Feedback, provider_id: &str) -> Result<Example> {
        let existing = store
            .all()?
            .into_iter()
            .find(|e| e.source_conversation_id == Some(turn.conversation_id) && e.question == turn.user_input);

        let (status, is_good_example) = match (feedback.rating, turn.confidence_score) {
            (Rating::Up, c) if c >= 0.9 => (ExampleStatus::Approved, true),
            (Rating::Up, _) => (ExampleStatus::PendingReview, true),
            (Rating::Down, _) => (ExampleStatus::PendingReview, false),
        };

        let mut example = match existing {
            Some(mut e) => {
                e.status = status;
                e.is_good_example = is_good_example;
                e
            }
            None => {
                let intent = infer_intent(&turn.generated_query);
                let complexity = infer_complexity(&turn.generated_query);
                let mut e = Example::new_pending(
                    provider_id,
                    turn.user_input.clone(),
                    turn.generated_query.clone(),
                    is_good_example,
                    turn.schema_context_snapshot.table_names(),
                    intent,
                    complexity,
                    Some(turn.conversation_id),
                );
                e.status = status;
                e
            }
        };

        if example.status == ExampleStatus::Approved {
            example.embedding_indexed = false;
        }

        store.put(&example)?;
        Ok(example)
    }
}

fn infer_intent(query: &str) -> Intent {
    let lower = query.to_lowercase();
    if lower.contains("join") {
        Intent::Join
    } else if lower.contains("group by") {
        Intent::GroupBy
    } else if lower.contains("insert") {
        Intent::Insert
    } else if lower.contains("update") {
        Intent::Update
    } else if lower.contains("delete") {
        Intent::Delete
    } else {
        Intent::Filter
    }
}

fn infer_complexity(query: &str) -> Complexity {
    let lower = query.to_lowercase();
    let markers = ["join", "group by", "subquery", "with ", "union"].iter().filter(|m| lower.contains(**m)).count();
    match markers {
        0 => Complexity::Simple,
        1 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::storage::Storage;
    use crate::types::{FeedbackCategory, SchemaContext, ValidationOutcome, ValidationStatus};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn store() -> ExampleStore {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        ExampleStore::new(storage, Arc::new(HashingEmbedder::default()))
    }

    fn turn(confidence: f64) -> Turn {
        Turn {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            turn_number: 1,
            user_input: "show active customers".to_string(),
            generated_query: "SELECT * FROM customers WHERE active = true".to_string(),
            confidence_score: confidence,
            iteration_count: 1,
            validation_result: ValidationOutcome {
                status: ValidationStatus::Passed,
                errors: vec![],
                warnings: vec![],
                suggestions: vec![],
            },
            execution_result: None,
            reasoning_trace: vec![],
            schema_context_snapshot: SchemaContext::default(),
            examples_used: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn feedback(rating: Rating, turn_id: Uuid) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            turn_id,
            rating,
            category: FeedbackCategory::GreatResult,
            text: None,
            user_id: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn high_confidence_upvote_auto_approves() {
        let store = store();
        let t = turn(0.95);
        let example = FeedbackRouter::route(&store, &t, &feedback(Rating::Up, t.id), "p1").await.unwrap();
        assert_eq!(example.status, ExampleStatus::Approved);
        assert!(example.is_good_example);
    }

    #[tokio::test]
    async fn low_confidence_upvote_goes_to_pending_review() {
        let store = store();
        let t = turn(0.5);
        let example = FeedbackRouter::route(&store, &t, &feedback(Rating::Up, t.id), "p1").await.unwrap();
        assert_eq!(example.status, ExampleStatus::PendingReview);
        assert!(example.is_good_example);
    }

    #[tokio::test]
    async fn downvote_goes_to_pending_review_as_bad_example() {
        let store = store();
        let t = turn(0.95);
        let example = FeedbackRouter::route(&store, &t, &feedback(Rating::Down, t.id), "p1").await.unwrap();
        assert_eq!(example.status, ExampleStatus::PendingReview);
        assert!(!example.is_good_example);
    }

    #[tokio::test]
    async fn repeated_feedback_updates_rather_than_duplicates() {
        let store = store();
        let t = turn(0.5);
        FeedbackRouter::route(&store, &t, &feedback(Rating::Up, t.id), "p1").await.unwrap();
        FeedbackRouter::route(&store, &t, &feedback(Rating::Down, t.id), "p1").await.unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
