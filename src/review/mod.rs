//! Review Service (C11) — the human-in-the-loop `PendingReview → (Approved |
//! Rejected)` state machine over derived Examples.

use crate::example_store::ExampleStore;
use crate::types::{Example, ExampleStatus, OrchestratorError, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

pub struct ReviewRequest {
    pub item_id: Uuid,
    pub decision: ReviewDecision,
    pub corrected_query: Option<String>,
    pub notes: Option<String>,
    pub reviewer_id: String,
}

/// The outcome of one review: the (possibly mutated) original Example and,
/// when a correction was supplied on approval, the new derived Example.
pub struct ReviewOutcome {
    pub original: Example,
    pub derived: Option<Example>,
}

pub struct ReviewService;

impl ReviewService {
    /// `priority = 100*[validation_failed] + 50*[user_submitted_correction]
    /// + round(max(0, 0.7 - confidence) * 100)` (only added when confidence <
    /// 0.7), per §4.9.
    pub fn priority(validation_failed: bool, user_submitted_correction: bool, confidence: f64) -> u32 {
        let mut score = 0u32;
        if validation_failed {
            score += 100;
        }
        if user_submitted_correction {
            score += 50;
        }
        if confidence < 0.7 {
            score += ((0.7 - confidence).max(0.0) * 100.0).round() as u32;
        }
        score
    }

    /// The `ReviewQueueItem` view: every `PendingReview` Example, ordered by
    /// derived priority, highest first. `Example` does not carry the
    /// originating Turn's confidence score or a user-submitted-correction
    /// flag, so this approximates `priority`'s three inputs from what the
    /// row itself carries — a downvoted example (`is_good_example = false`)
    /// stands in for `validation_failed`, since the Feedback Router only
    /// ever routes a Down rating to `PendingReview` that way (§4.8), and
    /// confidence defaults to the neutral 0.7 that contributes nothing to
    /// the score.
    pub fn queue(store: &ExampleStore) -> Result<Vec<Example>> {
        let mut items: Vec<Example> =
            store.all()?.into_iter().filter(|e| e.status == ExampleStatus::PendingReview).collect();
        items.sort_by_key(|e| std::cmp::Reverse(Self::priority(!e.is_good_example, false, 0.7)));
        Ok(items)
    }

    /// Applies a review decision. Terminal states (`Approved`/`Rejected`) are
    /// immutable — reviewing an already-terminal item is an error.
    pub async fn apply(store: &ExampleStore, request: ReviewRequest) -> Result<ReviewOutcome> {
        let mut original = store
            .get(request.item_id)?
            .ok_or_else(|| OrchestratorError::InvalidRequest(format!("no such review item: {}", request.item_id)))?;

        if original.status != ExampleStatus::PendingReview {
            return Err(OrchestratorError::InvalidRequest(format!(
                "review item {} is already in terminal state {:?}",
                request.item_id, original.status
            )));
        }

        original.reviewer = Some(request.reviewer_id.clone());
        original.reviewed_at = Some(chrono::Utc::now());
        original.review_notes = request.notes.clone();

        match request.decision {
            ReviewDecision::Reject => {
                original.status = ExampleStatus::Rejected;
                store.put(&original)?;
                Ok(ReviewOutcome { original, derived: None })
            }
            ReviewDecision::Approve => {
                let derived = if let Some(corrected_query) = request.corrected_query {
                    original.is_good_example = false;
                    original.corrected_query = Some(corrected_query.clone());
                    original.status = ExampleStatus::Approved;
                    original.embedding_indexed = false;

                    let mut derived = original.clone();
                    derived.id = Uuid::new_v4();
                    derived.query = corrected_query;
                    derived.is_good_example = true;
                    derived.corrected_query = None;
                    derived.status = ExampleStatus::Approved;
                    derived.embedding_indexed = false;

                    store.put(&original)?;
                    store.put(&derived)?;
                    Some(derived)
                } else {
                    original.status = ExampleStatus::Approved;
                    original.embedding_indexed = false;
                    store.put(&original)?;
                    None
                };
                Ok(ReviewOutcome { original, derived })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::storage::Storage;
    use crate::types::{Complexity, Intent};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn store() -> ExampleStore {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        ExampleStore::new(storage, Arc::new(HashingEmbedder::default()))
    }

    fn pending_example() -> Example {
        Example::new_pending(
            "p1",
            "show active customers",
            "SELECT * FROM customer WHERE active = 1",
            true,
            BTreeSet::new(),
            Intent::Filter,
            Complexity::Simple,
            None,
        )
    }

    #[tokio::test]
    async fn approval_without_correction_just_approves() {
        let store = store();
        let example = pending_example();
        store.put(&example).unwrap();

        let outcome = ReviewService::apply(
            &store,
            ReviewRequest {
                item_id: example.id,
                decision: ReviewDecision::Approve,
                corrected_query: None,
                notes: None,
                reviewer_id: "reviewer1".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.original.status, ExampleStatus::Approved);
        assert!(outcome.derived.is_none());
    }

    #[tokio::test]
    async fn approval_with_correction_splits_into_two_examples() {
        let store = store();
        let example = pending_example();
        store.put(&example).unwrap();

        let outcome = ReviewService::apply(
            &store,
            ReviewRequest {
                item_id: example.id,
                decision: ReviewDecision::Approve,
                corrected_query: Some("SELECT * FROM customers WHERE active = true".to_string()),
                notes: Some("fixed table name and boolean literal".to_string()),
                reviewer_id: "reviewer1".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(!outcome.original.is_good_example);
        assert_eq!(outcome.original.status, ExampleStatus::Approved);
        let derived = outcome.derived.unwrap();
        assert!(derived.is_good_example);
        assert_eq!(derived.status, ExampleStatus::Approved);
        assert_ne!(derived.id, outcome.original.id);
        assert!(!derived.embedding_indexed);
    }

    #[tokio::test]
    async fn rejection_marks_the_item_rejected() {
        let store = store();
        let example = pending_example();
        store.put(&example).unwrap();

        let outcome = ReviewService::apply(
            &store,
            ReviewRequest {
                item_id: example.id,
                decision: ReviewDecision::Reject,
                corrected_query: None,
                notes: None,
                reviewer_id: "reviewer1".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.original.status, ExampleStatus::Rejected);
    }

    #[tokio::test]
    async fn reviewing_a_terminal_item_is_an_error() {
        let store = store();
        let mut example = pending_example();
        example.status = ExampleStatus::Rejected;
        store.put(&example).unwrap();

        let result = ReviewService::apply(
            &store,
            ReviewRequest {
                item_id: example.id,
                decision: ReviewDecision::Approve,
                corrected_query: None,
                notes: None,
                reviewer_id: "reviewer1".to_string(),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn priority_combines_all_three_terms() {
        assert_eq!(ReviewService::priority(true, true, 0.8), 150);
        assert_eq!(ReviewService::priority(false, false, 0.5), 20);
        assert_eq!(ReviewService::priority(true, false, 0.0), 170);
    }

    #[test]
    fn queue_excludes_terminal_examples_and_ranks_bad_examples_first() {
        let store = store();
        let mut good = pending_example();
        good.question = "good one".to_string();
        let mut bad = pending_example();
        bad.question = "bad one".to_string();
        bad.is_good_example = false;
        let mut approved = pending_example();
        approved.question = "already approved".to_string();
        approved.status = ExampleStatus::Approved;

        store.put(&good).unwrap();
        store.put(&bad).unwrap();
        store.put(&approved).unwrap();

        let queue = ReviewService::queue(&store).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].question, "bad one");
        assert_eq!(queue[1].question, "good one");
    }
}
