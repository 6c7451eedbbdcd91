//! Orchestrator (C9) — composes the Schema Expert, Retrieval Engine, Query
//! Builder, and Validator into the per-request phase pipeline, enforces
//! termination, persists conversation state, and emits an ordered event
//! stream.

pub mod conversation_store;

pub use conversation_store::ConversationStore;

use crate::example_store::ExampleStore;
use crate::llm::invoker::RateLimitedInvoker;
use crate::llm::{generation_prompt, parse_query_draft, refinement_prompt, score_draft, LlmInvoker, PriorFeedback};
use crate::provider::Provider;
use crate::retrieval::RetrievalEngine;
use crate::schema_expert::{AnnotationStore, ConversationTableHistory, SchemaExpert};
use crate::types::{
    Conversation, ConversationStatus, Event, ExecutionOutcome, Message, OrchestratorError, Result, Role, Stage, Turn,
    TraceLevel, TracePayload, ValidationOutcome, ValidationStatus,
};
use crate::validator::Validator;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Per-request knobs, mirroring the caller-supplied `options` in §6.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub max_iterations: u32,
    pub confidence_threshold: f64,
    pub clarification_threshold: f64,
    pub enable_execution: bool,
    pub trace_level: TraceLevel,
    pub timeout_seconds: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            confidence_threshold: 0.85,
            clarification_threshold: 0.6,
            enable_execution: false,
            trace_level: TraceLevel::Summary,
            timeout_seconds: 30,
        }
    }
}

pub struct OrchestratorRequest {
    pub provider_id: String,
    pub query: String,
    pub conversation_id: Option<Uuid>,
    pub user_id: String,
    pub workspace_id: String,
    pub options: RequestOptions,
}

/// One-shot response shape (§6). Streaming callers read `Event`s off the
/// channel passed to `handle` directly instead.
#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub conversation_id: Uuid,
    pub turn_id: Uuid,
    pub generated_query: String,
    pub confidence_score: f64,
    pub validation_status: ValidationStatus,
    pub validation_result: ValidationOutcome,
    pub execution_result: Option<ExecutionOutcome>,
    pub reasoning_trace: Vec<String>,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub iterations: u32,
}

/// Per-conversation-id lock striping so two concurrent turns on the same
/// conversation serialize, per §5's shared-resource policy.
#[derive(Default)]
struct ConversationLocks {
    locks: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    fn get(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().unwrap().entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

pub struct Orchestrator<I: LlmInvoker> {
    conversations: ConversationStore,
    examples: ExampleStore,
    annotations: AnnotationStore,
    providers: HashMap<String, Arc<dyn Provider>>,
    schema_expert: SchemaExpert,
    retrieval: RetrievalEngine,
    invoker: RateLimitedInvoker<I>,
    table_history: Mutex<ConversationTableHistory>,
    conversation_locks: ConversationLocks,
}

impl<I: LlmInvoker> Orchestrator<I> {
    pub fn new(
        conversations: ConversationStore,
        examples: ExampleStore,
        annotations: AnnotationStore,
        providers: HashMap<String, Arc<dyn Provider>>,
        schema_expert: SchemaExpert,
        retrieval: RetrievalEngine,
        invoker: RateLimitedInvoker<I>,
    ) -> Self {
        Self {
            conversations,
            examples,
            annotations,
            providers,
            schema_expert,
            retrieval,
            invoker,
            table_history: Mutex::new(ConversationTableHistory::default()),
            conversation_locks: ConversationLocks::default(),
        }
    }

    /// Convenience wrapper over `handle` for callers that only want the
    /// final response, not the intermediate event stream.
    pub async fn handle_one_shot(&self, request: OrchestratorRequest) -> Result<OrchestratorResponse> {
        let (tx, mut rx) = mpsc::channel(32);
        let drain = async { while rx.recv().await.is_some() {} };
        let (result, ()) = tokio::join!(self.handle(request, tx), drain);
        result
    }

    /// Runs one request end to end, streaming events to `events` as they
    /// occur. Returns the final response on success, or the terminal error
    /// that aborted the request.
    pub async fn handle(&self, request: OrchestratorRequest, events: mpsc::Sender<Event>) -> Result<OrchestratorResponse> {
        let deadline = Instant::now() + Duration::from_secs(request.options.timeout_seconds);
        let provider = self
            .providers
            .get(&request.provider_id)
            .ok_or_else(|| OrchestratorError::InvalidRequest(format!("unknown provider: {}", request.provider_id)))?
            .clone();

        let mut conversation = self.resolve_conversation(&request)?;
        let lock = self.conversation_locks.get(conversation.id);
        let _guard = lock.lock().await;

        let result = self.run_turn(&request, provider.as_ref(), &mut conversation, deadline, &events).await;

        if let Err(e) = &result {
            let _ = events.send(Event::Error { kind: e.kind().to_string(), message: e.to_string() }).await;
        }
        result
    }

    fn resolve_conversation(&self, request: &OrchestratorRequest) -> Result<Conversation> {
        match request.conversation_id {
            Some(id) => self
                .conversations
                .get(id)?
                .ok_or_else(|| OrchestratorError::InvalidRequest(format!("no such conversation: {id}"))),
            None => {
                let conversation =
                    Conversation::new(request.user_id.clone(), request.workspace_id.clone(), request.provider_id.clone());
                self.conversations.create(&conversation)?;
                Ok(conversation)
            }
        }
    }

    async fn run_turn(
        &self,
        request: &OrchestratorRequest,
        provider: &dyn Provider,
        conversation: &mut Conversation,
        deadline: Instant,
        events: &mpsc::Sender<Event>,
    ) -> Result<OrchestratorResponse> {
        let options = &request.options;
        let trace_level = options.trace_level;

        emit(events, 1, Stage::Started, 0.0, None).await;
        check_deadline(deadline)?;

        // Phase 1 — Schema Expert and Retrieval Engine, run truly in
        // parallel; this phase runs once, on the first iteration only.
        emit(events, 1, Stage::SchemaRetrieval, 0.1, None).await;
        emit(events, 1, Stage::RagSearch, 0.15, None).await;

        let annotations = self.annotations.all()?;
        let history = self.table_history.lock().await.clone();

        let schema_fut = self.schema_expert.build_context(
            provider,
            &request.query,
            &annotations,
            &history,
            Some(conversation.id),
        );
        let embedding_fut = self.examples.embed_question(&request.query);

        let (schema_result, embedding_result) = tokio::join!(schema_fut, embedding_fut);
        let schema_context = schema_result?;

        {
            let mut history = self.table_history.lock().await;
            history.record(conversation.id, schema_context.table_names());
        }

        let question_embedding = match embedding_result {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "question embedding failed, retrieval will skip the vector strategy");
                Vec::new()
            }
        };

        let relevant_tables: BTreeSet<String> = schema_context.table_names();
        let ranked = match self
            .retrieval
            .retrieve(&self.examples, &request.provider_id, &request.query, &question_embedding, &relevant_tables)
            .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval engine failed, proceeding with no examples");
                Vec::new()
            }
        };
        let examples: Vec<crate::types::Example> = ranked.iter().map(|r| r.example.clone()).collect();
        let good_example_similarities: Vec<f64> =
            ranked.iter().filter(|r| r.example.is_good_example).map(|r| r.final_score).collect();
        let examples_used: BTreeSet<Uuid> = examples.iter().map(|e| e.id).collect();

        emit(events, 1, Stage::ContextGathered, 0.3, None).await;
        check_deadline(deadline)?;

        let language = schema_context
            .query_language
            .ok_or_else(|| OrchestratorError::Internal("schema context missing query language".to_string()))?;

        let mut iteration: u32 = 1;
        let mut draft_query = String::new();
        let mut reasoning_trace: Vec<String> = Vec::new();
        let mut report = crate::validator::ValidationReport::default();
        let mut confidence = 0.0_f64;

        loop {
            check_deadline(deadline)?;
            let progress_base = (iteration - 1) as f64 / options.max_iterations as f64;
            let progress_step = 1.0 / options.max_iterations as f64;

            emit(events, iteration, Stage::QueryGeneration, progress_base + 0.1 * progress_step, None).await;

            let messages: Vec<Message> = if iteration == 1 {
                generation_prompt(&request.query, &schema_context, &examples)
            } else {
                refinement_prompt(
                    &request.query,
                    &schema_context,
                    &draft_query,
                    &PriorFeedback {
                        error_message: report.errors.first().cloned(),
                        suggestions: report.suggestions.clone(),
                    },
                )
            };

            let response = self.invoker.invoke_with_deadline(&messages, 0.2, 1024, deadline).await?;

            let draft = parse_query_draft(&response.content, language);
            draft_query = draft.query.clone();
            reasoning_trace = draft.reasoning_steps.clone();

            emit(
                events,
                iteration,
                Stage::QueryGenerated,
                progress_base + 0.4 * progress_step,
                trace_payload(trace_level, &reasoning_trace, Some(&response)),
            )
            .await;
            check_deadline(deadline)?;

            emit(events, iteration, Stage::Validation, progress_base + 0.5 * progress_step, None).await;

            let execution_row_cap = 100;
            report = Validator::validate(provider, &draft_query, language, options.enable_execution, execution_row_cap)
                .await?;

            emit(events, iteration, Stage::ValidationComplete, progress_base + 0.8 * progress_step, None).await;

            if report.execution.is_some() {
                emit(events, iteration, Stage::ExecutionComplete, progress_base + 0.9 * progress_step, None).await;
            }

            let signals = score_draft(&draft_query, &request.query, &schema_context, &good_example_similarities, iteration);
            confidence = signals.score();

            let terminate = iteration >= options.max_iterations
                || (confidence >= options.confidence_threshold && report.status == ValidationStatus::Passed);

            if terminate {
                break;
            }
            iteration += 1;
        }

        emit(events, iteration, Stage::Completed, 1.0, None).await;

        let needs_clarification = confidence < options.clarification_threshold;
        let clarification_question = if needs_clarification {
            let question = self.generate_clarification_question(&request.query, &draft_query, deadline).await.ok();
            if let Some(q) = &question {
                emit_clarification(events, iteration, q.clone(), None).await;
            }
            question
        } else {
            None
        };

        let validation_outcome = ValidationOutcome {
            status: report.status,
            errors: report.errors.clone(),
            warnings: report.warnings.clone(),
            suggestions: report.suggestions.clone(),
        };
        let execution_outcome = report.execution.as_ref().map(|r| ExecutionOutcome {
            success: r.success,
            row_count: r.row_count,
            columns: r.columns.clone(),
            sample_rows: r.sample_rows.clone(),
            affected_rows: r.affected_rows,
            execution_time_ms: r.execution_time_ms,
            error: r.error.clone(),
        });

        let turn = Turn {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            turn_number: conversation.next_turn_number(),
            user_input: request.query.clone(),
            generated_query: draft_query.clone(),
            confidence_score: confidence,
            iteration_count: iteration,
            validation_result: validation_outcome.clone(),
            execution_result: execution_outcome.clone(),
            reasoning_trace: reasoning_trace.clone(),
            schema_context_snapshot: schema_context,
            examples_used,
            created_at: chrono::Utc::now(),
        };

        self.conversations.append_turn(conversation, &turn)?;
        if needs_clarification {
            conversation.status = ConversationStatus::Active;
        } else {
            conversation.status = ConversationStatus::Completed;
            self.conversations.create(conversation)?;
        }

        let trace =
            if options.trace_level == TraceLevel::None { Vec::new() } else { reasoning_trace };

        let _ = events
            .send(Event::Result {
                turn_id: turn.id,
                conversation_id: conversation.id,
                generated_query: draft_query.clone(),
                confidence_score: confidence,
                validation_status: report.status,
                iterations: iteration,
                needs_clarification,
                trace: trace_payload(trace_level, &trace, None),
            })
            .await;

        Ok(OrchestratorResponse {
            conversation_id: conversation.id,
            turn_id: turn.id,
            generated_query: draft_query,
            confidence_score: confidence,
            validation_status: report.status,
            validation_result: validation_outcome,
            execution_result: execution_outcome,
            reasoning_trace: trace,
            needs_clarification,
            clarification_question,
            iterations: iteration,
        })
    }

    async fn generate_clarification_question(
        &self,
        question: &str,
        draft_query: &str,
        deadline: Instant,
    ) -> Result<String> {
        let messages = vec![
            Message {
                role: Role::System,
                content: "You write one short, specific follow-up question to disambiguate a user's data request."
                    .to_string(),
            },
            Message {
                role: Role::User,
                content: format!(
                    "The user asked: \"{question}\". The best candidate query so far was:\n{draft_query}\n\
                     Ask one clarifying question that would most improve confidence in the answer."
                ),
            },
        ];
        let response = self.invoker.invoke_with_deadline(&messages, 0.3, 128, deadline).await?;
        Ok(response.content.trim().to_string())
    }
}

fn check_deadline(deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(OrchestratorError::Timeout(Duration::from_secs(0)));
    }
    Ok(())
}

fn trace_payload(
    trace_level: TraceLevel,
    reasoning_steps: &[String],
    response: Option<&crate::llm::LlmResponse>,
) -> Option<TracePayload> {
    if trace_level == TraceLevel::None {
        return None;
    }
    let reasoning_steps = if trace_level == TraceLevel::Full { reasoning_steps.to_vec() } else { Vec::new() };
    Some(TracePayload {
        reasoning_steps,
        prompt_preview: None,
        tokens_in: response.map(|r| r.tokens_in),
        tokens_out: response.map(|r| r.tokens_out),
        cost_usd: response.map(|r| r.cost_usd),
    })
}

async fn emit(events: &mpsc::Sender<Event>, iteration: u32, stage: Stage, progress: f64, trace: Option<TracePayload>) {
    let _ = events.send(Event::Progress { iteration, stage, progress, trace }).await;
}

async fn emit_clarification(events: &mpsc::Sender<Event>, iteration: u32, question: String, trace: Option<TracePayload>) {
    let _ = events.send(Event::Clarification { iteration, question, trace }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::embeddings::HashingEmbedder;
    use crate::llm::LlmResponse;
    use crate::provider::sql::{SqlProvider, StaticExecutor};
    use crate::provider::SchemaDefinition;
    use crate::storage::Storage;
    use crate::types::{Column, Table};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedInvoker {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmInvoker for ScriptedInvoker {
        async fn invoke(&self, _messages: &[Message], _temperature: f32, _max_tokens: u32) -> Result<LlmResponse> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self.responses.get(idx).cloned().unwrap_or_else(|| self.responses.last().unwrap().clone());
            Ok(LlmResponse { content, tokens_in: 20, tokens_out: 10, cost_usd: 0.0001 })
        }
    }

    fn schema() -> SchemaDefinition {
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

    fn orchestrator(
        responses: Vec<String>,
    ) -> Orchestrator<ScriptedInvoker> {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let conversations = ConversationStore::new(storage.clone());
        let examples = ExampleStore::new(storage.clone(), Arc::new(HashingEmbedder::default()));
        let annotations = AnnotationStore::new(storage);

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert(
            "p1".to_string(),
            Arc::new(SqlProvider::new("p1", schema(), Arc::new(StaticExecutor::new()))),
        );

        let invoker = RateLimitedInvoker::new(
            ScriptedInvoker { responses, calls: AtomicUsize::new(0) },
            &RateLimitConfig::default(),
        );

        Orchestrator::new(
            conversations,
            examples,
            annotations,
            providers,
            SchemaExpert::new(8),
            RetrievalEngine::new(10, 0.0),
            invoker,
        )
    }

    fn request(query: &str, max_iterations: u32, confidence_threshold: f64) -> OrchestratorRequest {
        OrchestratorRequest {
            provider_id: "p1".to_string(),
            query: query.to_string(),
            conversation_id: None,
            user_id: "u1".to_string(),
            workspace_id: "w1".to_string(),
            options: RequestOptions { max_iterations, confidence_threshold, ..RequestOptions::default() },
        }
    }

    #[tokio::test]
    async fn terminates_on_first_pass_when_confidence_clears_threshold() {
        let orchestrator = orchestrator(vec![
            "<reasoning_steps>pick customers table</reasoning_steps><query>SELECT * FROM customers</query>".to_string(),
        ]);
        let response = orchestrator.handle_one_shot(request("show all customers", 5, 0.0)).await.unwrap();
        assert_eq!(response.iterations, 1);
        assert_eq!(response.validation_status, ValidationStatus::Passed);
    }

    #[tokio::test]
    async fn exhausts_max_iterations_when_confidence_never_clears() {
        let orchestrator = orchestrator(vec![
            "<reasoning_steps>guess</reasoning_steps><query>SELECT * FROM customers</query>".to_string(),
        ]);
        let response = orchestrator.handle_one_shot(request("maybe something kind of customers", 2, 0.999)).await.unwrap();
        assert_eq!(response.iterations, 2);
    }

    #[tokio::test]
    async fn persists_a_turn_on_the_conversation() {
        let orchestrator = orchestrator(vec![
            "<reasoning_steps>pick customers table</reasoning_steps><query>SELECT * FROM customers</query>".to_string(),
        ]);
        let response = orchestrator.handle_one_shot(request("show all customers", 5, 0.0)).await.unwrap();
        let turns = orchestrator.conversations.turns(response.conversation_id).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].generated_query, "SELECT * FROM customers");
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let orchestrator = orchestrator(vec!["<query>SELECT 1</query>".to_string()]);
        let mut req = request("show all customers", 5, 0.0);
        req.provider_id = "does-not-exist".to_string();
        let result = orchestrator.handle_one_shot(req).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn low_confidence_result_requests_clarification() {
        let orchestrator = orchestrator(vec![
            "<reasoning_steps>guess</reasoning_steps><query>SELECT * FROM customers</query>".to_string(),
            "Did you mean active customers only?".to_string(),
        ]);
        let response =
            orchestrator.handle_one_shot(request("maybe something kind of customers", 1, 0.999)).await.unwrap();
        assert!(response.needs_clarification);
        assert!(response.clarification_question.is_some());
    }
}
