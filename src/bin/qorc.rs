//! qorc — command-line front end for the query orchestrator.

use clap::{Parser, Subcommand};
use query_orchestrator::config::RateLimitConfig;
use query_orchestrator::embeddings::{EmbeddingProvider, HashingEmbedder};
use query_orchestrator::example_store::ExampleStore;
use query_orchestrator::llm::{LlmInvoker, OpenAiInvoker, RateLimitedInvoker};
use query_orchestrator::orchestrator::{ConversationStore, RequestOptions};
use query_orchestrator::provider::sql::{SqlProvider, StaticExecutor};
use query_orchestrator::provider::{Provider, SchemaDefinition};
use query_orchestrator::retrieval::RetrievalEngine;
use query_orchestrator::schema_expert::{AnnotationStore, SchemaExpert};
use query_orchestrator::storage::Storage;
use query_orchestrator::types::TraceLevel;
use query_orchestrator::{Config, Orchestrator, OrchestratorRequest};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Natural-language-to-query orchestrator.
#[derive(Parser)]
#[command(name = "qorc")]
#[command(about = "Turns a natural-language question into a validated query against a registered provider", long_about = None)]
#[command(version)]
struct Cli {
    /// Storage directory (overrides QORC_STORAGE_PATH)
    #[arg(long, env = "QORC_STORAGE_PATH", default_value = "~/.p8/qorc.db")]
    storage_path: PathBuf,

    /// Path to a provider's schema, as JSON or YAML (see `SchemaDefinition`)
    #[arg(long, env = "QORC_SCHEMA_PATH")]
    schema_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and print the generated query plus its confidence
    Ask {
        /// Question in natural language
        question: String,

        /// Conversation to continue (omit to start a new one)
        #[arg(long)]
        conversation: Option<Uuid>,

        /// Execute the generated query against the provider, row-capped
        #[arg(long)]
        execute: bool,

        /// Maximum refinement iterations
        #[arg(long, default_value = "5")]
        max_iterations: u32,
    },

    /// Show the turns recorded for a conversation
    History {
        conversation: Uuid,
    },
}

fn main() -> anyhow::Result<()> {
    query_orchestrator::otel::init_tracing();

    let cli = Cli::parse();
    let storage_path = shellexpand::tilde(&cli.storage_path.to_string_lossy()).to_string();
    let config = Config::load()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(cli, PathBuf::from(storage_path), config))
}

async fn async_main(cli: Cli, storage_path: PathBuf, config: Config) -> anyhow::Result<()> {
    let storage = Storage::open(&storage_path)?;
    let schema = load_schema(cli.schema_path.as_deref())?;
    let provider: Arc<dyn Provider> =
        Arc::new(SqlProvider::new("default", schema, Arc::new(StaticExecutor::new())));

    match cli.command {
        Commands::Ask { question, conversation, execute, max_iterations } => {
            cmd_ask(storage, provider, config, question, conversation, execute, max_iterations).await
        }
        Commands::History { conversation } => cmd_history(storage, conversation),
    }
}

fn load_schema(path: Option<&std::path::Path>) -> anyhow::Result<SchemaDefinition> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let schema = if path.extension().and_then(|s| s.to_str()) == Some("json") {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };
            Ok(schema)
        }
        None => {
            println!("No --schema-path given; running against an empty reference schema.");
            Ok(SchemaDefinition::default())
        }
    }
}

async fn cmd_ask(
    storage: Storage,
    provider: Arc<dyn Provider>,
    config: Config,
    question: String,
    conversation: Option<Uuid>,
    execute: bool,
    max_iterations: u32,
) -> anyhow::Result<()> {
    let conversations = ConversationStore::new(storage.clone());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
    let examples = ExampleStore::new(storage.clone(), embedder);
    let annotations = AnnotationStore::new(storage.clone());
    let schema_expert = SchemaExpert::new(config.orchestrator.schema_expert_top_k);
    let retrieval =
        RetrievalEngine::new(config.orchestrator.retrieval_top_k, config.orchestrator.retrieval_min_similarity);

    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert("default".to_string(), provider);

    let invoker = build_invoker(&config)?;

    let orchestrator =
        Orchestrator::new(conversations, examples, annotations, providers, schema_expert, retrieval, invoker);

    let mut options = RequestOptions { enable_execution: execute, trace_level: TraceLevel::Summary, ..Default::default() };
    options.max_iterations = max_iterations;

    let request = OrchestratorRequest {
        provider_id: "default".to_string(),
        query: question,
        conversation_id: conversation,
        user_id: "cli".to_string(),
        workspace_id: "default".to_string(),
        options,
    };

    let response = orchestrator.handle_one_shot(request).await?;

    println!("conversation: {}", response.conversation_id);
    println!("turn:         {}", response.turn_id);
    println!("query:\n{}", response.generated_query);
    println!("confidence:   {:.2}", response.confidence_score);
    println!("validation:   {:?}", response.validation_status);
    println!("iterations:   {}", response.iterations);
    if let Some(question) = response.clarification_question {
        println!("clarify:      {question}");
    }
    if let Some(execution) = response.execution_result {
        println!("rows:         {:?}", execution.row_count);
    }

    Ok(())
}

fn cmd_history(storage: Storage, conversation: Uuid) -> anyhow::Result<()> {
    let conversations = ConversationStore::new(storage);
    let turns = conversations.turns(conversation)?;
    if turns.is_empty() {
        println!("no turns recorded for conversation {conversation}");
        return Ok(());
    }
    for turn in turns {
        println!("#{} {}", turn.turn_number, turn.user_input);
        println!("  -> {}", turn.generated_query);
        println!("  confidence: {:.2}, status: {:?}", turn.confidence_score, turn.validation_result.status);
    }
    Ok(())
}

/// Builds the LLM Invoker from environment configuration. Falls back to a
/// local heuristic invoker when no API key is present, so `qorc ask` stays
/// usable for offline smoke-testing.
fn build_invoker(config: &Config) -> anyhow::Result<RateLimitedInvoker<CliInvoker>> {
    let invoker = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => CliInvoker::OpenAi(OpenAiInvoker::new(key, "gpt-4o-mini".to_string())),
        Err(_) => {
            println!("OPENAI_API_KEY not set; falling back to a local heuristic invoker.");
            CliInvoker::Heuristic
        }
    };
    Ok(RateLimitedInvoker::new(invoker, &RateLimitConfig::default()))
}

/// The two invoker backends `qorc` can run with. An enum rather than a trait
/// object, since `LlmInvoker` has no blanket `Box<dyn _>` impl.
enum CliInvoker {
    OpenAi(OpenAiInvoker),
    Heuristic,
}

#[async_trait::async_trait]
impl LlmInvoker for CliInvoker {
    async fn invoke(
        &self,
        messages: &[query_orchestrator::types::Message],
        temperature: f32,
        max_tokens: u32,
    ) -> query_orchestrator::Result<query_orchestrator::llm::LlmResponse> {
        match self {
            CliInvoker::OpenAi(invoker) => invoker.invoke(messages, temperature, max_tokens).await,
            CliInvoker::Heuristic => {
                let prompt = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
                let table = prompt
                    .lines()
                    .find(|line| line.trim_start().starts_with("- "))
                    .map(|line| line.trim_start().trim_start_matches("- ").split_whitespace().next().unwrap_or("items"))
                    .unwrap_or("items");
                let content = format!("<query>SELECT * FROM {table} LIMIT 10</query>");
                Ok(query_orchestrator::llm::LlmResponse { content, tokens_in: 0, tokens_out: 0, cost_usd: 0.0 })
            }
        }
    }
}
