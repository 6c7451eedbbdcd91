//! LLM Invoker (C2) — a thin, retrying, rate-limited abstraction over a
//! chat-completion backend.

use crate::config::RateLimitConfig;
use crate::types::{Message, OrchestratorError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Per-million-token cost, following the corpus's model cost-table convention.
#[derive(Debug, Clone, Copy)]
pub struct ModelCost {
    pub input_per_million_usd: f64,
    pub output_per_million_usd: f64,
}

impl ModelCost {
    pub fn cost_usd(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        let input = (tokens_in as f64 / 1_000_000.0) * self.input_per_million_usd;
        let output = (tokens_out as f64 / 1_000_000.0) * self.output_per_million_usd;
        input + output
    }
}

/// Looks up a cost table entry for a model name, falling back to a
/// conservative default for unrecognized models.
pub fn model_cost(model: &str) -> ModelCost {
    match model {
        "gpt-4o" => ModelCost { input_per_million_usd: 2.50, output_per_million_usd: 10.00 },
        "gpt-4o-mini" => ModelCost { input_per_million_usd: 0.15, output_per_million_usd: 0.60 },
        _ => ModelCost { input_per_million_usd: 5.00, output_per_million_usd: 15.00 },
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
}

/// One chat-completion backend. Concrete HTTP clients for a specific LLM API
/// are an out-of-scope collaborator beyond what tests need; callers depend
/// only on this trait, typically wrapped in `RateLimitedInvoker`.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Result<LlmResponse>;
}

/// Wraps any `LlmInvoker` with exponential-backoff retry and a process-wide
/// concurrency cap, per §4.2.
pub struct RateLimitedInvoker<I: LlmInvoker> {
    inner: I,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<I: LlmInvoker> RateLimitedInvoker<I> {
    pub fn new(inner: I, config: &RateLimitConfig) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_invocations)),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Invoke with retry, honoring an overall deadline. Queuing for a permit
    /// and all retries are bounded by `deadline` — callers never wait past it.
    pub async fn invoke_with_deadline(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        deadline: Instant,
    ) -> Result<LlmResponse> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(OrchestratorError::Timeout(Duration::from_secs(0)));
        }

        let permit = tokio::time::timeout(remaining, self.semaphore.acquire())
            .await
            .map_err(|_| OrchestratorError::Timeout(remaining))?
            .map_err(|_| OrchestratorError::Internal("rate limiter semaphore closed".to_string()))?;

        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            if Instant::now() >= deadline {
                return Err(OrchestratorError::Timeout(Duration::from_secs(0)));
            }
            match self.inner.invoke(messages, temperature, max_tokens).await {
                Ok(response) => {
                    drop(permit);
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    attempt += 1;
                    sleep(backoff.min(max_sleep(deadline))).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(e) => {
                    drop(permit);
                    return Err(e);
                }
            }
        }
    }
}

fn max_sleep(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
