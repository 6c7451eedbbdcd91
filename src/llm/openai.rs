//! OpenAI chat-completion client — the reference network-backed `LlmInvoker`.

use crate::llm::invoker::{model_cost, LlmInvoker, LlmResponse};
use crate::types::{Message, OrchestratorError, Result, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(m: &Message) -> Self {
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self { role: role.to_string(), content: m.content.clone() }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct OpenAiInvoker {
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiInvoker {
    pub fn new(api_key: String, model: String) -> Self {
        Self { api_key, model, client: Client::new() }
    }
}

#[async_trait]
impl LlmInvoker for OpenAiInvoker {
    async fn invoke(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Result<LlmResponse> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| OrchestratorError::ProviderUnavailable(format!("OpenAI request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OrchestratorError::rate_limited("OpenAI rate limit exceeded"));
        }
        if response.status().is_server_error() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(OrchestratorError::transient_llm_failure(format!("OpenAI API error ({status}): {body}")));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(OrchestratorError::LlmFailure(format!("OpenAI API error ({status}): {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::LlmFailure(format!("malformed OpenAI response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::LlmFailure("OpenAI returned no choices".to_string()))?;

        let cost = model_cost(&self.model).cost_usd(parsed.usage.prompt_tokens, parsed.usage.completion_tokens);

        Ok(LlmResponse {
            content: choice.message.content,
            tokens_in: parsed.usage.prompt_tokens,
            tokens_out: parsed.usage.completion_tokens,
            cost_usd: cost,
        })
    }
}
