//! Error taxonomy for the query orchestrator.
//!
//! Every fallible operation in this crate returns one of these variants —
//! never a generic, uncategorized failure. The orchestrator's fatal/recoverable
//! split (see `orchestrator`) is implemented by matching on this enum, so new
//! variants must be added here deliberately rather than folded into
//! `Internal`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Top-level error taxonomy, matching the request-facing error kinds exactly.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Malformed input; reported to the caller with 4xx semantics.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backing database cannot be reached or authentication failed.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// LLM invocation failed after exhausting retries.
    #[error("llm failure: {0}")]
    LlmFailure(String),

    /// Request-level deadline exceeded.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Validator reported errors. Not fatal: the orchestrator loop consumes
    /// this as feedback for the next iteration rather than aborting.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Caller cancelled the request.
    #[error("cancelled")]
    Cancelled,

    /// An invariant the orchestrator relies on was violated.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Whether this error kind terminates an in-flight orchestrator loop.
    ///
    /// Per the propagation policy, only `ProviderUnavailable`, `LlmFailure`,
    /// `Timeout`, and `Cancelled` are fatal inside the iterative loop.
    /// `ValidationFailed` and empty retrieval results are recoverable — they
    /// seed the next iteration instead of aborting the request.
    pub fn is_fatal_in_loop(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::LlmFailure(_) | Self::Timeout(_) | Self::Cancelled
        )
    }

    /// Construct an `LlmFailure` carrying the rate-limit marker the LLM
    /// Invoker needs to surface rate-limit errors distinctly from other
    /// invocation failures (§4.2).
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::LlmFailure(format!("rate_limited: {}", message.into()))
    }

    /// True if this is an `LlmFailure` produced by `rate_limited`.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::LlmFailure(msg) if msg.starts_with("rate_limited: "))
    }

    /// Construct an `LlmFailure` carrying the transient marker for a failure
    /// an invoker knows is safe to retry but isn't specifically a rate limit
    /// (e.g. a 5xx from the backend), per the idempotent-failure retry
    /// policy in §4.2.
    pub fn transient_llm_failure(message: impl Into<String>) -> Self {
        Self::LlmFailure(format!("transient: {}", message.into()))
    }

    /// True if this is an `LlmFailure` produced by `transient_llm_failure`.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LlmFailure(msg) if msg.starts_with("transient: "))
    }

    /// Whether the LLM Invoker's retry loop should retry this failure:
    /// rate limits and other transient backend failures, never a failure
    /// the invoker tagged as a permanent rejection.
    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited() || self.is_transient()
    }

    /// Short machine-readable kind, used as the `Error` event's `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::ProviderUnavailable(_) => "ProviderUnavailable",
            Self::LlmFailure(_) => "LLMFailure",
            Self::Timeout(_) => "Timeout",
            Self::ValidationFailed(_) => "ValidationFailed",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal",
            Self::Storage(_) => "Internal",
            Self::Serialization(_) => "Internal",
            Self::Bincode(_) => "Internal",
            Self::Config(_) => "InvalidRequest",
            Self::Io(_) => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_fatal_classification_matches_propagation_policy() {
        assert!(OrchestratorError::ProviderUnavailable("x".into()).is_fatal_in_loop());
        assert!(OrchestratorError::LlmFailure("x".into()).is_fatal_in_loop());
        assert!(OrchestratorError::Timeout(std::time::Duration::from_secs(1)).is_fatal_in_loop());
        assert!(OrchestratorError::Cancelled.is_fatal_in_loop());
        assert!(!OrchestratorError::ValidationFailed("x".into()).is_fatal_in_loop());
        assert!(!OrchestratorError::Internal("x".into()).is_fatal_in_loop());
    }

    #[test]
    fn retryable_covers_rate_limited_and_transient_but_not_plain_failures() {
        assert!(OrchestratorError::rate_limited("too many requests").is_retryable());
        assert!(OrchestratorError::transient_llm_failure("server error").is_retryable());
        assert!(!OrchestratorError::LlmFailure("bad request".to_string()).is_retryable());
    }

    #[test]
    fn kind_strings_match_the_taxonomy() {
        assert_eq!(OrchestratorError::Cancelled.kind(), "Cancelled");
        assert_eq!(
            OrchestratorError::LlmFailure("x".into()).kind(),
            "LLMFailure"
        );
    }
}
