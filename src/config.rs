//! Runtime configuration.
//!
//! Loaded from environment variables with a file fallback under a
//! `~/.p8`-style config directory, following the corpus's own
//! `Config::load`/`Config::save` convention.

use crate::types::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Orchestrator-wide defaults, overridable per request via `RequestOptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorDefaults {
    pub max_iterations: u32,
    pub confidence_threshold: f64,
    pub clarification_threshold: f64,
    pub enable_execution: bool,
    pub timeout_seconds: u64,
    /// Top-K tables the Schema Expert keeps before the FK closure (§4.3).
    pub schema_expert_top_k: usize,
    /// `top_k` the Retrieval Engine truncates to (§4.4).
    pub retrieval_top_k: usize,
    /// `min_similarity` below which a retrieval result is dropped (§4.4).
    pub retrieval_min_similarity: f64,
}

impl Default for OrchestratorDefaults {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            confidence_threshold: 0.85,
            clarification_threshold: 0.6,
            enable_execution: false,
            timeout_seconds: 30,
            schema_expert_top_k: 8,
            retrieval_top_k: 10,
            retrieval_min_similarity: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max concurrent in-flight LLM invocations per process.
    pub max_concurrent_invocations: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_invocations: 8,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage_path: PathBuf,
    pub orchestrator: OrchestratorDefaults,
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./data/orchestrator.db"),
            orchestrator: OrchestratorDefaults::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// `~/.p8/` — the corpus's config directory convention.
    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| OrchestratorError::Config("HOME not set".to_string()))?;
        let dir = PathBuf::from(home).join(".p8");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("orchestrator.yaml"))
    }

    /// Load configuration: environment variables take precedence over the
    /// file, which takes precedence over built-in defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file() {
            Ok(path) if path.exists() => {
                let content = fs::read_to_string(&path)?;
                serde_yaml::from_str(&content)
                    .map_err(|e| OrchestratorError::Config(format!("invalid config file: {e}")))?
            }
            _ => Self::default(),
        };

        if let Ok(path) = std::env::var("QORC_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }
        if let Ok(v) = std::env::var("QORC_MAX_ITERATIONS") {
            config.orchestrator.max_iterations = v
                .parse()
                .map_err(|_| OrchestratorError::Config("QORC_MAX_ITERATIONS must be an integer".into()))?;
        }
        if let Ok(v) = std::env::var("QORC_CONFIDENCE_THRESHOLD") {
            config.orchestrator.confidence_threshold = v
                .parse()
                .map_err(|_| OrchestratorError::Config("QORC_CONFIDENCE_THRESHOLD must be a float".into()))?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_file()?;
        let content = serde_yaml::to_string(self)
            .map_err(|e| OrchestratorError::Config(format!("serialize error: {e}")))?;
        fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_termination_constants() {
        let defaults = OrchestratorDefaults::default();
        assert_eq!(defaults.max_iterations, 5);
        assert!((defaults.confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert!((defaults.clarification_threshold - 0.6).abs() < f64::EPSILON);
    }
}
