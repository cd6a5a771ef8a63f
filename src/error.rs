use thiserror::Error;

use crate::anthropic::AnthropicError;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown criterion `{name}` (configured: {configured})")]
    UnknownCriterion { name: String, configured: String },

    #[error("No qualification records found for execution timestamp {0}")]
    UnknownRun(String),

    #[error("Unknown model `{0}`. Use haiku, sonnet, opus or a full claude-* model id")]
    UnknownModel(String),

    #[error("Missing credentials: set {0} or api_key in the config file")]
    MissingCredentials(String),

    #[error("Invalid criteria expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid execution timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("Directory not found: {0}")]
    MissingDirectory(String),

    #[error("{0} is not a qualified set (no selection.json). Run `gigbench transfer` first.")]
    NotAQualifiedSet(String),

    #[error("Transfer of {job_id} failed: {reason}")]
    Transfer { job_id: String, reason: String },

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BenchError {
    /// Erros de configuração abortam o comando antes de qualquer trabalho.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchError::Config(_)
                | BenchError::UnknownCriterion { .. }
                | BenchError::UnknownRun(_)
                | BenchError::UnknownModel(_)
                | BenchError::MissingCredentials(_)
                | BenchError::InvalidExpression(_)
                | BenchError::InvalidTimestamp(_)
                | BenchError::MissingDirectory(_)
                | BenchError::NotAQualifiedSet(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
