//! Julgamentos do avaliador e o parser estrito da resposta do modelo.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Veredito para um par (job, critério).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    /// A avaliação em si não completou. Nunca conta como aprovação.
    Error,
}

impl Outcome {
    pub fn is_pass(self) -> bool {
        self == Outcome::Pass
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail => write!(f, "fail"),
            Outcome::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub criterion: String,
    pub outcome: Outcome,
    pub rationale: String,
    pub latency_ms: u64,
}

impl Judgment {
    pub fn error(criterion: &str, detail: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            criterion: criterion.to_string(),
            outcome: Outcome::Error,
            rationale: detail.into(),
            latency_ms,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JudgmentParseError {
    #[error("response is not a JSON object: {0}")]
    NotJson(String),

    #[error("unexpected judgment value `{0}` (expected YES or NO)")]
    InvalidVerdict(String),
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    judgment: String,
    #[serde(default)]
    reasoning: String,
}

/// Interpreta estritamente uma resposta do avaliador no formato
/// `{"judgment": "YES" | "NO", "reasoning": "..."}`.
///
/// Um único bloco ```json é desembrulhado. Qualquer outro texto ao redor é
/// rejeitado.
pub fn parse_judgment(text: &str) -> Result<(Outcome, String), JudgmentParseError> {
    let body = strip_code_fence(text.trim());
    let raw: RawJudgment =
        serde_json::from_str(body).map_err(|e| JudgmentParseError::NotJson(e.to_string()))?;
    let outcome = match raw.judgment.trim().to_ascii_uppercase().as_str() {
        "YES" => Outcome::Pass,
        "NO" => Outcome::Fail,
        _ => return Err(JudgmentParseError::InvalidVerdict(raw.judgment)),
    };
    Ok((outcome, raw.reasoning))
}

/// Desembrulha uma resposta que é exatamente um bloco de código cercado.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Descarta a info string (ex. `json`) da linha de abertura.
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}
