//! Rubrica de qualificação: a lista ordenada de critérios avaliados.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Uma pergunta da rubrica, avaliada de forma independente para cada job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub question: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
        }
    }
}

/// Palavras-chave da gramática de expressões.
const RESERVED_NAMES: [&str; 3] = ["and", "or", "not"];

/// Conjunto ordenado de critérios com nomes únicos.
///
/// Os nomes precisam ser referenciáveis em uma expressão de critérios, então
/// palavras-chave (`and`, `or`, `not`) não são aceitas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Result<Self> {
        if criteria.is_empty() {
            return Err(BenchError::Config("rubric must contain at least one criterion".into()));
        }
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(criteria.len());
        for c in criteria {
            let name = c.name.trim();
            if name.is_empty() {
                return Err(BenchError::Config("criterion name must not be empty".into()));
            }
            if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
                return Err(BenchError::Config(format!(
                    "criterion name `{name}` may only contain letters, digits and underscores"
                )));
            }
            if RESERVED_NAMES.iter().any(|k| name.eq_ignore_ascii_case(k)) {
                return Err(BenchError::Config(format!(
                    "criterion name `{name}` is a criteria expression keyword"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(BenchError::Config(format!("duplicate criterion `{name}`")));
            }
            validated.push(Criterion::new(name, c.question));
        }
        Ok(Self { criteria: validated })
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// Falha com `UnknownCriterion` se `name` não estiver configurado.
    pub fn require(&self, name: &str) -> Result<&Criterion> {
        self.get(name).ok_or_else(|| BenchError::UnknownCriterion {
            name: name.to_string(),
            configured: self.names().collect::<Vec<_>>().join(", "),
        })
    }
}

/// As duas perguntas usadas até agora para qualificar jobs.
pub fn default_criteria() -> Vec<Criterion> {
    vec![
        Criterion::new(
            "criterion_1",
            "The attachments contain the information described in the project description \
             needed to complete the job and there are no other proprietary systems or logins \
             needed beyond the attachments themselves. Do not accept jobs that say things like \
             'attached is a sample', because that means another source of information is not \
             included in the attachments. If no attachments are given, the job must be \
             completable from the project description alone.",
        ),
        Criterion::new(
            "criterion_2",
            "The milestone descriptions are well-defined and someone without context of the \
             client or freelancer would be able to understand what was agreed to.",
        ),
    ]
}
