//! Estatísticas de execução compartilhadas pelos agentes de qualificação e
//! de submissão.
//!
//! As taxas são guardadas como frações exatas. Tudo que é exibido passa por
//! [`percent`], que arredonda para duas casas (half-up) sobre pontos-base
//! inteiros.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::judgment::Outcome;
use crate::run::{ExecutionTimestamp, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Qualification,
    Submission,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Qualification => write!(f, "qualification"),
            RunKind::Submission => write!(f, "submission"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionStats {
    pub criterion: String,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    /// passed / jobs
    pub pass_rate: f64,
    /// passed / (passed + failed)
    pub evaluated_pass_rate: f64,
}

impl CriterionStats {
    pub fn tally<'a>(criterion: &str, outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let (mut passed, mut failed, mut errored) = (0, 0, 0);
        for outcome in outcomes {
            match outcome {
                Outcome::Pass => passed += 1,
                Outcome::Fail => failed += 1,
                Outcome::Error => errored += 1,
            }
        }
        Self {
            criterion: criterion.to_string(),
            passed,
            failed,
            errored,
            pass_rate: ratio(passed, passed + failed + errored),
            evaluated_pass_rate: ratio(passed, passed + failed),
        }
    }

    pub fn jobs(&self) -> usize {
        self.passed + self.failed + self.errored
    }
}

/// Agregado de uma invocação de agente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub kind: RunKind,
    pub execution_timestamp: ExecutionTimestamp,
    pub model: String,
    pub parallelism: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// Jobs com aprovação geral. Só em execuções de qualificação.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified: Option<usize>,
    /// Jobs do dataset que não puderam ser lidos e ficaram fora de `attempted`.
    #[serde(default)]
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriterionStats>,
    /// Tempo de parede da execução inteira.
    pub total_processing_secs: f64,
    /// Tempo médio de processamento por job.
    pub average_processing_secs: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunStats {
    /// Monta as estatísticas a partir de pares `(succeeded, processing_secs)`.
    pub fn from_units(
        kind: RunKind,
        ctx: &RunContext,
        units: impl IntoIterator<Item = (bool, f64)>,
    ) -> Self {
        let mut attempted = 0;
        let mut succeeded = 0;
        let mut busy_secs = 0.0;
        for (ok, secs) in units {
            attempted += 1;
            if ok {
                succeeded += 1;
            }
            busy_secs += secs;
        }
        Self {
            kind,
            execution_timestamp: ctx.execution_timestamp.clone(),
            model: ctx.model.clone(),
            parallelism: ctx.parallelism,
            attempted,
            succeeded,
            failed: attempted - succeeded,
            success_rate: ratio(succeeded, attempted),
            qualified: None,
            skipped: 0,
            criteria: Vec::new(),
            total_processing_secs: ctx.elapsed_secs(),
            average_processing_secs: if attempted == 0 {
                0.0
            } else {
                busy_secs / attempted as f64
            },
            started_at: ctx.started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn success_percent(&self) -> String {
        percent(self.succeeded, self.attempted)
    }
}

/// `n / d`, ou 0 para denominador vazio.
pub fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 { 0.0 } else { n as f64 / d as f64 }
}

/// `n / d` em pontos-base, arredondado half-up.
pub fn basis_points(n: usize, d: usize) -> u64 {
    if d == 0 {
        return 0;
    }
    let (n, d) = (n as u64, d as u64);
    (2 * n * 10_000 + d) / (2 * d)
}

/// `n / d` formatado como porcentagem com duas casas, ex. `63.64%`.
pub fn percent(n: usize, d: usize) -> String {
    let bp = basis_points(n, d);
    format!("{}.{:02}%", bp / 100, bp % 100)
}
