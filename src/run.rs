//! Identidade de uma execução do pipeline.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

// Último valor cunhado, em milissegundos desde a época.
static LAST_MINTED_MS: AtomicI64 = AtomicI64::new(0);

/// Timestamp que identifica uma execução.
///
/// Valores cunhados têm largura fixa (`YYYYMMDD_HHMMSS_mmm`, UTC), então a
/// ordem das strings é a ordem de criação. Duas cunhagens no mesmo processo
/// nunca colidem. Entre processos não há garantia: duas execuções sobre o
/// mesmo diretório de dados precisam começar em milissegundos distintos, e
/// [`crate::store::write_qualification_records`] recusa sobrescrever um
/// registro já gravado.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExecutionTimestamp(String);

impl ExecutionTimestamp {
    pub fn mint() -> Self {
        Self::mint_at(Utc::now())
    }

    fn mint_at(now: DateTime<Utc>) -> Self {
        let wanted = now.timestamp_millis();
        let mut last = LAST_MINTED_MS.load(Ordering::SeqCst);
        let ms = loop {
            let next = wanted.max(last + 1);
            match LAST_MINTED_MS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break next,
                Err(actual) => last = actual,
            }
        };
        let at = Utc.timestamp_millis_opt(ms).single().unwrap_or(now);
        Self(at.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExecutionTimestamp {
    type Err = BenchError;

    /// Aceita qualquer `[A-Za-z0-9_-]+`, para que timestamps de execuções
    /// antigas continuem endereçáveis.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(BenchError::InvalidTimestamp(s.to_string()))
        }
    }
}

impl TryFrom<String> for ExecutionTimestamp {
    type Error = BenchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutionTimestamp> for String {
    fn from(value: ExecutionTimestamp) -> Self {
        value.0
    }
}

/// Contexto explícito de uma invocação de agente.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub execution_timestamp: ExecutionTimestamp,
    pub model: String,
    pub parallelism: usize,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl RunContext {
    pub fn start(model: &str, parallelism: usize) -> Self {
        Self {
            execution_timestamp: ExecutionTimestamp::mint(),
            model: model.to_string(),
            parallelism,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_stamps_are_unique_and_sorted() {
        let stamps: Vec<_> = (0..50).map(|_| ExecutionTimestamp::mint()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn minted_stamp_has_fixed_width_format() {
        let at = Utc.with_ymd_and_hms(2031, 3, 4, 5, 6, 7).unwrap();
        let ts = ExecutionTimestamp::mint_at(at);
        assert_eq!(ts.as_str().len(), "20310304_050607_000".len());
        assert!(ts.as_str().starts_with("20310304_0506"));
    }

    #[test]
    fn parse_accepts_legacy_and_rejects_traversal() {
        assert_eq!(
            "20250301_142233".parse::<ExecutionTimestamp>().unwrap().as_str(),
            "20250301_142233"
        );
        assert!("../etc".parse::<ExecutionTimestamp>().is_err());
        assert!("".parse::<ExecutionTimestamp>().is_err());
    }

    #[test]
    fn serde_roundtrip_validates() {
        let ts: ExecutionTimestamp = serde_json::from_str(r#""20250301_142233_001""#).unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), r#""20250301_142233_001""#);
        assert!(serde_json::from_str::<ExecutionTimestamp>(r#""a/b""#).is_err());
    }
}
