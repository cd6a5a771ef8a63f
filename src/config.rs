//! Configuração do gigbench carregada a partir de `gigbench.toml`.
//!
//! A struct [`BenchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente nomeada em `api_key_env` (por padrão
//! `ANTHROPIC_API_KEY`) tem precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::rubric::{Criterion, Rubric, default_criteria};

/// Arquivo procurado no diretório atual quando `--config` não é informado.
pub const DEFAULT_CONFIG_FILE: &str = "gigbench.toml";

/// Configuração de nível superior carregada de `gigbench.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Chave da API Anthropic.
    pub api_key: String,

    /// Nome da variável de ambiente que sobrescreve `api_key`.
    pub api_key_env: String,

    /// URL base da API, útil para proxies e testes.
    pub api_base_url: Option<String>,

    /// Modelo padrão quando `--llm` não é informado.
    pub default_model: String,

    /// Limite de tokens por resposta.
    pub max_tokens: u32,

    /// Chamadas de inferência simultâneas durante a qualificação.
    pub inference_concurrency: usize,

    /// Workers do pool de submissão.
    pub parallelism: usize,

    /// Tempo máximo, em segundos, de uma tentativa de submissão.
    pub timeout_seconds: u64,

    /// Arquivo JSONL com o histórico de execuções.
    pub ledger_path: PathBuf,

    /// Critérios de qualificação, na ordem em que são avaliados.
    pub criteria: Vec<Criterion>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            api_base_url: None,
            default_model: "sonnet".to_string(),
            max_tokens: 4096,
            inference_concurrency: 4,
            parallelism: 1,
            timeout_seconds: 60,
            ledger_path: PathBuf::from("gigbench_runs.jsonl"),
            criteria: default_criteria(),
        }
    }
}

impl BenchConfig {
    /// Carrega a configuração de `path`, ou de `gigbench.toml` no diretório
    /// atual. Um caminho explícito inexistente é erro; o arquivo padrão
    /// ausente resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if !p.is_file() => {
                return Err(BenchError::Config(format!("config file not found: {}", p.display())));
            }
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<BenchConfig>(&contents)?)
    }

    // Variável de ambiente tem precedência sobre o arquivo de configuração para a chave API.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(&self.api_key_env)
            && !key.trim().is_empty()
        {
            self.api_key = key;
        }
    }

    /// Rubrica validada a partir de `[[criteria]]`.
    pub fn rubric(&self) -> Result<Rubric> {
        Rubric::new(self.criteria.clone())
    }

    /// Chave da API, ou `MissingCredentials` se nenhuma fonte a definiu.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            Err(BenchError::MissingCredentials(self.api_key_env.clone()))
        } else {
            Ok(key)
        }
    }
}
