//! Interface de linha de comando do gigbench baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (qualify, transfer,
//! submit, runs) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gigbench: qualifica, seleciona e submete jobs freelance a agentes.
#[derive(Debug, Parser)]
#[command(name = "gigbench", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./gigbench.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Avalia cada job do dataset contra os critérios configurados.
    Qualify {
        /// Diretório do dataset extraído (contém `projects/`).
        #[arg(long)]
        data_dir: PathBuf,

        /// Processa apenas os N primeiros jobs, em ordem de caminho.
        #[arg(long)]
        limit: Option<usize>,

        /// Modelo a usar (haiku, sonnet, opus ou um id claude-*).
        #[arg(long)]
        llm: Option<String>,

        /// Chamadas de inferência simultâneas.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Copia os jobs que satisfazem uma expressão de critérios.
    Transfer {
        /// Diretório do dataset qualificado.
        #[arg(long)]
        data_dir: PathBuf,

        /// Timestamp da execução de qualificação a usar.
        #[arg(long)]
        qualification_execution_timestamp: String,

        /// Expressão de critérios, ex. `criterion_1 AND NOT criterion_3`.
        /// Padrão: todos os critérios configurados.
        #[arg(long)]
        criteria: Option<String>,

        /// Diretório de destino do conjunto qualificado.
        #[arg(long)]
        dest_dir: PathBuf,

        /// Interrompe na primeira falha de cópia.
        #[arg(long, default_value_t = false)]
        abort_on_error: bool,
    },

    /// Submete os jobs de um conjunto qualificado ao agente worker.
    Submit {
        /// Conjunto qualificado gerado por `transfer`.
        #[arg(long)]
        data_dir: PathBuf,

        /// Diretório onde as entregas são gravadas.
        #[arg(long)]
        submission_dir: PathBuf,

        /// Submete apenas os N primeiros jobs.
        #[arg(long)]
        limit: Option<usize>,

        /// Número de workers do pool.
        #[arg(long)]
        parallelism: Option<usize>,

        /// Modelo a usar (haiku, sonnet, opus ou um id claude-*).
        #[arg(long)]
        llm: Option<String>,

        /// Tempo máximo por tentativa, em segundos.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Lista as execuções registradas no ledger.
    Runs {
        /// Mostra o resumo completo de uma execução.
        #[arg(long)]
        timestamp: Option<String>,
    },
}
