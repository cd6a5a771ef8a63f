//! Layout em disco do pipeline.
//!
//! ```text
//! <data_dir>/projects/**/<job>/project.json
//! <data_dir>/projects/**/<job>/llm_eval_<ts>.json              qualification record
//! <data_dir>/summary/qualification_stats_<ts>.json             run stats + records
//! <dest_dir>/selection.json                                    selection manifest
//! <submission_dir>/<ts>/<category>/<job_id>/...                deliverables
//! <submission_dir>/<ts>/<category>/<job_id>/agent_stream.txt   raw worker reply
//! <submission_dir>/summary/submission_stats_<ts>.json          run stats + submissions
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{BenchError, Result};
use crate::qualification::QualificationRecord;
use crate::run::ExecutionTimestamp;
use crate::stats::{RunKind, RunStats};

pub const EVAL_FILE_PREFIX: &str = "llm_eval";
pub const AGENT_STREAM_PREFIX: &str = "agent_stream";
pub const AGENT_STREAM_FILE: &str = "agent_stream.txt";
pub const OUTPUTS_DIR: &str = "outputs";
pub const SUMMARY_DIR: &str = "summary";
pub const SELECTION_FILE: &str = "selection.json";

pub fn eval_file_name(ts: &ExecutionTimestamp) -> String {
    format!("{EVAL_FILE_PREFIX}_{ts}.json")
}

pub fn stats_file_name(kind: RunKind, ts: &ExecutionTimestamp) -> String {
    format!("{kind}_stats_{ts}.json")
}

/// Grava JSON via arquivo temporário irmão; leitores nunca veem um arquivo parcial.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Grava cada registro ao lado do seu job como `llm_eval_<ts>.json`.
///
/// Um registro já existente para o mesmo timestamp nunca é sobrescrito:
/// isso só acontece quando duas execuções cunharam o mesmo timestamp.
pub fn write_qualification_records(data_dir: &Path, records: &[QualificationRecord]) -> Result<()> {
    for record in records {
        let path = data_dir
            .join(&record.job_path)
            .join(eval_file_name(&record.execution_timestamp));
        if path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )
            .into());
        }
        write_json(&path, record)?;
        debug!(job_id = %record.job_id, path = %path.display(), "wrote qualification record");
    }
    Ok(())
}

/// Registros de uma execução e os arquivos que não puderam ser lidos.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<QualificationRecord>,
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Encontra todos os registros gravados para `ts` sob `data_dir`, ordenados
/// pelo caminho do job.
///
/// `job_path` é recalculado a partir de onde o arquivo foi encontrado, então
/// um diretório de dados movido depois da qualificação continua válido.
pub fn load_qualification_records(data_dir: &Path, ts: &ExecutionTimestamp) -> Result<LoadedRecords> {
    if !data_dir.is_dir() {
        return Err(BenchError::MissingDirectory(data_dir.display().to_string()));
    }
    let wanted = eval_file_name(ts);
    let mut loaded = LoadedRecords::default();

    let walker = WalkDir::new(data_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == OUTPUTS_DIR));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| data_dir.to_path_buf());
                warn!(path = %path.display(), "unreadable entry while looking for records: {e}");
                loaded.unreadable.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy() != wanted {
            continue;
        }
        let path = entry.path();
        let job_dir = path.parent().unwrap_or(data_dir);
        match read_json::<QualificationRecord>(path) {
            Ok(mut record) => {
                record.job_path = job_dir.strip_prefix(data_dir).unwrap_or(job_dir).to_path_buf();
                loaded.records.push(record);
            }
            Err(e) => {
                warn!(path = %path.display(), "unreadable qualification record: {e}");
                loaded.unreadable.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    if loaded.records.is_empty() && loaded.unreadable.is_empty() {
        return Err(BenchError::UnknownRun(ts.to_string()));
    }
    loaded.records.sort_by(|a, b| a.job_path.cmp(&b.job_path));
    Ok(loaded)
}

#[derive(Serialize)]
struct RunSummary<'a, T: Serialize> {
    #[serde(flatten)]
    stats: &'a RunStats,
    results: &'a [T],
}

/// Grava `<base>/summary/<kind>_stats_<ts>.json` e retorna o caminho.
pub fn save_run_summary<T: Serialize>(base: &Path, stats: &RunStats, results: &[T]) -> Result<PathBuf> {
    let path = base
        .join(SUMMARY_DIR)
        .join(stats_file_name(stats.kind, &stats.execution_timestamp));
    write_json(&path, &RunSummary { stats, results })?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedJob {
    pub job_id: String,
    pub rel_path: PathBuf,
}

/// Gravado por `transfer` no conjunto de destino. É a presença dele que
/// torna um diretório um conjunto qualificado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionManifest {
    pub source_run: ExecutionTimestamp,
    pub expression: String,
    pub selected: Vec<SelectedJob>,
}

impl SelectionManifest {
    pub fn save(&self, dest_dir: &Path) -> Result<PathBuf> {
        let path = dest_dir.join(SELECTION_FILE);
        write_json(&path, self)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SELECTION_FILE);
        if !path.is_file() {
            return Err(BenchError::NotAQualifiedSet(dir.display().to_string()));
        }
        read_json(&path)
    }
}
