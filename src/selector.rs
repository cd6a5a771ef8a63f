//! Seleciona os jobs de uma qualificação que satisfazem uma expressão de
//! critérios e os copia para um novo conjunto de trabalho.

use std::fs;
use std::path::Path;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::criteria::CriteriaExpr;
use crate::error::{BenchError, Result};
use crate::qualification::QualificationRecord;
use crate::rubric::Rubric;
use crate::run::ExecutionTimestamp;
use crate::store::{
    AGENT_STREAM_PREFIX, EVAL_FILE_PREFIX, OUTPUTS_DIR, SelectedJob, SelectionManifest,
    load_qualification_records,
};

#[derive(Debug, Clone)]
pub struct Selection {
    pub source_run: ExecutionTimestamp,
    pub expression: CriteriaExpr,
    /// Registros que satisfazem a expressão, ordenados pelo caminho do job.
    pub selected: Vec<QualificationRecord>,
    /// Registros lidos para a execução.
    pub considered: usize,
    /// Arquivos de registro que não puderam ser lidos.
    pub unreadable: usize,
}

impl Selection {
    pub fn job_ids(&self) -> Vec<&str> {
        self.selected.iter().map(|r| r.job_id.as_str()).collect()
    }
}

/// Seleciona os jobs da execução `ts` cujos julgamentos satisfazem `expression`.
///
/// Os nomes da expressão são conferidos contra `rubric` antes de ler
/// qualquer registro.
pub fn select(
    data_dir: &Path,
    ts: &ExecutionTimestamp,
    expression: &CriteriaExpr,
    rubric: &Rubric,
) -> Result<Selection> {
    expression.validate(rubric)?;
    let loaded = load_qualification_records(data_dir, ts)?;
    let considered = loaded.records.len();

    let selected: Vec<QualificationRecord> = loaded
        .records
        .into_iter()
        .filter(|record| {
            let keep = expression.evaluate(&record.outcomes());
            debug!(job_id = %record.job_id, keep, "applied criteria");
            keep
        })
        .collect();

    info!(
        execution_timestamp = %ts,
        expression = %expression,
        "Selected {} of {} jobs",
        selected.len(),
        considered
    );
    Ok(Selection {
        source_run: ts.clone(),
        expression: expression.clone(),
        selected,
        considered,
        unreadable: loaded.unreadable.len(),
    })
}

/// O que fazer quando a cópia de um job selecionado falha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPolicy {
    /// Registra a falha, deixa o job fora do manifesto e continua.
    #[default]
    SkipFailed,
    /// Para na primeira falha.
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    pub copied: usize,
    pub skipped: usize,
    pub overwritten: usize,
}

impl FileCounts {
    fn add(&mut self, other: FileCounts) {
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.overwritten += other.overwritten;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub transferred: Vec<SelectedJob>,
    /// `(job_id, reason)`
    pub failed: Vec<(String, String)>,
    pub files: FileCounts,
}

/// Copia cada job selecionado de `data_dir` para `dest_dir` e grava o
/// manifesto da seleção.
///
/// Repetir com as mesmas entradas é seguro. Arquivos idênticos são pulados,
/// arquivos diferentes são sobrescritos, e ambos são contados.
pub fn transfer(
    data_dir: &Path,
    selection: &Selection,
    dest_dir: &Path,
    policy: TransferPolicy,
) -> Result<TransferReport> {
    fs::create_dir_all(dest_dir)?;
    let mut report = TransferReport::default();

    for record in &selection.selected {
        let src = data_dir.join(&record.job_path);
        let dst = dest_dir.join(&record.job_path);
        match copy_job(&src, &dst) {
            Ok(counts) => {
                info!(
                    job_id = %record.job_id,
                    copied = counts.copied,
                    skipped = counts.skipped,
                    overwritten = counts.overwritten,
                    "Project qualified, transferred {}",
                    record.job_path.display()
                );
                report.files.add(counts);
                report.transferred.push(SelectedJob {
                    job_id: record.job_id.clone(),
                    rel_path: record.job_path.clone(),
                });
            }
            Err(e) => {
                error!(job_id = %record.job_id, "transfer failed: {e}");
                match policy {
                    TransferPolicy::Abort => {
                        return Err(BenchError::Transfer {
                            job_id: record.job_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                    TransferPolicy::SkipFailed => {
                        report.failed.push((record.job_id.clone(), e.to_string()));
                    }
                }
            }
        }
    }

    let manifest = SelectionManifest {
        source_run: selection.source_run.clone(),
        expression: selection.expression.to_string(),
        selected: report.transferred.clone(),
    };
    let path = manifest.save(dest_dir)?;
    info!(
        "Finished transferring {} qualified projects to {} ({} failed, manifest {})",
        report.transferred.len(),
        dest_dir.display(),
        report.failed.len(),
        path.display()
    );
    Ok(report)
}

/// Copia o diretório de um job, sem `outputs/`, registros de qualificação
/// e transcrições do agente.
fn copy_job(src: &Path, dst: &Path) -> Result<FileCounts> {
    if !src.is_dir() {
        return Err(BenchError::MissingDirectory(src.display().to_string()));
    }
    let mut counts = FileCounts::default();
    let walker = WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == OUTPUTS_DIR));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(EVAL_FILE_PREFIX) || name.starts_with(AGENT_STREAM_PREFIX) {
            continue;
        }

        if target.is_file() {
            if same_contents(entry.path(), &target)? {
                debug!(file = %target.display(), "identical, skipped");
                counts.skipped += 1;
                continue;
            }
            warn!(file = %target.display(), "differs from source, overwriting");
            fs::copy(entry.path(), &target)?;
            counts.overwritten += 1;
        } else {
            fs::copy(entry.path(), &target)?;
            counts.copied += 1;
        }
    }
    Ok(counts)
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}
