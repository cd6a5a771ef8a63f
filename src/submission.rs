//! Pool de submissão: entrega os jobs de um conjunto qualificado a um
//! [`WorkerAgent`] e agrega os resultados.
//!
//! Um número fixo de workers consome uma fila compartilhada. Cada tentativa
//! roda na própria task, então um panic afeta apenas o job em questão. Os
//! resultados chegam por um único canal `mpsc` ao agregador, que é o único
//! a escrever as contagens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dataset::Job;
use crate::error::{BenchError, Result};
use crate::run::{ExecutionTimestamp, RunContext};
use crate::stats::{RunKind, RunStats};
use crate::store::SelectionManifest;
use crate::worker::WorkerAgent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Success,
    Failure,
}

/// Resultado de uma tentativa. Não é alterado depois que o worker retorna.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: Uuid,
    pub job_id: String,
    pub outcome: SubmissionOutcome,
    /// Workspace relativo ao diretório de submissão.
    pub workspace: PathBuf,
    /// Arquivos relativos a `workspace`.
    pub deliverables: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub processing_ms: u64,
}

impl Submission {
    pub fn succeeded(&self) -> bool {
        self.outcome == SubmissionOutcome::Success
    }
}

/// Job listado em `selection.json` que não pôde ser lido do disco.
#[derive(Debug, Clone)]
pub struct UnloadableJob {
    pub job_id: String,
    pub rel_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
enum SetEntry {
    Ready(Job),
    Unloadable(UnloadableJob),
}

/// Jobs aprovados por uma seleção. Só pode ser obtido de um diretório
/// gravado por `transfer`, então nada fora de uma seleção é submetido.
///
/// Entradas do manifesto que falham ao carregar continuam no conjunto e
/// viram falhas na submissão, para que a taxa de sucesso conte todos os
/// jobs qualificados.
#[derive(Debug, Clone)]
pub struct QualifiedSet {
    manifest: SelectionManifest,
    entries: Vec<SetEntry>,
}

impl QualifiedSet {
    /// Carrega os jobs listados em `dir/selection.json`, na ordem do manifesto.
    pub fn load(dir: &Path, limit: Option<usize>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(BenchError::MissingDirectory(dir.display().to_string()));
        }
        let manifest = SelectionManifest::load(dir)?;
        let wanted = limit.unwrap_or(manifest.selected.len());

        let mut entries = Vec::with_capacity(wanted.min(manifest.selected.len()));
        for selected in manifest.selected.iter().take(wanted) {
            match Job::load(dir, &dir.join(&selected.rel_path)) {
                Ok(job) => entries.push(SetEntry::Ready(job)),
                Err(e) => {
                    warn!(
                        job_id = %selected.job_id,
                        "selected job missing from {}: {e}",
                        dir.display()
                    );
                    entries.push(SetEntry::Unloadable(UnloadableJob {
                        job_id: selected.job_id.clone(),
                        rel_path: selected.rel_path.clone(),
                        reason: e.to_string(),
                    }));
                }
            }
        }
        let set = Self { manifest, entries };
        info!(
            source_run = %set.manifest.source_run,
            expression = %set.manifest.expression,
            unloadable = set.unloadable_count(),
            "Loaded {} qualified jobs",
            set.len()
        );
        Ok(set)
    }

    pub fn manifest(&self) -> &SelectionManifest {
        &self.manifest
    }

    /// Entradas do manifesto cobertas por este conjunto, carregadas ou não.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unloadable_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, SetEntry::Unloadable(_)))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionRun {
    pub submissions: Vec<Submission>,
    pub stats: RunStats,
}

impl SubmissionRun {
    pub fn execution_timestamp(&self) -> &ExecutionTimestamp {
        &self.stats.execution_timestamp
    }
}

/// Pool fixo de workers consumindo uma fila compartilhada de jobs qualificados.
pub struct SubmissionAgent<W> {
    worker: Arc<W>,
    progress: Option<ProgressBar>,
}

impl<W: WorkerAgent> SubmissionAgent<W> {
    pub fn new(worker: Arc<W>) -> Self {
        Self {
            worker,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Submete cada job de `set` com no máximo `parallelism` tentativas
    /// simultâneas. `parallelism` zero é erro de configuração.
    pub async fn submit(
        &self,
        set: &QualifiedSet,
        model: &str,
        parallelism: usize,
        submission_dir: &Path,
    ) -> Result<SubmissionRun> {
        if parallelism == 0 {
            return Err(BenchError::Config("parallelism must be at least 1".into()));
        }
        let ctx = RunContext::start(model, parallelism);
        let run_name = PathBuf::from(ctx.execution_timestamp.as_str());
        let run_dir = submission_dir.join(&run_name);

        let mut slots: Vec<Option<Submission>> = vec![None; set.entries.len()];
        let mut ready = Vec::with_capacity(set.entries.len());
        for (idx, entry) in set.entries.iter().enumerate() {
            match entry {
                SetEntry::Ready(job) => ready.push((idx, Arc::new(job.clone()))),
                SetEntry::Unloadable(missing) => {
                    self.record(&mut slots, idx, unloadable(missing, &run_name));
                }
            }
        }

        let workers = parallelism.min(ready.len());
        info!(
            execution_timestamp = %ctx.execution_timestamp,
            "Submitting {} jobs with {} workers",
            ready.len(),
            workers
        );

        let (queue_tx, queue_rx) = mpsc::channel::<(usize, Arc<Job>)>(ready.len().max(1));
        for item in ready.iter().cloned() {
            if queue_tx.send(item).await.is_err() {
                break;
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<(usize, Submission)>(workers.max(1) * 2);
        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let results = result_tx.clone();
            let worker = Arc::clone(&self.worker);
            let run_dir = run_dir.clone();
            pool.spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some((idx, job)) = next else { break };
                    debug!(worker_id, job_id = %job.id, "picked up job");
                    let submission = attempt(Arc::clone(&worker), job, &run_dir).await;
                    if results.send((idx, submission)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        // Único dono dos resultados por job.
        while let Some((idx, submission)) = result_rx.recv().await {
            self.record(&mut slots, idx, submission);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("submission worker stopped: {e}");
            }
        }

        for (idx, job) in &ready {
            if slots[*idx].is_none() {
                slots[*idx] = Some(lost(job, &run_name));
            }
        }
        let submissions: Vec<Submission> = slots.into_iter().flatten().collect();
        let stats = RunStats::from_units(
            RunKind::Submission,
            &ctx,
            submissions
                .iter()
                .map(|s| (s.succeeded(), s.processing_ms as f64 / 1000.0)),
        );
        Ok(SubmissionRun { submissions, stats })
    }

    fn record(&self, slots: &mut [Option<Submission>], idx: usize, submission: Submission) {
        if submission.succeeded() {
            info!(job_id = %submission.job_id, "Submission succeeded");
        } else {
            warn!(
                job_id = %submission.job_id,
                reason = submission.failure_reason.as_deref().unwrap_or(""),
                "Submission failed"
            );
        }
        slots[idx] = Some(submission);
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}

/// Roda um job na própria task, para que um worker em panic falhe só esse job.
async fn attempt<W: WorkerAgent>(worker: Arc<W>, job: Arc<Job>, run_dir: &Path) -> Submission {
    let workspace_rel = workspace_for(job.category(), &job.id);
    let workspace = run_dir.join(&workspace_rel);
    let job_id = job.id.clone();
    let started = Instant::now();

    let handle = tokio::spawn(async move { worker.attempt_job(&job, &workspace).await });
    let result = match handle.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) if e.is_panic() => Err("worker panicked".to_string()),
        Err(e) => Err(format!("worker task failed: {e}")),
    };
    let processing_ms = started.elapsed().as_millis() as u64;

    let run_name = run_dir.file_name().map(PathBuf::from).unwrap_or_default();
    let (outcome, deliverables, failure_reason) = match result {
        Ok(deliverable) => (SubmissionOutcome::Success, deliverable.files, None),
        Err(reason) => (SubmissionOutcome::Failure, Vec::new(), Some(reason)),
    };
    Submission {
        submission_id: Uuid::new_v4(),
        job_id,
        outcome,
        workspace: run_name.join(workspace_rel),
        deliverables,
        failure_reason,
        processing_ms,
    }
}

fn failure(job_id: &str, workspace: PathBuf, reason: String) -> Submission {
    Submission {
        submission_id: Uuid::new_v4(),
        job_id: job_id.to_string(),
        outcome: SubmissionOutcome::Failure,
        workspace,
        deliverables: Vec::new(),
        failure_reason: Some(reason),
        processing_ms: 0,
    }
}

fn lost(job: &Job, run_name: &Path) -> Submission {
    failure(
        &job.id,
        run_name.join(workspace_for(job.category(), &job.id)),
        "worker stopped before reporting".into(),
    )
}

/// Sem `project.json` legível, a categoria vem do diretório pai do job.
fn unloadable(missing: &UnloadableJob, run_name: &Path) -> Submission {
    let category = missing
        .rel_path
        .parent()
        .and_then(Path::file_name)
        .map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_else(|| "uncategorized".into());
    failure(
        &missing.job_id,
        run_name.join(workspace_for(&category, &missing.job_id)),
        format!("job could not be loaded: {}", missing.reason),
    )
}

/// `<category>/<job_id>`, com as duas partes reduzidas a segmentos seguros.
fn workspace_for(category: &str, job_id: &str) -> PathBuf {
    PathBuf::from(path_segment(category)).join(path_segment(job_id))
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::write_job;
    use crate::store::SelectedJob;
    use crate::test_support::ScriptedWorker;
    use crate::worker::WorkerError;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn qualified_set(root: &Path, ids: &[&str]) -> QualifiedSet {
        let selected = ids
            .iter()
            .map(|id| {
                let dir = write_job(root, "writing", id, &format!("Write piece {id}"));
                SelectedJob {
                    job_id: id.to_string(),
                    rel_path: dir.strip_prefix(root).unwrap().to_path_buf(),
                }
            })
            .collect();
        SelectionManifest {
            source_run: "20250301_142233_000".parse().unwrap(),
            expression: "criterion_1 AND criterion_2".into(),
            selected,
        }
        .save(root)
        .unwrap();
        QualifiedSet::load(root, None).unwrap()
    }

    fn fail_on(id: &'static str) -> ScriptedWorker {
        ScriptedWorker::new(move |job| {
            if job.id == id {
                Err(WorkerError::Declined("needs a licensed tool".into()))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn six_of_seven_is_85_71_percent() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["j1", "j2", "j3", "j4", "j5", "j6", "j7"]);

        let agent = SubmissionAgent::new(Arc::new(fail_on("j4")));
        let run = agent.submit(&set, "m", 3, out.path()).await.unwrap();

        assert_eq!(run.stats.attempted, 7);
        assert_eq!(run.stats.succeeded, 6);
        assert_eq!(run.stats.failed, 1);
        assert_eq!(run.stats.success_percent(), "85.71%");
        assert_eq!(run.submissions.len(), 7);

        let failed = run.submissions.iter().find(|s| !s.succeeded()).unwrap();
        assert_eq!(failed.job_id, "j4");
        assert!(failed.failure_reason.as_deref().unwrap().contains("licensed tool"));
        assert!(failed.deliverables.is_empty());
    }

    #[tokio::test]
    async fn deliverables_land_in_per_job_workspace() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["j1"]);

        let agent = SubmissionAgent::new(Arc::new(ScriptedWorker::new(|_| Ok(()))));
        let run = agent.submit(&set, "m", 1, out.path()).await.unwrap();

        let s = &run.submissions[0];
        let ts = run.execution_timestamp().to_string();
        assert_eq!(s.workspace, PathBuf::from(&ts).join("writing").join("j1"));
        assert_eq!(s.deliverables, vec![PathBuf::from("result.txt")]);
        assert!(out.path().join(&s.workspace).join("result.txt").is_file());
    }

    #[tokio::test]
    async fn outcomes_do_not_depend_on_parallelism() {
        let data = TempDir::new().unwrap();
        let ids = ["a", "b", "c", "d", "e", "f"];
        let set = qualified_set(data.path(), &ids);
        let worker = Arc::new(
            ScriptedWorker::new(|job| {
                if job.id == "b" || job.id == "e" {
                    Err(WorkerError::Malformed("no files".into()))
                } else {
                    Ok(())
                }
            })
            .with_delay(Duration::from_millis(5)),
        );
        let agent = SubmissionAgent::new(Arc::clone(&worker));

        let mut by_parallelism = Vec::new();
        for p in [1, 4] {
            let out = TempDir::new().unwrap();
            let run = agent.submit(&set, "m", p, out.path()).await.unwrap();
            let outcomes: HashMap<String, SubmissionOutcome> = run
                .submissions
                .iter()
                .map(|s| (s.job_id.clone(), s.outcome))
                .collect();
            by_parallelism.push(outcomes);
        }
        assert_eq!(by_parallelism[0], by_parallelism[1]);
        assert_eq!(by_parallelism[0]["b"], SubmissionOutcome::Failure);
        assert!(worker.peak() <= 4);
    }

    #[tokio::test]
    async fn pool_never_exceeds_parallelism() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["a", "b", "c", "d", "e", "f", "g", "h"]);
        let worker = Arc::new(ScriptedWorker::new(|_| Ok(())).with_delay(Duration::from_millis(20)));

        SubmissionAgent::new(Arc::clone(&worker))
            .submit(&set, "m", 2, out.path())
            .await
            .unwrap();
        assert!(worker.peak() <= 2, "peak {}", worker.peak());
        assert!(worker.peak() >= 1);
    }

    #[tokio::test]
    async fn panicking_worker_fails_only_its_job() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["a", "b", "c"]);
        let worker = ScriptedWorker::new(|job| {
            if job.id == "b" {
                panic!("boom");
            }
            Ok(())
        });

        let run = SubmissionAgent::new(Arc::new(worker))
            .submit(&set, "m", 2, out.path())
            .await
            .unwrap();
        assert_eq!(run.stats.attempted, 3);
        assert_eq!(run.stats.succeeded, 2);
        let b = run.submissions.iter().find(|s| s.job_id == "b").unwrap();
        assert_eq!(b.failure_reason.as_deref(), Some("worker panicked"));
    }

    #[tokio::test]
    async fn zero_parallelism_is_a_configuration_error() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["a"]);
        let err = SubmissionAgent::new(Arc::new(ScriptedWorker::new(|_| Ok(()))))
            .submit(&set, "m", 0, out.path())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn empty_set_reports_zero_attempts() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &[]);
        let run = SubmissionAgent::new(Arc::new(ScriptedWorker::new(|_| Ok(()))))
            .submit(&set, "m", 4, out.path())
            .await
            .unwrap();
        assert_eq!(run.stats.attempted, 0);
        assert_eq!(run.stats.success_percent(), "0.00%");
    }

    #[test]
    fn directory_without_manifest_is_not_a_qualified_set() {
        let data = TempDir::new().unwrap();
        write_job(data.path(), "writing", "a", "d");
        let err = QualifiedSet::load(data.path(), None).unwrap_err();
        assert!(matches!(err, BenchError::NotAQualifiedSet(_)));
    }

    #[test]
    fn load_respects_limit_and_manifest_order() {
        let data = TempDir::new().unwrap();
        let set = qualified_set(data.path(), &["z", "a", "m"]);
        let ids: Vec<_> = set
            .entries
            .iter()
            .map(|e| match e {
                SetEntry::Ready(job) => job.id.as_str(),
                SetEntry::Unloadable(missing) => missing.job_id.as_str(),
            })
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);

        let limited = QualifiedSet::load(data.path(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn selected_job_missing_on_disk_counts_as_failure() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        qualified_set(data.path(), &["a", "b"]);
        std::fs::remove_dir_all(data.path().join("projects/writing/b")).unwrap();

        let set = QualifiedSet::load(data.path(), None).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.unloadable_count(), 1);

        let run = SubmissionAgent::new(Arc::new(ScriptedWorker::new(|_| Ok(()))))
            .submit(&set, "m", 2, out.path())
            .await
            .unwrap();
        assert_eq!(run.stats.attempted, 2);
        assert_eq!(run.stats.succeeded, 1);
        assert_eq!(run.stats.failed, 1);
        assert_eq!(run.stats.success_percent(), "50.00%");

        let ids: Vec<_> = run.submissions.iter().map(|s| s.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let b = &run.submissions[1];
        assert!(!b.succeeded());
        assert!(b.failure_reason.as_deref().unwrap().starts_with("job could not be loaded"));
        let ts = run.execution_timestamp().to_string();
        assert_eq!(b.workspace, PathBuf::from(&ts).join("writing").join("b"));
    }

    #[test]
    fn path_segments_are_sanitized() {
        assert_eq!(path_segment("Writing & Translation"), "Writing _ Translation");
        assert_eq!(path_segment("../etc"), "_etc");
        assert_eq!(path_segment(""), "_");
        assert_eq!(path_segment("a/b"), "a_b");
    }
}
