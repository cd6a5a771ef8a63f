//! Agente de qualificação: avalia cada job contra cada critério da rubrica.
//!
//! As avaliações rodam em paralelo, limitadas por um `Semaphore`, e são
//! coletadas por um `JoinSet`. Os julgamentos de cada job são guardados na
//! ordem da rubrica antes de calcular a aprovação geral.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::anthropic::MessageSender;
use crate::dataset::Job;
use crate::evaluator::CriterionEvaluator;
use crate::judgment::{Judgment, Outcome};
use crate::rubric::Rubric;
use crate::run::{ExecutionTimestamp, RunContext};
use crate::stats::{CriterionStats, RunKind, RunStats};

/// Todos os julgamentos de um job em uma execução, na ordem da rubrica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualificationRecord {
    pub job_id: String,
    pub job_path: PathBuf,
    pub execution_timestamp: ExecutionTimestamp,
    pub model: String,
    pub judgments: Vec<Judgment>,
    /// Verdadeiro sse todos os julgamentos passaram.
    pub overall_pass: bool,
}

impl QualificationRecord {
    pub fn new(job: &Job, ctx: &RunContext, judgments: Vec<Judgment>) -> Self {
        let overall_pass = !judgments.is_empty() && judgments.iter().all(|j| j.outcome.is_pass());
        Self {
            job_id: job.id.clone(),
            job_path: job.rel_path.clone(),
            execution_timestamp: ctx.execution_timestamp.clone(),
            model: ctx.model.clone(),
            judgments,
            overall_pass,
        }
    }

    pub fn outcomes(&self) -> HashMap<&str, Outcome> {
        self.judgments
            .iter()
            .map(|j| (j.criterion.as_str(), j.outcome))
            .collect()
    }

    /// A avaliação completou para este job (nenhum julgamento `Error`).
    pub fn completed(&self) -> bool {
        self.judgments.iter().all(|j| j.outcome != Outcome::Error)
    }

    pub fn processing_secs(&self) -> f64 {
        self.judgments.iter().map(|j| j.latency_ms).sum::<u64>() as f64 / 1000.0
    }
}

#[derive(Debug, Clone)]
pub struct QualificationRun {
    pub records: Vec<QualificationRecord>,
    pub stats: RunStats,
}

impl QualificationRun {
    pub fn execution_timestamp(&self) -> &ExecutionTimestamp {
        &self.stats.execution_timestamp
    }
}

/// Avalia todos os critérios contra todos os jobs e agrega os resultados.
pub struct QualificationAgent<C> {
    evaluator: CriterionEvaluator<C>,
    concurrency: usize,
    progress: Option<ProgressBar>,
}

impl<C: MessageSender + 'static> QualificationAgent<C> {
    pub fn new(client: Arc<C>, max_tokens: u32, concurrency: usize) -> Self {
        Self {
            evaluator: CriterionEvaluator::new(client, max_tokens),
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    /// Incrementa `progress` a cada avaliação concluída.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn qualify(&self, jobs: &[Job], rubric: &Rubric, model: &str) -> QualificationRun {
        let ctx = RunContext::start(model, self.concurrency);
        info!(
            execution_timestamp = %ctx.execution_timestamp,
            "Qualifying {} jobs against {} criteria (concurrency {})",
            jobs.len(),
            rubric.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let model: Arc<str> = Arc::from(model);
        // Um brief por job, compartilhado por todos os critérios.
        let shared: Vec<(Arc<Job>, Arc<str>)> = jobs
            .iter()
            .map(|job| (Arc::new(job.clone()), Arc::from(job.render_brief())))
            .collect();
        let mut slots: Vec<Vec<Option<Judgment>>> = vec![vec![None; rubric.len()]; jobs.len()];

        let mut set = JoinSet::new();
        for (ji, (job, brief)) in shared.iter().enumerate() {
            for (ci, criterion) in rubric.criteria().iter().enumerate() {
                let semaphore = Arc::clone(&semaphore);
                let evaluator = self.evaluator.clone();
                let job = Arc::clone(job);
                let brief = Arc::clone(brief);
                let criterion = criterion.clone();
                let model = Arc::clone(&model);
                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let judgment = evaluator.evaluate(&job, &brief, &criterion, &model).await;
                    (ji, ci, judgment)
                });
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((ji, ci, judgment)) => slots[ji][ci] = Some(judgment),
                Err(e) => error!("evaluation task failed: {e}"),
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        let records: Vec<QualificationRecord> = jobs
            .iter()
            .zip(slots)
            .map(|(job, row)| {
                let judgments = row
                    .into_iter()
                    .zip(rubric.criteria())
                    .map(|(slot, criterion)| {
                        slot.unwrap_or_else(|| {
                            Judgment::error(&criterion.name, "evaluation task panicked", 0)
                        })
                    })
                    .collect();
                let record = QualificationRecord::new(job, &ctx, judgments);
                info!(
                    job_id = %record.job_id,
                    qualified = record.overall_pass,
                    completed = record.completed(),
                    "Job evaluated"
                );
                record
            })
            .collect();

        let mut stats = RunStats::from_units(
            RunKind::Qualification,
            &ctx,
            records.iter().map(|r| (r.completed(), r.processing_secs())),
        );
        stats.qualified = Some(records.iter().filter(|r| r.overall_pass).count());
        stats.criteria = rubric
            .criteria()
            .iter()
            .enumerate()
            .map(|(ci, c)| CriterionStats::tally(&c.name, records.iter().map(|r| &r.judgments[ci].outcome)))
            .collect();

        QualificationRun { records, stats }
    }
}
