mod anthropic;
mod cli;
mod config;
mod criteria;
mod dataset;
mod error;
mod evaluator;
mod judgment;
mod ledger;
mod qualification;
mod rubric;
mod run;
mod selector;
mod stats;
mod store;
mod submission;
mod ui;
mod worker;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use anthropic::{AnthropicClient, resolve_model};
use cli::{Cli, Command};
use config::BenchConfig;
use criteria::CriteriaExpr;
use error::BenchError;
use ledger::RunLedger;
use qualification::QualificationAgent;
use run::ExecutionTimestamp;
use selector::TransferPolicy;
use stats::RunStats;
use submission::{QualifiedSet, SubmissionAgent};
use ui::{Palette, RunProgress};
use worker::LlmWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = dispatch(cli).await;
    if let Err(e) = &result
        && e.downcast_ref::<BenchError>().is_some_and(BenchError::is_configuration)
    {
        error!("configuration error, nothing was run: {e}");
    }
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = BenchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Qualify {
            data_dir,
            limit,
            llm,
            concurrency,
        } => qualify(&config, &data_dir, limit, llm, concurrency).await,
        Command::Transfer {
            data_dir,
            qualification_execution_timestamp,
            criteria,
            dest_dir,
            abort_on_error,
        } => transfer(
            &config,
            &data_dir,
            &qualification_execution_timestamp,
            criteria.as_deref(),
            &dest_dir,
            abort_on_error,
        ),
        Command::Submit {
            data_dir,
            submission_dir,
            limit,
            parallelism,
            llm,
            timeout,
        } => {
            submit(
                &config,
                &data_dir,
                &submission_dir,
                limit,
                parallelism,
                llm,
                timeout,
            )
            .await
        }
        Command::Runs { timestamp } => runs(&config, timestamp.as_deref()),
    }
}

fn client(config: &BenchConfig, timeout: Duration) -> Result<Arc<AnthropicClient>> {
    let api_key = config.require_api_key()?.to_string();
    let client = match &config.api_base_url {
        Some(url) => AnthropicClient::with_base_url(api_key, url.clone(), timeout)?,
        None => AnthropicClient::new(api_key, timeout)?,
    };
    Ok(Arc::new(client))
}

fn record_run(config: &BenchConfig, stats: &RunStats) {
    let ledger = RunLedger::new(&config.ledger_path);
    if let Err(e) = ledger.append(stats) {
        warn!(ledger = %ledger.path().display(), "could not record run: {e}");
    }
}

async fn qualify(
    config: &BenchConfig,
    data_dir: &Path,
    limit: Option<usize>,
    llm: Option<String>,
    concurrency: Option<usize>,
) -> Result<()> {
    let rubric = config.rubric()?;
    let model = resolve_model(llm.as_deref().unwrap_or(&config.default_model))?;
    let client = client(config, Duration::from_secs(config.timeout_seconds.max(1)))?;
    let scan = dataset::find_jobs(data_dir, limit)?;
    let jobs = scan.jobs;
    info!(data_dir = %data_dir.display(), "Found {} jobs", jobs.len());
    if !scan.skipped.is_empty() {
        warn!("{} job directories could not be read and were skipped", scan.skipped.len());
    }

    let concurrency = concurrency.unwrap_or(config.inference_concurrency);
    let progress = RunProgress::start("qualifying", jobs.len() * rubric.len());
    let agent = QualificationAgent::new(client, config.max_tokens, concurrency)
        .with_progress(progress.bar());
    let mut run = agent.qualify(&jobs, &rubric, &model).await;
    progress.finish();
    run.stats.skipped = scan.skipped.len();

    store::write_qualification_records(data_dir, &run.records)
        .context("writing qualification records")?;
    let summary = store::save_run_summary(data_dir, &run.stats, &run.records)
        .context("writing qualification summary")?;
    info!(
        execution_timestamp = %run.execution_timestamp(),
        summary = %summary.display(),
        "Qualification results saved"
    );
    record_run(config, &run.stats);
    Palette::default().print_run(&run.stats);
    Ok(())
}

fn transfer(
    config: &BenchConfig,
    data_dir: &Path,
    timestamp: &str,
    criteria: Option<&str>,
    dest_dir: &Path,
    abort_on_error: bool,
) -> Result<()> {
    let rubric = config.rubric()?;
    let ts: ExecutionTimestamp = timestamp.parse()?;
    let expression = CriteriaExpr::from_config(criteria, &rubric)?;
    let selection = selector::select(data_dir, &ts, &expression, &rubric)?;
    debug!(selected = %selection.job_ids().join(", "), "selection");
    if selection.unreadable > 0 {
        warn!("{} qualification records could not be read", selection.unreadable);
    }

    let policy = if abort_on_error {
        TransferPolicy::Abort
    } else {
        TransferPolicy::SkipFailed
    };
    let report = selector::transfer(data_dir, &selection, dest_dir, policy)?;
    Palette::default().print_transfer(&report);
    Ok(())
}

async fn submit(
    config: &BenchConfig,
    data_dir: &Path,
    submission_dir: &Path,
    limit: Option<usize>,
    parallelism: Option<usize>,
    llm: Option<String>,
    timeout: Option<u64>,
) -> Result<()> {
    let model = resolve_model(llm.as_deref().unwrap_or(&config.default_model))?;
    let parallelism = parallelism.unwrap_or(config.parallelism);
    let timeout = Duration::from_secs(timeout.unwrap_or(config.timeout_seconds).max(1));
    let client = client(config, timeout)?;
    let set = QualifiedSet::load(data_dir, limit)?;
    if set.unloadable_count() > 0 {
        warn!(
            "{} selected jobs could not be loaded and will be counted as failures",
            set.unloadable_count()
        );
    }
    if set.is_empty() {
        warn!(
            source_run = %set.manifest().source_run,
            "qualified set at {} has no jobs",
            data_dir.display()
        );
    }

    let worker = LlmWorker::new(client, model.clone(), config.max_tokens, timeout);
    let progress = RunProgress::start("submitting", set.len());
    let agent = SubmissionAgent::new(Arc::new(worker)).with_progress(progress.bar());
    let run = agent.submit(&set, &model, parallelism, submission_dir).await;
    progress.finish();
    let run = run?;

    let summary = store::save_run_summary(submission_dir, &run.stats, &run.submissions)
        .context("writing submission summary")?;
    info!(
        execution_timestamp = %run.execution_timestamp(),
        summary = %summary.display(),
        "Submission results saved"
    );
    record_run(config, &run.stats);
    Palette::default().print_run(&run.stats);
    Ok(())
}

fn runs(config: &BenchConfig, timestamp: Option<&str>) -> Result<()> {
    let ledger = RunLedger::new(&config.ledger_path);
    let palette = Palette::default();
    match timestamp {
        Some(ts) => {
            let ts: ExecutionTimestamp = ts.parse()?;
            let stats = ledger
                .find(&ts)?
                .ok_or_else(|| BenchError::UnknownRun(ts.to_string()))?;
            palette.print_run(&stats);
        }
        None => palette.print_ledger(&ledger, &ledger.entries()?),
    }
    Ok(())
}
