//! Interface de terminal do gigbench: barra de progresso e resumo colorido.
//!
//! Usa `indicatif` para o progresso de uma execução e `console` para
//! estilização com cores. O resumo também é emitido no stream de log.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::ledger::RunLedger;
use crate::selector::TransferReport;
use crate::stats::{RunStats, percent};

/// Barra de progresso de uma execução (unidades concluídas / total).
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn start(label: &str, total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Handle para os agentes incrementarem.
    pub fn bar(&self) -> ProgressBar {
        self.pb.clone()
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}

/// Estilos do resumo: verde para sucesso, vermelho para falha, amarelo para erro.
pub struct Palette {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Palette {
    /// Imprime o resumo de uma execução e registra os mesmos números no log.
    pub fn print_run(&self, stats: &RunStats) {
        info!(
            kind = %stats.kind,
            execution_timestamp = %stats.execution_timestamp,
            model = %stats.model,
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            success_rate = %stats.success_percent(),
            total_secs = stats.total_processing_secs,
            average_secs = stats.average_processing_secs,
            "Run complete"
        );

        println!();
        println!(
            "{} {} {}",
            self.dim.apply_to("───"),
            stats.kind,
            self.dim.apply_to(format!("run {} ───", stats.execution_timestamp))
        );
        println!("  model        {} (parallelism {})", stats.model, stats.parallelism);
        println!(
            "  attempted    {}   {} {}   {} {}",
            stats.attempted,
            self.green.apply_to("✓"),
            stats.succeeded,
            self.red.apply_to("✗"),
            stats.failed
        );
        println!("  success      {}", stats.success_percent());
        if stats.skipped > 0 {
            println!(
                "  skipped      {}",
                self.yellow.apply_to(format!("{} unreadable jobs", stats.skipped))
            );
        }
        if let Some(qualified) = stats.qualified {
            println!(
                "  qualified    {} of {} ({})",
                self.green.apply_to(qualified),
                stats.attempted,
                percent(qualified, stats.attempted)
            );
        }
        for c in &stats.criteria {
            info!(
                criterion = %c.criterion,
                passed = c.passed,
                failed = c.failed,
                errored = c.errored,
                pass_rate = %percent(c.passed, c.jobs()),
                evaluated_pass_rate = %percent(c.passed, c.passed + c.failed),
                "Criterion result"
            );
            let errored = if c.errored > 0 {
                self.yellow.apply_to(format!("  {} errored", c.errored)).to_string()
            } else {
                String::new()
            };
            println!(
                "  {:<12} {} passed / {} evaluated ({}){}",
                c.criterion,
                c.passed,
                c.passed + c.failed,
                percent(c.passed, c.passed + c.failed),
                errored
            );
        }
        println!(
            "  time         {:.2}s total, {:.2}s per job",
            stats.total_processing_secs, stats.average_processing_secs
        );
    }

    pub fn print_transfer(&self, report: &TransferReport) {
        println!();
        println!(
            "  {} {} jobs transferred ({} copied, {} skipped, {} overwritten)",
            self.green.apply_to("✓"),
            report.transferred.len(),
            report.files.copied,
            report.files.skipped,
            report.files.overwritten
        );
        for (job_id, reason) in &report.failed {
            println!("  {} {job_id}: {reason}", self.red.apply_to("✗"));
        }
    }

    pub fn print_ledger(&self, ledger: &RunLedger, runs: &[RunStats]) {
        if runs.is_empty() {
            println!("No runs recorded in {}", ledger.path().display());
            return;
        }
        for run in runs {
            let rate = if run.failed == 0 {
                self.green.apply_to(run.success_percent())
            } else {
                self.yellow.apply_to(run.success_percent())
            };
            println!(
                "{}  {:<13} {:>4} jobs  {:>8}  {}",
                run.execution_timestamp, run.kind, run.attempted, rate, self.dim.apply_to(&run.model)
            );
        }
    }
}
