//! Histórico append-only das execuções concluídas, um objeto JSON por linha.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::run::ExecutionTimestamp;
use crate::stats::RunStats;

pub struct RunLedger {
    path: PathBuf,
}

impl RunLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, stats: &RunStats) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(stats)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        debug!(
            execution_timestamp = %stats.execution_timestamp,
            ledger = %self.path.display(),
            "appended run"
        );
        Ok(())
    }

    /// Todas as entradas legíveis, ordenadas pelo timestamp. Um ledger
    /// inexistente é vazio.
    pub fn entries(&self) -> Result<Vec<RunStats>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunStats>(&line) {
                Ok(stats) => entries.push(stats),
                Err(e) => warn!(ledger = %self.path.display(), line = n + 1, "skipping entry: {e}"),
            }
        }
        entries.sort_by(|a, b| a.execution_timestamp.cmp(&b.execution_timestamp));
        Ok(entries)
    }

    pub fn find(&self, ts: &ExecutionTimestamp) -> Result<Option<RunStats>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|s| &s.execution_timestamp == ts))
    }
}
