//! Jobs lidos de um dataset extraído.
//!
//! Cada diretório sob `<data_dir>/projects` que contém um `project.json` é
//! um job. Os anexos ficam no diretório `inputs/` do job.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{BenchError, Result};

pub const PROJECT_FILE: &str = "project.json";
pub const PROJECTS_DIR: &str = "projects";
pub const INPUTS_DIR: &str = "inputs";

/// Limite de texto de anexo incluído no prompt, por arquivo.
const MAX_INLINE_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default)]
    pub milestone_sequence: Option<u32>,
    #[serde(default)]
    pub milestone_description: String,
}

/// Conteúdo de `project.json`. Campos desconhecidos são preservados para
/// que nada se perca ao copiar ou re-serializar o registro.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub milestone_data: Vec<Milestone>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Um job freelance. Somente leitura depois de carregado.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// Diretório que contém `project.json`.
    pub dir: PathBuf,
    /// Caminho de `dir` relativo ao diretório de dados.
    pub rel_path: PathBuf,
    pub project: ProjectData,
}

/// Arquivo encontrado no diretório `inputs/` de um job.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub rel_path: PathBuf,
    pub size: u64,
    /// Conteúdo UTF-8 de arquivos de texto pequenos.
    pub text: Option<String>,
}

impl Job {
    /// Carrega o job em `dir`, com caminho relativo a `data_dir`.
    pub fn load(data_dir: &Path, dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(dir.join(PROJECT_FILE))?;
        let project: ProjectData = serde_json::from_str(&raw)?;
        let rel_path = dir.strip_prefix(data_dir).unwrap_or(dir).to_path_buf();
        let id = project
            .project_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| rel_path.to_string_lossy().into_owned());
        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            rel_path,
            project,
        })
    }

    pub fn category(&self) -> &str {
        self.project
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("uncategorized")
    }

    pub fn has_description(&self) -> bool {
        !self.project.job_description.trim().is_empty()
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.dir.join(INPUTS_DIR)
    }

    /// Lista os anexos, incluindo o texto de arquivos UTF-8 pequenos.
    pub fn attachments(&self) -> Vec<Attachment> {
        let inputs = self.inputs_dir();
        if !inputs.is_dir() {
            return Vec::new();
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(&inputs).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(job_id = %self.id, "unreadable attachment entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let text = if size <= MAX_INLINE_BYTES {
                fs::read(entry.path())
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            } else {
                None
            };
            found.push(Attachment {
                rel_path: entry
                    .path()
                    .strip_prefix(&inputs)
                    .unwrap_or(entry.path())
                    .to_path_buf(),
                size,
                text,
            });
        }
        found
    }

    /// Bloco markdown descrevendo o job, usado pelos prompts do avaliador e
    /// do worker. Lê `inputs/` do disco a cada chamada.
    pub fn render_brief(&self) -> String {
        let p = &self.project;
        let mut out = String::new();
        out.push_str("## Project Category\n");
        out.push_str(&format!("Category: {}\n", p.category.as_deref().unwrap_or("")));
        out.push_str(&format!("Sub Category: {}\n", p.subcategory.as_deref().unwrap_or("")));
        out.push_str(&format!("Occupation: {}\n\n", p.occupation.as_deref().unwrap_or("")));
        out.push_str(&format!("## Job ID\n{}\n\n", self.id));
        out.push_str(&format!("## Project Title\n{}\n\n", p.job_title));
        out.push_str(&format!("## Project Description\n{}\n\n", p.job_description));

        out.push_str("## Milestones\n");
        if p.milestone_data.is_empty() {
            out.push_str("(none)\n");
        }
        for (i, m) in p.milestone_data.iter().enumerate() {
            let seq = m.milestone_sequence.unwrap_or(i as u32 + 1);
            out.push_str(&format!("Milestone {seq}\n{}\n\n", m.milestone_description));
        }

        out.push_str("\n## Attachments\n");
        let attachments = self.attachments();
        if attachments.is_empty() {
            out.push_str("(none)\n");
        }
        for a in attachments {
            out.push_str(&format!("- {} ({} bytes)\n", a.rel_path.display(), a.size));
            if let Some(text) = a.text {
                out.push_str("```\n");
                out.push_str(&text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n");
            }
        }
        out
    }
}

/// Diretório de job cujo `project.json` não pôde ser lido.
#[derive(Debug, Clone)]
pub struct SkippedJob {
    pub dir: PathBuf,
    pub reason: String,
}

/// Resultado de [`find_jobs`]: jobs carregados e os que foram pulados.
#[derive(Debug, Clone, Default)]
pub struct JobScan {
    pub jobs: Vec<Job>,
    pub skipped: Vec<SkippedJob>,
}

/// Encontra todos os jobs sob `<data_dir>/projects`, ordenados por caminho.
///
/// `limit` conta diretórios, então um job ilegível ocupa uma vaga e aparece
/// em `skipped`.
pub fn find_jobs(data_dir: &Path, limit: Option<usize>) -> Result<JobScan> {
    if !data_dir.is_dir() {
        return Err(BenchError::MissingDirectory(data_dir.display().to_string()));
    }
    let projects_dir = data_dir.join(PROJECTS_DIR);
    if !projects_dir.is_dir() {
        return Err(BenchError::MissingDirectory(projects_dir.display().to_string()));
    }

    let mut scan = JobScan::default();
    let mut dirs = Vec::new();
    for entry in WalkDir::new(&projects_dir) {
        match entry {
            Ok(e) if e.file_type().is_file() && e.file_name() == PROJECT_FILE => {
                if let Some(parent) = e.path().parent() {
                    dirs.push(parent.to_path_buf());
                }
            }
            Ok(_) => {}
            Err(e) => {
                let dir = e.path().map(Path::to_path_buf).unwrap_or_else(|| projects_dir.clone());
                warn!("skipping {}: {e}", dir.display());
                scan.skipped.push(SkippedJob {
                    dir,
                    reason: e.to_string(),
                });
            }
        }
    }
    dirs.sort();
    if let Some(limit) = limit {
        dirs.truncate(limit);
    }

    for dir in dirs {
        match Job::load(data_dir, &dir) {
            Ok(job) => {
                debug!(job_id = %job.id, path = %job.rel_path.display(), "found job");
                scan.jobs.push(job);
            }
            Err(e) => {
                warn!("skipping {}: {e}", dir.display());
                scan.skipped.push(SkippedJob {
                    dir,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(scan)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Grava um job mínimo em `<data_dir>/projects/<category>/<id>`.
    pub fn write_job(data_dir: &Path, category: &str, id: &str, description: &str) -> PathBuf {
        let dir = data_dir.join(PROJECTS_DIR).join(category).join(id);
        fs::create_dir_all(dir.join(INPUTS_DIR)).unwrap();
        let project = serde_json::json!({
            "project_id": id,
            "category": category,
            "subcategory": "General",
            "occupation": "Writer",
            "job_title": format!("Job {id}"),
            "job_description": description,
            "milestone_data": [
                {"milestone_sequence": 1, "milestone_description": "Deliver a draft"}
            ],
            "budget": 150
        });
        fs::write(dir.join(PROJECT_FILE), project.to_string()).unwrap();
        dir
    }

    /// Job em memória que nunca lê anexos do disco.
    pub fn job(id: &str, description: &str) -> Job {
        Job {
            id: id.to_string(),
            dir: PathBuf::from("/nonexistent").join(id),
            rel_path: PathBuf::from(PROJECTS_DIR).join("writing").join(id),
            project: ProjectData {
                project_id: Some(id.to_string()),
                category: Some("writing".into()),
                job_title: format!("Job {id}"),
                job_description: description.to_string(),
                ..Default::default()
            },
        }
    }
}
