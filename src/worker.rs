//! Agentes worker: quem de fato executa um job qualificado.
//!
//! O [`LlmWorker`] pede ao modelo os arquivos finais em uma única chamada,
//! grava a resposta bruta em `agent_stream.txt` e só então escreve as
//! entregas no workspace.

use std::fs;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::anthropic::{AnthropicError, MessageSender, complete};
use crate::dataset::Job;
use crate::judgment::strip_code_fence;
use crate::store::AGENT_STREAM_FILE;

/// Arquivos produzidos por um worker, relativos ao workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deliverable {
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("agent declined the job: {0}")]
    Declined(String),

    #[error("malformed agent output: {0}")]
    Malformed(String),

    #[error("agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference failed: {0}")]
    Inference(#[from] AnthropicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executa um job e deixa as entregas em `workspace`.
pub trait WorkerAgent: Send + Sync + 'static {
    fn attempt_job(
        &self,
        job: &Job,
        workspace: &Path,
    ) -> impl Future<Output = Result<Deliverable, WorkerError>> + Send;
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    files: Vec<ReplyFile>,
}

#[derive(Debug, Deserialize)]
struct ReplyFile {
    path: String,
    content: String,
}

/// Worker que pede ao modelo os arquivos prontos em uma chamada.
pub struct LlmWorker<C> {
    client: Arc<C>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl<C: MessageSender + 'static> LlmWorker<C> {
    pub fn new(client: Arc<C>, model: impl Into<String>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    async fn run(&self, job: &Job, workspace: &Path) -> Result<Deliverable, WorkerError> {
        let prompt = build_prompt(job);
        let reply = complete(self.client.as_ref(), &self.model, &prompt, self.max_tokens).await?;

        // A transcrição fica no disco mesmo quando a resposta é recusada ou inválida.
        fs::create_dir_all(workspace)?;
        fs::write(workspace.join(AGENT_STREAM_FILE), &reply)?;

        let parsed: WorkerReply = serde_json::from_str(strip_code_fence(reply.trim()))
            .map_err(|e| WorkerError::Malformed(e.to_string()))?;

        match parsed.status.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => {}
            "FAILED" => {
                return Err(WorkerError::Declined(
                    parsed.reason.unwrap_or_else(|| "no reason given".into()),
                ));
            }
            other => return Err(WorkerError::Malformed(format!("unknown status `{other}`"))),
        }
        if parsed.files.is_empty() {
            return Err(WorkerError::Malformed("no deliverable files".into()));
        }

        let mut files = Vec::with_capacity(parsed.files.len());
        for file in &parsed.files {
            files.push(safe_relative(&file.path)?);
        }
        for (rel, file) in files.iter().zip(&parsed.files) {
            let target = workspace.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.content)?;
            debug!(job_id = %job.id, file = %target.display(), "wrote deliverable");
        }
        info!(job_id = %job.id, files = files.len(), "deliverables written");
        Ok(Deliverable { files })
    }
}

impl<C: MessageSender + 'static> WorkerAgent for LlmWorker<C> {
    async fn attempt_job(&self, job: &Job, workspace: &Path) -> Result<Deliverable, WorkerError> {
        match tokio::time::timeout(self.timeout, self.run(job, workspace)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(self.timeout)),
        }
    }
}

/// Rejeita caminhos absolutos, qualquer coisa que suba para fora do
/// workspace e o nome reservado da transcrição.
fn safe_relative(path: &str) -> Result<PathBuf, WorkerError> {
    let candidate = Path::new(path.trim());
    let clean = !candidate.as_os_str().is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let reserved = candidate
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect::<PathBuf>()
        == Path::new(AGENT_STREAM_FILE);
    if clean && !reserved {
        Ok(candidate.to_path_buf())
    } else {
        Err(WorkerError::Malformed(format!("unsafe deliverable path `{path}`")))
    }
}

fn build_prompt(job: &Job) -> String {
    format!(
        "You are an expert freelancer. Use the information the client included to deliver the \
         work described in the Project Title, Project Description and Milestones. Actually \
         complete the work; do not write a report describing the work that should be done. \
         If you cannot complete the work as requested, say so instead of delivering something \
         partial.\n\
         \n\
         Respond with ONLY valid JSON, no other text:\n\
         {{\"status\": \"SUCCESS\" or \"FAILED\", \"reason\": \"<why, when FAILED>\", \
         \"files\": [{{\"path\": \"<relative path>\", \"content\": \"<file contents>\"}}]}}\n\
         \n\
         Put the files for each milestone in a sub-directory named `milestone_<sequence>`. \
         Paths must be relative and must not contain `..`.\n\
         \n\
         {brief}",
        brief = job.render_brief()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::job;
    use crate::test_support::{ScriptedClient, api_error};
    use tempfile::TempDir;

    fn worker(client: ScriptedClient) -> LlmWorker<ScriptedClient> {
        LlmWorker::new(Arc::new(client), "m", 1024, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn success_writes_files_into_workspace() {
        let reply = r##"{"status": "SUCCESS", "files": [
            {"path": "milestone_1/report.md", "content": "# Report"},
            {"path": "milestone_1/data.csv", "content": "a,b\n1,2\n"}
        ]}"##;
        let tmp = TempDir::new().unwrap();
        let out = worker(ScriptedClient::ok(reply))
            .attempt_job(&job("p1", "Write a report"), tmp.path())
            .await
            .unwrap();
        assert_eq!(out.files.len(), 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("milestone_1/report.md")).unwrap(),
            "# Report"
        );
    }

    #[tokio::test]
    async fn failed_status_is_declined() {
        let tmp = TempDir::new().unwrap();
        let err = worker(ScriptedClient::ok(r#"{"status": "FAILED", "reason": "needs Photoshop"}"#))
            .attempt_job(&job("p1", "Retouch photos"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Declined(r) if r == "needs Photoshop"));
    }

    #[tokio::test]
    async fn raw_reply_is_kept_as_agent_stream() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("ws");
        let err = worker(ScriptedClient::ok("I would rather not."))
            .attempt_job(&job("p1", "d"), &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Malformed(_)));
        assert_eq!(
            fs::read_to_string(ws.join(AGENT_STREAM_FILE)).unwrap(),
            "I would rather not."
        );

        let reply = r#"{"status": "SUCCESS", "files": [{"path": "a.txt", "content": "x"}]}"#;
        let out = worker(ScriptedClient::ok(reply))
            .attempt_job(&job("p2", "d"), &tmp.path().join("ws2"))
            .await
            .unwrap();
        assert_eq!(out.files, vec![PathBuf::from("a.txt")]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("ws2").join(AGENT_STREAM_FILE)).unwrap(),
            reply
        );
    }

    #[tokio::test]
    async fn slow_model_hits_the_attempt_timeout() {
        let tmp = TempDir::new().unwrap();
        let client = ScriptedClient::ok(r#"{"status": "SUCCESS", "files": []}"#)
            .with_delay(Duration::from_millis(500));
        let worker = LlmWorker::new(Arc::new(client), "m", 1024, Duration::from_millis(50));
        let err = worker
            .attempt_job(&job("p1", "d"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(t) if t == Duration::from_millis(50)));
        assert!(!tmp.path().join(AGENT_STREAM_FILE).exists());
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected_before_writing() {
        let tmp = TempDir::new().unwrap();
        let reply = r#"{"status": "SUCCESS", "files": [
            {"path": "ok.txt", "content": "x"},
            {"path": "../escape.txt", "content": "y"}
        ]}"#;
        let err = worker(ScriptedClient::ok(reply))
            .attempt_job(&job("p1", "d"), &tmp.path().join("ws"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Malformed(_)));
        assert!(!tmp.path().join("ws/ok.txt").exists());
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn empty_or_unparseable_output_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let err = worker(ScriptedClient::ok(r#"{"status": "SUCCESS", "files": []}"#))
            .attempt_job(&job("p1", "d"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Malformed(_)));

        let err = worker(ScriptedClient::ok("Here is your report!"))
            .attempt_job(&job("p1", "d"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Malformed(_)));
    }

    #[tokio::test]
    async fn inference_errors_surface() {
        let tmp = TempDir::new().unwrap();
        let err = worker(ScriptedClient::new(|_| Err(api_error())))
            .attempt_job(&job("p1", "d"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Inference(_)));
    }

    #[test]
    fn safe_relative_accepts_nested_paths_only() {
        assert!(safe_relative("milestone_1/a.txt").is_ok());
        assert!(safe_relative("./a.txt").is_ok());
        assert!(safe_relative("/etc/passwd").is_err());
        assert!(safe_relative("a/../../b").is_err());
        assert!(safe_relative("  ").is_err());
        assert!(safe_relative("agent_stream.txt").is_err());
        assert!(safe_relative("./agent_stream.txt").is_err());
        assert!(safe_relative("milestone_1/agent_stream.txt").is_ok());
    }
}
