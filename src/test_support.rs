//! Colaboradores roteirizados compartilhados pelos testes unitários.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::anthropic::types::{ContentBlock, Usage};
use crate::anthropic::{AnthropicError, MessageSender, MessagesRequest, MessagesResponse};
use crate::dataset::Job;
use crate::worker::{Deliverable, WorkerAgent, WorkerError};

type Reply = dyn Fn(&str) -> Result<String, AnthropicError> + Send + Sync;

/// `MessageSender` cuja resposta é calculada a partir do texto do prompt.
pub struct ScriptedClient {
    reply: Box<Reply>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(
        reply: impl Fn(&str) -> Result<String, AnthropicError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Espera antes de cada resposta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ok(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MessageSender for ScriptedClient {
    async fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let prompt = req
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let text = (self.reply)(prompt)?;
        Ok(MessagesResponse {
            id: "mock".into(),
            content: vec![ContentBlock {
                content_type: "text".into(),
                text,
            }],
            model: req.model.clone(),
            stop_reason: Some("end_turn".into()),
            usage: Usage {
                input_tokens: 0,
                output_tokens: 0,
            },
        })
    }
}

/// A linha seguinte a `heading` em um prompt renderizado.
pub fn section<'a>(prompt: &'a str, heading: &str) -> Option<&'a str> {
    let mut lines = prompt.lines();
    lines.by_ref().find(|l| l.trim() == heading)?;
    lines.next().map(str::trim)
}

pub fn api_error() -> AnthropicError {
    AnthropicError::ApiError {
        status: 500,
        message: "mock error".into(),
    }
}

pub fn verdict(yes: bool) -> String {
    let v = if yes { "YES" } else { "NO" };
    format!(r#"{{"judgment": "{v}", "reasoning": "scripted"}}"#)
}

type Script = dyn Fn(&Job) -> Result<(), WorkerError> + Send + Sync;

/// `WorkerAgent` que grava `result.txt` quando o roteiro retorna `Ok`.
pub struct ScriptedWorker {
    script: Box<Script>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(script: impl Fn(&Job) -> Result<(), WorkerError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Maior número de tentativas observadas rodando ao mesmo tempo.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl WorkerAgent for ScriptedWorker {
    async fn attempt_job(&self, job: &Job, workspace: &Path) -> Result<Deliverable, WorkerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(job)?;
        std::fs::create_dir_all(workspace)?;
        std::fs::write(workspace.join("result.txt"), format!("done: {}", job.id))?;
        Ok(Deliverable {
            files: vec![PathBuf::from("result.txt")],
        })
    }
}
