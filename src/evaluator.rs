//! Avaliação de um job contra um único critério.
//!
//! Cada par (job, critério) é uma chamada de inferência independente. Falhas
//! do cliente e respostas ilegíveis viram julgamentos `Error`, nunca erros
//! propagados.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::anthropic::{MessageSender, complete};
use crate::dataset::Job;
use crate::judgment::{Judgment, Outcome, parse_judgment};
use crate::rubric::Criterion;

const JUDGE_SYSTEM: &str = "You are an expert project evaluator for a freelance work benchmark. \
     You judge one criterion at a time, independently of any other criterion.";

/// Julga um job contra um critério com uma única chamada de inferência.
pub struct CriterionEvaluator<C> {
    client: Arc<C>,
    max_tokens: u32,
}

impl<C> Clone for CriterionEvaluator<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            max_tokens: self.max_tokens,
        }
    }
}

impl<C: MessageSender> CriterionEvaluator<C> {
    pub fn new(client: Arc<C>, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    /// Avalia `job` contra `criterion` usando `model`. `brief` é o bloco de
    /// [`Job::render_brief`], renderizado uma vez por job pelo chamador.
    ///
    /// Nunca falha: erros do cliente e respostas ilegíveis viram julgamentos
    /// `Outcome::Error` com o detalhe da falha.
    pub async fn evaluate(
        &self,
        job: &Job,
        brief: &str,
        criterion: &Criterion,
        model: &str,
    ) -> Judgment {
        if !job.has_description() {
            warn!(job_id = %job.id, criterion = %criterion.name, "job has no description");
            return Judgment::error(&criterion.name, "job description is empty", 0);
        }

        let prompt = build_prompt(brief, criterion);
        let started = Instant::now();
        let reply = complete(self.client.as_ref(), model, &prompt, self.max_tokens).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let judgment = match reply {
            Ok(text) => match parse_judgment(&text) {
                Ok((outcome, rationale)) => Judgment {
                    criterion: criterion.name.clone(),
                    outcome,
                    rationale,
                    latency_ms,
                },
                Err(e) => Judgment::error(&criterion.name, format!("unparseable reply: {e}"), latency_ms),
            },
            Err(e) => Judgment::error(&criterion.name, format!("inference failed: {e}"), latency_ms),
        };

        if judgment.outcome == Outcome::Error {
            warn!(job_id = %job.id, criterion = %criterion.name, "evaluation error: {}", judgment.rationale);
        } else {
            debug!(job_id = %job.id, criterion = %criterion.name, outcome = %judgment.outcome, latency_ms);
        }
        judgment
    }
}

fn build_prompt(brief: &str, criterion: &Criterion) -> String {
    format!(
        "{JUDGE_SYSTEM}\n\
         \n\
         Analyze the project information and attachments below and decide whether the \
         project meets this criterion.\n\
         \n\
         ## Criterion\n\
         {name}\n\
         \n\
         ## Question\n\
         {question}\n\
         \n\
         Respond with ONLY valid JSON, no other text.\n\
         Format: {{\"judgment\": \"YES\" or \"NO\", \"reasoning\": \"<your detailed explanation>\"}}\n\
         \n\
         {brief}",
        name = criterion.name,
        question = criterion.question,
    )
}
