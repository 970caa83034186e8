//! Critic Coordinator (C5)
//!
//! Runs N independent reviewers over a code diff in parallel; the outcome
//! is unanimous approval or nothing (§4.5). Reviewer fan-out runs as
//! concurrent futures joined with `futures::future::join_all`: the same
//! concurrent-agent-fan-out idea as the teacher crate's
//! `orchestration::multiagent`, but gating on unanimity needs every
//! verdict collected together rather than consumed as a stream, so this
//! uses `join_all` instead of `FuturesUnordered`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::llm::{strip_code_fences, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    RequiresChanges,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub status: ReviewStatus,
    pub comments: String,
    pub suggestions: Vec<String>,
}

/// Inputs handed to every reviewer.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub original_code: String,
    pub new_code: String,
    pub diff: String,
    pub requirements: String,
    pub related_tests: Option<String>,
}

#[async_trait]
pub trait Critic: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> ReviewVerdict;
}

/// A critic backed by an LLM call with a strict JSON-output prompt. Any
/// reviewer exception (here: LLM call failure or malformed JSON) yields
/// `status=error`, which fails unanimity (§4.5).
pub struct LlmCritic {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl LlmCritic {
    fn prompt(request: &ReviewRequest) -> String {
        format!(
            "You are reviewing a proposed code change. Respond with a single JSON object \
             of the form {{\"status\": \"approved\"|\"requires_changes\"|\"rejected\", \
             \"comments\": string, \"suggestions\": [string]}}.\n\n\
             Requirements:\n{}\n\nDiff:\n{}\n\nOriginal code:\n{}\n\nNew code:\n{}\n\nTests:\n{}",
            request.requirements,
            request.diff,
            request.original_code,
            request.new_code,
            request.related_tests.as_deref().unwrap_or("(none provided)"),
        )
    }
}

#[async_trait]
impl Critic for LlmCritic {
    async fn review(&self, request: &ReviewRequest) -> ReviewVerdict {
        let prompt = Self::prompt(request);
        let response = match self
            .client
            .invoke(&prompt, &self.model, self.temperature, self.max_tokens)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "critic LLM call failed");
                return ReviewVerdict {
                    status: ReviewStatus::Error,
                    comments: format!("reviewer call failed: {}", e),
                    suggestions: Vec::new(),
                };
            }
        };

        let cleaned = strip_code_fences(&response);
        match serde_json::from_str::<ReviewVerdict>(&cleaned) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, raw = %cleaned, "critic response was not valid JSON");
                ReviewVerdict {
                    status: ReviewStatus::Error,
                    comments: format!("could not parse reviewer response: {}", e),
                    suggestions: Vec::new(),
                }
            }
        }
    }
}

pub struct CriticCoordinator {
    critics: Vec<Arc<dyn Critic>>,
}

impl CriticCoordinator {
    pub fn new(critics: Vec<Arc<dyn Critic>>) -> Self {
        Self { critics }
    }

    /// Run all reviewers concurrently and gate on unanimity: every reviewer
    /// must return `approved` (§4.5, §8 invariant 8).
    pub async fn review(&self, request: ReviewRequest) -> (bool, Vec<ReviewVerdict>) {
        let request = Arc::new(request);
        let futures = self.critics.iter().map(|critic| {
            let critic = Arc::clone(critic);
            let request = Arc::clone(&request);
            async move { critic.review(&request).await }
        });
        let reviews: Vec<ReviewVerdict> = futures::future::join_all(futures).await;
        let unanimous = !reviews.is_empty()
            && reviews.iter().all(|r| r.status == ReviewStatus::Approved);
        (unanimous, reviews)
    }
}
