//! LLM provider contract (§6).
//!
//! The provider is an external collaborator: it takes a prompt and returns
//! text. Everything in this crate that needs model output goes through the
//! [`LlmClient`] trait so tests can substitute a scripted mock, mirroring
//! how the teacher crate's `api::LlmClient` trait exists "to enable test
//! mocking" rather than to abstract over multiple real providers.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        model_name: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String>;
}

/// Strips Markdown code fences (```` ```json ... ``` ```` or plain ```` ``` ````)
/// from an LLM response. Every prompt template in §6 "must tolerate Markdown
/// fences", so this helper is shared by the critic coordinator, code
/// service, and action executor.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("rust"))
            .unwrap_or(rest);
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

/// Default HTTP-backed implementation, targeting an OpenAI-compatible chat
/// completions endpoint the way the teacher's `ApiClient` does.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn invoke(
        &self,
        prompt: &str,
        model_name: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "model": model_name,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("LLM response missing choices[0].message.content"))?;
        Ok(content.to_string())
    }
}
