//! Chat-completion skill: sends the user message to an OpenAI-compatible endpoint
//! (OpenRouter by default), retrying with exponential backoff.

use parley_core::{AgentSkill, CoreConfig, LlmConfig, RetryPolicy, SessionContext, CHAT_SKILL};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("response (status {status}) has no completion text: {body}")]
    MissingContent {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<CompletionError>,
    },
}

/// Truncates a response body for log and error messages.
fn preview(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        format!("{}…", body.chars().take(MAX).collect::<String>())
    }
}

/// OpenRouter chat completion with a retry policy.
pub struct ChatCompletion {
    client: reqwest::Client,
    config: LlmConfig,
    policy: RetryPolicy,
}

impl ChatCompletion {
    pub fn new(client: reqwest::Client, config: LlmConfig, policy: RetryPolicy) -> Self {
        Self {
            client,
            config,
            policy,
        }
    }

    /// Uses the `llm` and `retry` sections of the core config.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(reqwest::Client::new(), config.llm.clone(), config.retry.policy())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Failure sentence returned to the user once every attempt has failed.
    pub fn failure_text(attempts: u32) -> String {
        format!("OpenRouter API failed after {} attempts.", attempts)
    }

    async fn attempt(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": prompt }
            ]
        });
        let mut request = self
            .client
            .post(&self.config.api_url)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let json: serde_json::Value = response.json().await?;
            Ok::<_, CompletionError>((status, json))
        };
        let (status, json) = tokio::time::timeout(self.policy.attempt_timeout, exchange)
            .await
            .map_err(|_| CompletionError::Timeout(self.policy.attempt_timeout))??;

        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CompletionError::MissingContent {
                status,
                body: preview(&json.to_string()),
            })
    }

    /// Completion text, retrying failed attempts per the policy.
    pub async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= max => {
                    return Err(CompletionError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    let delay = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        target: "parley::skills",
                        attempt,
                        max_attempts = max,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chat completion attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Completion text, or the failure sentence. Returns the text and whether it succeeded.
    pub async fn generate_text(&self, prompt: &str) -> (String, bool) {
        match self.complete(prompt).await {
            Ok(text) => (text, true),
            Err(CompletionError::Exhausted { attempts, last }) => {
                tracing::warn!(target: "parley::skills", attempts, error = %last, "Chat completion gave up");
                (Self::failure_text(attempts), false)
            }
            Err(e) => {
                tracing::warn!(target: "parley::skills", error = %e, "Chat completion failed");
                (Self::failure_text(self.policy.max_attempts), false)
            }
        }
    }
}

#[async_trait::async_trait]
impl AgentSkill for ChatCompletion {
    fn name(&self) -> &str {
        CHAT_SKILL
    }

    async fn execute(
        &self,
        _ctx: &SessionContext,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>> {
        let prompt = payload
            .as_ref()
            .and_then(|p| p.get("prompt"))
            .and_then(|v| v.as_str())
            .ok_or("ChatCompletion requires payload: { prompt: string }")?
            .to_string();

        let (generated, ok) = self.generate_text(&prompt).await;
        Ok(serde_json::json!({
            "status": if ok { "ok" } else { "failed" },
            "skill": CHAT_SKILL,
            "model": self.config.model,
            "generated": generated,
            "prompt_preview_len": prompt.len()
        }))
    }
}
