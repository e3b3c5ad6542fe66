//! Text-completion backends.
//!
//! The pipeline only needs one capability: "given a prompt, or a list of
//! role-tagged turns, produce the next text". [`CompletionBackend`] captures
//! that; model identity and sampling parameters are configuration.
//!
//! - **[`OllamaBackend`]**: `POST /api/generate` and `POST /api/chat` on a
//!   local Ollama instance (default `http://127.0.0.1:11434`).
//! - **[`OpenAiBackend`]**: `POST /chat/completions` on an OpenAI-compatible
//!   API; single prompts are sent as a one-turn chat. Needs `OPENAI_API_KEY`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors and timeouts → retry
//! - backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! The caller's deadline (see `engine`) bounds the whole call including
//! retries.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendConfig, SamplingConfig};
use crate::error::CompletionError;
use crate::transcript::Turn;

/// Generated text plus the number of tokens the backend reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub tokens: u64,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model used for turn-list requests.
    fn model_name(&self) -> &str;

    /// Complete a single prompt.
    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion, CompletionError>;

    /// Produce the next assistant turn for `turns`.
    async fn chat(&self, system: &str, turns: &[Turn]) -> Result<Completion, CompletionError>;
}

/// Build the backend named by `config.provider`.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiBackend::new(config)?)),
        other => bail!("Unknown backend provider: {}", other),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout(timeout)
    } else {
        CompletionError::Connection(err.to_string())
    }
}

/// POST `body` to `url`, retrying transient failures, and return the JSON
/// response body.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    timeout: Duration,
) -> Result<serde_json::Value, CompletionError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| CompletionError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = CompletionError::Http {
                    status: status.as_u16(),
                    body: body_text,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(map_send_error(e, timeout));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CompletionError::Connection("no attempt made".to_string())))
}

// ============ Ollama ============

pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    enumerate_model: String,
    chat_sampling: SamplingConfig,
    generate_sampling: SamplingConfig,
    max_retries: u32,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:11434".to_string());

        Ok(Self {
            client: http_client(config.timeout())?,
            url: url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            enumerate_model: config.enumerate_model().to_string(),
            chat_sampling: config.chat,
            generate_sampling: config.generate,
            max_retries: config.max_retries,
            timeout: config.timeout(),
        })
    }
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Turn,
    #[serde(default)]
    eval_count: u64,
}

fn parse_ollama_generate(json: serde_json::Value) -> Result<Completion, CompletionError> {
    let resp: OllamaGenerateResponse = serde_json::from_value(json)
        .map_err(|e| CompletionError::InvalidResponse(format!("Ollama generate: {}", e)))?;
    Ok(Completion {
        text: resp.response,
        tokens: resp.eval_count,
    })
}

fn parse_ollama_chat(json: serde_json::Value) -> Result<Completion, CompletionError> {
    let resp: OllamaChatResponse = serde_json::from_value(json)
        .map_err(|e| CompletionError::InvalidResponse(format!("Ollama chat: {}", e)))?;
    Ok(Completion {
        text: resp.message.content,
        tokens: resp.eval_count,
    })
}

fn with_system(system: &str, turns: &[Turn]) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system.is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for turn in turns {
        messages.push(json!({ "role": turn.role, "content": turn.content }));
    }
    messages
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion, CompletionError> {
        let body = json!({
            "model": self.enumerate_model,
            "prompt": prompt,
            "system": system,
            "stream": false,
            "options": {
                "temperature": self.generate_sampling.temperature,
                "top_p": self.generate_sampling.top_p,
            },
        });
        let url = format!("{}/api/generate", self.url);
        let json = post_json(&self.client, &url, None, &body, self.max_retries, self.timeout).await?;
        parse_ollama_generate(json)
    }

    async fn chat(&self, system: &str, turns: &[Turn]) -> Result<Completion, CompletionError> {
        let body = json!({
            "model": self.model,
            "messages": with_system(system, turns),
            "stream": false,
            "options": {
                "temperature": self.chat_sampling.temperature,
                "top_p": self.chat_sampling.top_p,
            },
        });
        let url = format!("{}/api/chat", self.url);
        let json = post_json(&self.client, &url, None, &body, self.max_retries, self.timeout).await?;
        parse_ollama_chat(json)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    enumerate_model: String,
    chat_sampling: SamplingConfig,
    generate_sampling: SamplingConfig,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiBackend {
    /// # Errors
    ///
    /// Fails if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: http_client(config.timeout())?,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            enumerate_model: config.enumerate_model().to_string(),
            chat_sampling: config.chat,
            generate_sampling: config.generate,
            max_retries: config.max_retries,
            timeout: config.timeout(),
        })
    }

    async fn complete(
        &self,
        model: &str,
        sampling: SamplingConfig,
        system: &str,
        turns: &[Turn],
    ) -> Result<Completion, CompletionError> {
        let body = json!({
            "model": model,
            "messages": with_system(system, turns),
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
        });
        let url = format!("{}/chat/completions", self.url);
        let json = post_json(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.timeout,
        )
        .await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<Completion, CompletionError> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            CompletionError::InvalidResponse("OpenAI: missing choices[0].message.content".into())
        })?;
    let tokens = json
        .get("usage")
        .and_then(|u| u.get("completion_tokens"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0);
    Ok(Completion {
        text: text.to_string(),
        tokens,
    })
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<Completion, CompletionError> {
        let turns = [Turn::user(prompt)];
        self.complete(&self.enumerate_model, self.generate_sampling, system, &turns)
            .await
    }

    async fn chat(&self, system: &str, turns: &[Turn]) -> Result<Completion, CompletionError> {
        self.complete(&self.model, self.chat_sampling, system, turns)
            .await
    }
}
