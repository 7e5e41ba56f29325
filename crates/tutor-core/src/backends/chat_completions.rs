//! OpenAI-compatible chat-completions backend (Groq, OpenRouter, Together, ...)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendError;
use crate::types::Completion;

use super::Backend;

/// Upper bound on the error body echoed back in [`BackendError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Backend for any endpoint exposing `POST {base_url}/chat/completions`
pub struct ChatCompletionsBackend {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl std::fmt::Debug for ChatCompletionsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatCompletionsBackend {
    /// Create a backend.
    ///
    /// - `name`: label used in logs and errors (e.g. "groq")
    /// - `base_url`: the endpoint root (e.g. `https://api.groq.com/openai/v1`)
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let name = name.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config {
                backend: name.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            name,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: None,
            timeout,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                backend: self.name.clone(),
                timeout: self.timeout,
            }
        } else if err.is_builder() {
            BackendError::Config {
                backend: self.name.clone(),
                message: err.to_string(),
            }
        } else {
            BackendError::Transport {
                backend: self.name.clone(),
                message: err.to_string(),
            }
        }
    }

    /// Pull the first choice's text out of a decoded response
    fn extract_text(&self, resp: ChatResponse) -> Result<String, BackendError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed {
                backend: self.name.clone(),
                message: "response had no choices".to_string(),
            })?;

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(BackendError::Malformed {
                backend: self.name.clone(),
                message: "response choice had no text content".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Backend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, BackendError> {
        if self.api_key.trim().is_empty() {
            return Err(BackendError::Config {
                backend: self.name.clone(),
                message: "API key is not set".to_string(),
            });
        }

        debug!(
            "{} request: model={}, prompt_chars={}",
            self.name,
            self.model,
            prompt.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(BackendError::Status {
                backend: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        let decoded: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed {
                backend: self.name.clone(),
                message: format!("invalid JSON: {}", e),
            })?;

        debug!(
            "{} response: status={}, choices={}",
            self.name,
            status,
            decoded.choices.len()
        );

        let text = self.extract_text(decoded)?;
        Ok(Completion {
            text,
            model: self.model.clone(),
        })
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
