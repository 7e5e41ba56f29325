//! Completion backends
//!
//! A backend takes a prompt and returns text. Both handlers talk to their
//! model through this one capability; they differ only in which backend
//! instance they hold. Groq and OpenRouter both speak the OpenAI
//! chat-completions wire format, served by [`ChatCompletionsBackend`].

pub mod chat_completions;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::Completion;

pub use chat_completions::ChatCompletionsBackend;

/// Trait that all completion backends implement
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name (e.g. "groq", "openrouter")
    fn name(&self) -> &str;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Send a single user prompt and return the model's text
    async fn complete(&self, prompt: &str) -> Result<Completion, BackendError>;
}
