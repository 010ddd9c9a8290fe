/// Answer generation trait and prompt assembly
///
/// A generator turns (history, question, context) into a natural-language answer.
/// Providers: Ollama (local, default, no API key) and OpenAI-compatible APIs.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::errors::RagError;

/// Errors that can occur during answer generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport or parse failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<GenerationError> for RagError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::NotConfigured(msg) => RagError::Config(msg),
            other => RagError::Collaborator(format!("generation: {}", other)),
        }
    }
}

/// One message of a prior conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A message as sent to a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Decoding settings shared by all providers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(config: &GenerationConfig) -> Self {
        SamplingParams {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `query` from `context`, conditioned on the prior `history`.
    async fn generate(&self, history: &[ChatTurn], query: &str, context: &str) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Final user message: the retrieved context followed by the question.
pub fn build_user_prompt(query: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {query}")
}

/// System prompt, then the history, then the context-bearing question.
///
/// History roles other than "user" are sent as "assistant".
pub fn build_messages(system_prompt: &str, history: &[ChatTurn], query: &str, context: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_prompt.to_string(),
    });
    for turn in history {
        let role = if turn.role == "user" { "user" } else { "assistant" };
        messages.push(ChatMessage {
            role: role.to_string(),
            content: turn.content.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: build_user_prompt(query, context),
    });
    messages
}

/// Keep the `limit` most recent turns.
pub fn trim_history(history: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(limit)..]
}
