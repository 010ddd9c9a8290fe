/// Ollama answer generator
///
/// Calls the Ollama /api/chat endpoint without streaming. No API key required.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_messages, ChatMessage, ChatTurn, GenerationError, Generator, SamplingParams};

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
    params: SamplingParams,
}

impl OllamaGenerator {
    /// # Arguments
    /// * `base_url` - Ollama server base URL (e.g., "http://localhost:11434")
    /// * `model` - Model name (e.g., "qwen3:0.6b")
    pub fn new(base_url: String, model: String, system_prompt: String, params: SamplingParams) -> Self {
        OllamaGenerator {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            system_prompt,
            params,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, history: &[ChatTurn], query: &str, context: &str) -> Result<String, GenerationError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: build_messages(&self.system_prompt, history, query, context),
            stream: false,
            options: OllamaOptions {
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                num_predict: self.params.max_new_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationError::Api { status, message: body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Generation(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(chat_response.message.content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
