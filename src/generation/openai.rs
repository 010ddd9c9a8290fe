/// OpenAI-compatible answer generator
///
/// Calls any OpenAI-compatible Chat Completions API. The base_url is configurable.
/// Requires an API key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_messages, ChatMessage, ChatTurn, GenerationError, Generator, SamplingParams};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    params: SamplingParams,
}

impl OpenAIGenerator {
    /// # Errors
    /// Returns `GenerationError::NotConfigured` if api_key is empty.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        system_prompt: String,
        params: SamplingParams,
    ) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "OpenAI API key is required when using the openai generation provider. \
                 Set RAGFUSE_GENERATION__OPENAI_API_KEY or generation.openai_api_key in ragfuse.toml"
                    .to_string(),
            ));
        }

        Ok(OpenAIGenerator {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            system_prompt,
            params,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, history: &[ChatTurn], query: &str, context: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(&self.system_prompt, history, query, context),
            max_tokens: self.params.max_new_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Generation(format!("Failed to parse API response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GenerationError::Generation("API returned no choices".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_new_rejects_empty_key() {
        let config = GenerationConfig::default();
        let result = OpenAIGenerator::new(
            config.openai_base_url.clone(),
            String::new(),
            config.openai_model.clone(),
            config.system_prompt.clone(),
            SamplingParams::from(&config),
        );
        assert!(matches!(result, Err(GenerationError::NotConfigured(_))));
    }
}
