/// Ollama listwise reranker
///
/// Asks a chat model served by Ollama to order the candidates by relevance, using
/// /api/chat with a JSON output schema. Candidates the model leaves out are kept
/// after the ones it ranked, in their dense order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{apply_scores, RerankError, Reranker};
use crate::dense::DenseHit;

// Passages are truncated in the prompt to keep small models within context.
const PROMPT_PASSAGE_CHARS: usize = 1200;

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    format: serde_json::Value,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct RerankOutput {
    #[serde(default)]
    ranked_ids: Vec<String>,
}

/// Build the listwise ranking prompt. Candidates are addressed as `c0`, `c1`, ...
pub fn build_rerank_prompt(query: &str, candidates: &[DenseHit]) -> String {
    let listing: Vec<serde_json::Value> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            serde_json::json!({
                "id": format!("c{}", i),
                "content": c.passage.text.chars().take(PROMPT_PASSAGE_CHARS).collect::<String>(),
            })
        })
        .collect();
    format!(
        "Given the question and the candidate passages below, \
         order the passages from most to least useful for answering the question.\n\n\
         Output only valid JSON matching the provided schema: \
         {{\"ranked_ids\": [\"c0\", \"c1\", ...]}}. Do not add commentary.\n\n\
         Question: {query}\n\n\
         Candidates:\n{}",
        serde_json::Value::Array(listing)
    )
}

pub fn rerank_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "ranked_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Candidate IDs ordered from most to least relevant"
            }
        },
        "required": ["ranked_ids"]
    })
}

/// Turn the model's ordering into per-candidate scores in (0, 1].
///
/// Unknown and repeated ids are ignored; unranked candidates follow the ranked ones.
pub(crate) fn scores_from_ranking(ranked_ids: &[String], n: usize) -> Vec<(usize, f32)> {
    let mut seen = vec![false; n];
    let mut order: Vec<usize> = Vec::with_capacity(n);
    for id in ranked_ids {
        let index = id
            .trim()
            .strip_prefix('c')
            .and_then(|rest| rest.parse::<usize>().ok());
        if let Some(i) = index {
            if i < n && !seen[i] {
                seen[i] = true;
                order.push(i);
            }
        }
    }
    order.extend((0..n).filter(|&i| !seen[i]));

    order
        .into_iter()
        .enumerate()
        .map(|(rank, i)| (i, (n - rank) as f32 / n as f32))
        .collect()
}

pub struct OllamaReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaReranker {
    /// # Arguments
    /// * `base_url` - Ollama server base URL (e.g., "http://localhost:11434")
    /// * `model` - Model name (e.g., "qwen3:0.6b")
    pub fn new(base_url: String, model: String) -> Self {
        OllamaReranker {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl Reranker for OllamaReranker {
    async fn rerank(&self, query: &str, candidates: Vec<DenseHit>, top_n: usize) -> Result<Vec<DenseHit>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: build_rerank_prompt(query, &candidates),
            }],
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
            format: rerank_schema(),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RerankError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RerankError::Api { status, message: body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Generation(format!("Failed to parse Ollama response: {}", e)))?;

        let output: RerankOutput = serde_json::from_str(&chat_response.message.content).map_err(|e| {
            RerankError::Generation(format!(
                "Failed to parse rerank JSON from model output: {} (content: {})",
                e, chat_response.message.content
            ))
        })?;

        let scores = scores_from_ranking(&output.ranked_ids, candidates.len());
        Ok(apply_scores(candidates, &scores, top_n))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
