/// Cross-encoder reranker served over HTTP
///
/// Speaks the text-embeddings-inference `/rerank` API:
/// `POST {query, texts}` → `[{index, score}]`. No API key required.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{apply_scores, RerankError, Reranker};
use crate::dense::DenseHit;

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    raw_scores: bool,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

pub struct TeiReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl TeiReranker {
    /// # Arguments
    /// * `base_url` - Server base URL (e.g., "http://localhost:8080")
    /// * `model` - Model name, informational only; the server decides what it runs
    pub fn new(base_url: String, model: String) -> Self {
        TeiReranker {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl Reranker for TeiReranker {
    async fn rerank(&self, query: &str, candidates: Vec<DenseHit>, top_n: usize) -> Result<Vec<DenseHit>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query,
            texts: candidates.iter().map(|c| c.passage.text.as_str()).collect(),
            raw_scores: false,
        };

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
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

        let scores: Vec<RerankScore> = response
            .json()
            .await
            .map_err(|e| RerankError::Generation(format!("Failed to parse rerank response: {}", e)))?;

        let pairs: Vec<(usize, f32)> = scores.into_iter().map(|s| (s.index, s.score)).collect();
        Ok(apply_scores(candidates, &pairs, top_n))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
