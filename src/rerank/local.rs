/// Local cross-encoder reranker using fastembed
///
/// Scores (query, passage) pairs with an ONNX cross-encoder on the blocking pool.

use async_trait::async_trait;
use fastembed::{RerankInitOptions, TextRerank};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{apply_scores, RerankError, Reranker};
use crate::dense::DenseHit;
use crate::embedding::same_model_code;

pub struct LocalReranker {
    model: Arc<Mutex<TextRerank>>,
    name: String,
}

impl LocalReranker {
    /// Load `model_code` (e.g. "BAAI/bge-reranker-v2-m3") into `cache_dir`.
    pub async fn new(model_code: &str, cache_dir: &str) -> Result<Self, RerankError> {
        let info = TextRerank::list_supported_models()
            .into_iter()
            .find(|m| same_model_code(&m.model_code, model_code))
            .ok_or_else(|| RerankError::ModelInit(format!("Unsupported local reranker model: {}", model_code)))?;

        let name = info.model_code.clone();
        let cache_path = PathBuf::from(cache_dir);

        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| RerankError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            TextRerank::try_new(
                RerankInitOptions::new(info.model)
                    .with_cache_dir(cache_path)
                    .with_show_download_progress(false),
            )
            .map_err(|e| RerankError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::ModelInit(e.to_string()))??;

        tracing::info!(model = %name, "Local reranker loaded");

        Ok(LocalReranker {
            model: Arc::new(Mutex::new(model)),
            name,
        })
    }
}

#[async_trait]
impl Reranker for LocalReranker {
    async fn rerank(&self, query: &str, candidates: Vec<DenseHit>, top_n: usize) -> Result<Vec<DenseHit>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents: Vec<String> = candidates.iter().map(|c| c.passage.text.clone()).collect();

        let scores = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RerankError::Generation("reranker lock poisoned".to_string()))?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), docs, false, None)
                .map_err(|e| RerankError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::Generation(e.to_string()))??;

        let pairs: Vec<(usize, f32)> = scores.into_iter().map(|r| (r.index, r.score)).collect();
        Ok(apply_scores(candidates, &pairs, top_n))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
