/// Reranker trait and supporting types
///
/// A reranker scores (query, passage) pairs jointly and keeps the best `top_n`.
/// Providers: a local fastembed cross-encoder (default), a text-embeddings-inference
/// HTTP server, an Ollama chat model, or `none` which keeps the dense order.

pub mod local;
pub mod ollama;
pub mod tei;

use async_trait::async_trait;
use thiserror::Error;

use crate::dense::DenseHit;
use crate::errors::RagError;

/// Errors that can occur during reranking.
#[derive(Debug, Error)]
pub enum RerankError {
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// Inference, transport or parse failure
    #[error("Rerank error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<RerankError> for RagError {
    fn from(e: RerankError) -> Self {
        match e {
            RerankError::NotConfigured(msg) => RagError::Config(msg),
            other => RagError::Collaborator(format!("rerank: {}", other)),
        }
    }
}

/// Core trait for pairwise relevance reranking.
///
/// Implementations must be Send + Sync to support use in async contexts
/// and across thread boundaries (e.g., Arc<dyn Reranker>).
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return at most `top_n` candidates, most relevant first, each carrying its
    /// relevance score. An empty candidate list yields an empty result.
    async fn rerank(&self, query: &str, candidates: Vec<DenseHit>, top_n: usize) -> Result<Vec<DenseHit>, RerankError>;

    /// Return the model name identifier used by this provider.
    fn model_name(&self) -> &str;
}

/// Reorder `candidates` by `(candidate index, score)` pairs, best first.
///
/// Candidates without a score are dropped; equal scores keep the incoming order.
pub(crate) fn apply_scores(candidates: Vec<DenseHit>, scores: &[(usize, f32)], top_n: usize) -> Vec<DenseHit> {
    let mut slots: Vec<Option<DenseHit>> = candidates.into_iter().map(Some).collect();
    let mut ordered: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .filter(|(index, _)| *index < slots.len())
        .collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut out = Vec::with_capacity(top_n.min(ordered.len()));
    for (index, score) in ordered {
        if out.len() == top_n {
            break;
        }
        if let Some(mut hit) = slots[index].take() {
            hit.score = score;
            out.push(hit);
        }
    }
    out
}

/// Keeps the dense ranking as-is; used when no reranker is configured.
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, mut candidates: Vec<DenseHit>, top_n: usize) -> Result<Vec<DenseHit>, RerankError> {
        candidates.truncate(top_n);
        Ok(candidates)
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Passage, PassageKind};

    fn hits(ids: &[&str]) -> Vec<DenseHit> {
        ids.iter()
            .map(|id| DenseHit {
                passage: Passage::new(*id, *id, "s", PassageKind::Text),
                score: 0.0,
            })
            .collect()
    }

    fn ids(hits: &[DenseHit]) -> Vec<&str> {
        hits.iter().map(|h| h.passage.id.as_str()).collect()
    }

    #[test]
    fn test_apply_scores_orders_and_truncates() {
        let out = apply_scores(hits(&["a", "b", "c"]), &[(0, 0.1), (1, 0.9), (2, 0.5)], 2);
        assert_eq!(ids(&out), vec!["b", "c"]);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn test_apply_scores_ignores_bad_and_duplicate_indices() {
        let out = apply_scores(hits(&["a", "b"]), &[(7, 1.0), (1, 0.2), (1, 0.3)], 5);
        assert_eq!(ids(&out), vec!["b"]);
        assert_eq!(out[0].score, 0.3);
    }

    #[test]
    fn test_apply_scores_ties_keep_incoming_order() {
        let out = apply_scores(hits(&["a", "b"]), &[(1, 0.5), (0, 0.5)], 2);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_passthrough_truncates() {
        let out = PassthroughReranker.rerank("q", hits(&["a", "b", "c"]), 2).await.unwrap();
        assert_eq!(ids(&out), vec!["a", "b"]);
        assert!(PassthroughReranker.rerank("q", Vec::new(), 2).await.unwrap().is_empty());
    }
}
