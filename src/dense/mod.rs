/// Dense vector retrieval
///
/// `DenseSearch` is the contract for any vector index. `FlatVectorStore` is the
/// built-in exhaustive cosine index over precomputed passage embeddings, and
/// `DenseRetriever` queries the text store plus, when asked, the table store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::corpus::{Passage, PassageKind};
use crate::embedding::same_model_code;
use crate::errors::RagError;

pub const EMBEDDINGS_FILE: &str = "embeddings.json";

/// A passage returned by a dense index or a reranker, with that stage's score.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHit {
    pub passage: Passage,
    pub score: f32,
}

/// Nearest-neighbour search over passage embeddings.
#[async_trait]
pub trait DenseSearch: Send + Sync {
    /// Up to `k` passages, best first.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<DenseHit>, RagError>;

    /// Number of indexed passages.
    fn len(&self) -> usize;
}

/// On-disk layout of `embeddings.json`, row `i` belongs to payload `i`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingsFile {
    pub model: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingsFile {
    pub fn read(path: &Path) -> Result<Self, RagError> {
        let file = std::fs::File::open(path)
            .map_err(|e| RagError::Corpus(format!("Failed to open {}: {}", path.display(), e)))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| RagError::Corpus(format!("{}: {}", path.display(), e)))
    }

    pub fn write(&self, path: &Path) -> Result<(), RagError> {
        let file = std::fs::File::create(path)
            .map_err(|e| RagError::Corpus(format!("Failed to create {}: {}", path.display(), e)))?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Exhaustive cosine-similarity index held in memory.
#[derive(Debug)]
pub struct FlatVectorStore {
    passages: Vec<Passage>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    dim: usize,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl FlatVectorStore {
    /// Pair passages with their embeddings; lengths and dimensions must agree.
    pub fn new(passages: Vec<Passage>, vectors: Vec<Vec<f32>>) -> Result<Self, RagError> {
        if passages.len() != vectors.len() {
            return Err(RagError::Corpus(format!(
                "{} passages but {} embeddings",
                passages.len(),
                vectors.len()
            )));
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(RagError::Corpus(format!(
                "embedding {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dim
            )));
        }
        let norms = vectors.iter().map(|v| l2_norm(v)).collect();
        Ok(FlatVectorStore {
            passages,
            vectors,
            norms,
            dim,
        })
    }

    /// Pair already-loaded `passages` with the `embeddings.json` stored in `dir`.
    ///
    /// Vectors computed by a model other than `expected_model` are accepted with a
    /// warning; queries embedded by a different model rank poorly.
    pub fn load(dir: &Path, passages: Vec<Passage>, expected_model: &str) -> Result<Self, RagError> {
        let embeddings = EmbeddingsFile::read(&dir.join(EMBEDDINGS_FILE))?;
        if embeddings.dimension != embeddings.vectors.first().map(Vec::len).unwrap_or(embeddings.dimension) {
            return Err(RagError::Corpus(format!(
                "{}: declared dimension {} does not match stored vectors",
                dir.display(),
                embeddings.dimension
            )));
        }
        if !same_model_code(&embeddings.model, expected_model) {
            tracing::warn!(
                dir = %dir.display(),
                stored = %embeddings.model,
                configured = %expected_model,
                "Embeddings were computed with a different model"
            );
        }
        tracing::info!(
            dir = %dir.display(),
            passages = passages.len(),
            model = %embeddings.model,
            "Loaded vector store"
        );
        Self::new(passages, embeddings.vectors)
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Cosine similarity against every stored vector, best first, ties in store order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<DenseHit> {
        if query.len() != self.dim || self.passages.is_empty() {
            if !self.passages.is_empty() {
                tracing::warn!(expected = self.dim, got = query.len(), "Query embedding dimension mismatch");
            }
            return Vec::new();
        }
        let query_norm = l2_norm(query);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .zip(&self.norms)
            .enumerate()
            .filter(|&(_, (_, &norm))| norm > 0.0)
            .map(|(i, (v, &norm))| {
                let dot: f32 = v.iter().zip(query).map(|(a, b)| a * b).sum();
                (i, dot / (norm * query_norm))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, score)| DenseHit {
                passage: self.passages[i].clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl DenseSearch for FlatVectorStore {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<DenseHit>, RagError> {
        Ok(self.nearest(embedding, k))
    }

    fn len(&self) -> usize {
        self.passages.len()
    }
}

/// Queries the text store, and the table store when tables are enabled.
#[derive(Clone)]
pub struct DenseRetriever {
    text: Arc<dyn DenseSearch>,
    tables: Option<Arc<dyn DenseSearch>>,
}

impl DenseRetriever {
    pub fn new(text: Arc<dyn DenseSearch>, tables: Option<Arc<dyn DenseSearch>>) -> Self {
        DenseRetriever { text, tables }
    }

    pub fn has_tables(&self) -> bool {
        self.tables.is_some()
    }

    /// Merge text (and optionally table) hits by descending score, keep `top_k`.
    ///
    /// Table hits are tagged as tables whatever their payload said.
    pub async fn retrieve(&self, embedding: &[f32], top_k: usize, use_tables: bool) -> Result<Vec<DenseHit>, RagError> {
        let mut hits = self.text.search(embedding, top_k).await?;

        if use_tables {
            if let Some(tables) = &self.tables {
                let table_hits = tables.search(embedding, top_k).await?;
                hits.extend(table_hits.into_iter().map(|mut hit| {
                    hit.passage.kind = PassageKind::Table;
                    hit
                }));
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}
