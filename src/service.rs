/// Retrieval-augmented answering service
///
/// `RagService` is built once at startup and shared behind an `Arc`. Everything it
/// holds is immutable: the corpus, the lexical index, the vector stores and the
/// collaborator handles. A query runs the dense leg (embed → search → rerank) and the
/// lexical leg, fuses them, and asks the generator for an answer.
///
/// Failures of external collaborators never escape `ask`; they are logged and turned
/// into a fixed degraded answer with no sources.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, LexicalConfig};
use crate::corpus::{Corpus, LoadedPayloads, PassageKind};
use crate::dense::{DenseHit, DenseRetriever, DenseSearch, FlatVectorStore};
use crate::embedding::EmbeddingProvider;
use crate::errors::RagError;
use crate::generation::{trim_history, ChatTurn, Generator};
use crate::lexical::{IndexStats, LexicalIndex};
use crate::rerank::Reranker;
use crate::search::{fuse_context, FinalPassageSet, FusionPolicy, LexicalHit, SourceDocument};

/// The external models the service calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<dyn Reranker>,
    pub generator: Arc<dyn Generator>,
}

/// Corpus plus the lexical index built over it; positions line up.
#[derive(Debug)]
pub struct LexicalSearch {
    corpus: Corpus,
    index: LexicalIndex,
}

impl LexicalSearch {
    pub fn build(corpus: Corpus, config: &LexicalConfig) -> Result<Self, RagError> {
        let index = LexicalIndex::build(&corpus, config)?;
        Ok(LexicalSearch { corpus, index })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &LexicalIndex {
        &self.index
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            text_passages: self.corpus.count_kind(PassageKind::Text),
            table_passages: self.corpus.count_kind(PassageKind::Table),
            index: self.index.stats(),
        }
    }

    /// Two-stage search, resolved to passages.
    pub fn search(&self, query: &str, limit_stage1: usize, limit_stage2: usize) -> Vec<LexicalHit> {
        self.index
            .search(query, limit_stage1, limit_stage2)
            .into_iter()
            .filter_map(|(position, score)| {
                self.corpus.get(position).map(|passage| LexicalHit {
                    position,
                    score,
                    passage: passage.clone(),
                })
            })
            .collect()
    }
}

/// Response to a question, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub source_documents: Vec<SourceDocument>,
}

impl Answer {
    fn without_sources(answer: &str) -> Self {
        Answer {
            answer: answer.to_string(),
            source_documents: Vec::new(),
        }
    }
}

/// Corpus and index figures for `ragfuse stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub text_passages: usize,
    pub table_passages: usize,
    pub index: IndexStats,
}

pub struct RagService {
    config: Config,
    lexical: Arc<LexicalSearch>,
    dense: DenseRetriever,
    collaborators: Collaborators,
}

impl RagService {
    /// Assemble a service from prepared parts.
    ///
    /// # Errors
    /// `RagError::Config` if the index was built with a different n-gram size than
    /// the configuration asks for.
    pub fn new(
        config: Config,
        lexical: LexicalSearch,
        dense: DenseRetriever,
        collaborators: Collaborators,
    ) -> Result<Self, RagError> {
        config.lexical.validate()?;
        config.retrieval.validate()?;
        lexical.index.ensure_compatible(&config.lexical)?;
        Ok(RagService {
            config,
            lexical: Arc::new(lexical),
            dense,
            collaborators,
        })
    }

    /// Load payloads and embeddings from the configured directories and build the
    /// lexical index. Must succeed before any query is served.
    pub async fn initialize(config: Config, collaborators: Collaborators) -> Result<Self, RagError> {
        let started = Instant::now();
        let payloads = LoadedPayloads::load(&config.corpus)?;
        let model = collaborators.embedder.model_name().to_string();

        let text_store = FlatVectorStore::load(&config.corpus.text_dir, payloads.text.clone(), &model)?;
        let table_store = if payloads.tables.is_empty() {
            None
        } else {
            match FlatVectorStore::load(&config.corpus.table_dir, payloads.tables.clone(), &model) {
                Ok(store) => Some(Arc::new(store) as Arc<dyn DenseSearch>),
                Err(e) => {
                    tracing::warn!(error = %e, "Table vector store unavailable, dense search covers text only");
                    None
                }
            }
        };
        let dense = DenseRetriever::new(Arc::new(text_store), table_store);

        let lexical_config = config.lexical.clone();
        let lexical = tokio::task::spawn_blocking(move || {
            let corpus = payloads.corpus()?;
            LexicalSearch::build(corpus, &lexical_config)
        })
        .await??;

        tracing::info!(
            passages = lexical.corpus().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "RAG service initialized"
        );
        Self::new(config, lexical, dense, collaborators)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lexical(&self) -> &LexicalSearch {
        &self.lexical
    }

    /// Whether dense search can reach table passages.
    pub fn has_dense_tables(&self) -> bool {
        self.dense.has_tables()
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.service.call_timeout_secs)
    }

    /// Run one collaborator call under the configured deadline.
    async fn with_deadline<T, E, F>(&self, what: &str, call: F) -> Result<T, RagError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<RagError>,
    {
        match tokio::time::timeout(self.call_timeout(), call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(RagError::Timeout(format!(
                "{} exceeded {}s",
                what, self.config.service.call_timeout_secs
            ))),
        }
    }

    /// Lexical leg on the blocking pool, with the configured stage limits.
    pub async fn lexical_search(&self, query: &str) -> Result<Vec<LexicalHit>, RagError> {
        let lexical = Arc::clone(&self.lexical);
        let query = query.to_string();
        let (l1, l2) = (self.config.lexical.limit_stage1, self.config.lexical.limit_stage2);
        Ok(tokio::task::spawn_blocking(move || lexical.search(&query, l1, l2)).await?)
    }

    /// Dense leg: embed, search `top_dense`, rerank to `top_final`.
    pub async fn dense_search(&self, query: &str, use_tables: bool) -> Result<Vec<DenseHit>, RagError> {
        let retrieval = &self.config.retrieval;
        let embedding = self
            .with_deadline("embed", self.collaborators.embedder.embed(query))
            .await?;
        let candidates = self
            .with_deadline(
                "dense search",
                self.dense.retrieve(&embedding, retrieval.top_dense, use_tables),
            )
            .await?;
        let candidate_count = candidates.len();
        let reranked = self
            .with_deadline(
                "rerank",
                self.collaborators.reranker.rerank(query, candidates, retrieval.top_final),
            )
            .await?;
        tracing::debug!(candidates = candidate_count, kept = reranked.len(), "Dense retrieval complete");
        Ok(reranked)
    }

    /// Both legs, fused.
    pub async fn retrieve(&self, query: &str, use_tables: bool) -> Result<FinalPassageSet, RagError> {
        let (dense, lexical) = tokio::join!(self.dense_search(query, use_tables), self.lexical_search(query));
        let policy = FusionPolicy::from_config(&self.config.retrieval, use_tables);
        Ok(fuse_context(&dense?, &lexical?, &policy))
    }

    /// Answer `query` given the prior conversation.
    ///
    /// Never fails: an empty fused set yields the "no information" answer and any
    /// error yields the failure answer, both without sources.
    pub async fn ask(&self, history: &[ChatTurn], query: &str, use_tables: bool) -> Answer {
        let started = Instant::now();
        match self.try_ask(history, query, use_tables).await {
            Ok(answer) => {
                tracing::info!(
                    sources = answer.source_documents.len(),
                    use_tables,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Answered query"
                );
                answer
            }
            Err(e) => {
                if e.is_collaborator_failure() {
                    tracing::warn!(error = %e, "Collaborator failed, returning degraded answer");
                } else {
                    tracing::error!(error = %e, "Query failed, returning degraded answer");
                }
                Answer::without_sources(&self.config.service.failure_answer)
            }
        }
    }

    async fn try_ask(&self, history: &[ChatTurn], query: &str, use_tables: bool) -> Result<Answer, RagError> {
        let history = trim_history(history, self.config.service.history_limit);
        let set = self.retrieve(query, use_tables).await?;
        if set.is_empty() {
            tracing::info!("No passages found for query");
            return Ok(Answer::without_sources(&self.config.service.no_information_answer));
        }

        let answer = self
            .with_deadline(
                "generate",
                self.collaborators.generator.generate(history, query, &set.context),
            )
            .await?;

        Ok(Answer {
            answer,
            source_documents: set.sources(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Passage;
    use crate::embedding::EmbeddingError;
    use crate::generation::GenerationError;
    use crate::rerank::PassthroughReranker;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds "кот" queries to [1, 0] and everything else to [0, 1].
    struct FakeEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::Generation("model offline".into()));
            }
            Ok(if text.contains("кот") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }

        fn model_name(&self) -> &str {
            "fake"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Records what it was asked and echoes the context back.
    #[derive(Default)]
    struct RecordingGenerator {
        calls: Mutex<Vec<(usize, String, String)>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, history: &[ChatTurn], query: &str, context: &str) -> Result<String, GenerationError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((history.len(), query.to_string(), context.to_string()));
            Ok(format!("answer from: {}", context))
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new("t0", "кот сидит на окне", "cats.pdf", PassageKind::Text),
            Passage::new("t1", "собака бежит по двору", "dogs.pdf", PassageKind::Text),
            Passage::new("t2", "кот спит", "cats2.pdf", PassageKind::Text),
        ]
    }

    fn service_with(generator: Arc<RecordingGenerator>, fail_embed: bool, config: Config) -> RagService {
        let passages = corpus();
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.2, 0.9]];
        let store: Arc<dyn DenseSearch> = Arc::new(FlatVectorStore::new(passages.clone(), vectors).unwrap());
        let lexical = LexicalSearch::build(Corpus::new(passages).unwrap(), &config.lexical).unwrap();
        RagService::new(
            config,
            lexical,
            DenseRetriever::new(store, None),
            Collaborators {
                embedder: Arc::new(FakeEmbedder { fail: fail_embed }),
                reranker: Arc::new(PassthroughReranker),
                generator,
            },
        )
        .unwrap()
    }

    fn single_dense_config() -> Config {
        let mut config = Config::default();
        config.retrieval.top_final = 1;
        config
    }

    #[tokio::test]
    async fn test_ask_fuses_dense_and_lexical() {
        let generator = Arc::new(RecordingGenerator::default());
        let service = service_with(generator.clone(), false, single_dense_config());

        let answer = service.ask(&[], "кот", false).await;
        let files: Vec<&str> = answer.source_documents.iter().map(|s| s.filepath.as_str()).collect();
        // Dense top is t0; the lexical leg adds the other cat passage.
        assert_eq!(files, vec!["cats.pdf", "cats2.pdf"]);
        assert_eq!(answer.answer, "answer from: кот сидит на окне\n\nкот спит");

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "кот");
    }

    #[tokio::test]
    async fn test_ask_trims_history() {
        let generator = Arc::new(RecordingGenerator::default());
        let mut config = single_dense_config();
        config.service.history_limit = 3;
        let service = service_with(generator.clone(), false, config);

        let history: Vec<ChatTurn> = (0..10).map(|i| ChatTurn::user(format!("q{}", i))).collect();
        service.ask(&history, "кот", false).await;
        assert_eq!(generator.calls.lock().unwrap()[0].0, 3);
    }

    #[tokio::test]
    async fn test_collaborator_failure_degrades() {
        let generator = Arc::new(RecordingGenerator::default());
        let service = service_with(generator.clone(), true, Config::default());

        let answer = service.ask(&[], "кот", false).await;
        assert_eq!(answer.answer, Config::default().service.failure_answer);
        assert!(answer.source_documents.is_empty());
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_timeout_degrades() {
        let generator = Arc::new(RecordingGenerator {
            calls: Mutex::new(Vec::new()),
            delay: Some(Duration::from_secs(5)),
        });
        let mut config = Config::default();
        config.service.call_timeout_secs = 0;
        let service = service_with(generator, false, config);

        let answer = service.ask(&[], "кот", false).await;
        assert_eq!(answer.answer, Config::default().service.failure_answer);
        assert!(answer.source_documents.is_empty());
    }

    #[tokio::test]
    async fn test_no_information_when_nothing_found() {
        let generator = Arc::new(RecordingGenerator::default());
        let passages: Vec<Passage> = Vec::new();
        let config = Config::default();
        let store: Arc<dyn DenseSearch> = Arc::new(FlatVectorStore::new(passages.clone(), Vec::new()).unwrap());
        let service = RagService::new(
            config.clone(),
            LexicalSearch::build(Corpus::new(passages).unwrap(), &config.lexical).unwrap(),
            DenseRetriever::new(store, None),
            Collaborators {
                embedder: Arc::new(FakeEmbedder { fail: false }),
                reranker: Arc::new(PassthroughReranker),
                generator: generator.clone(),
            },
        )
        .unwrap();

        let answer = service.ask(&[], "кот", false).await;
        assert_eq!(answer.answer, config.service.no_information_answer);
        assert!(answer.source_documents.is_empty());
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lexical_search_resolves_passages() {
        let service = service_with(Arc::new(RecordingGenerator::default()), false, Config::default());
        let hits = service.lexical_search("кот").await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.passage.id.as_str()).collect();
        assert_eq!(hits.len(), 2);
        assert!(ids.contains(&"t0") && ids.contains(&"t2"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_new_rejects_mismatched_ngram_size() {
        let config = Config::default();
        let passages = corpus();
        let lexical = LexicalSearch::build(Corpus::new(passages.clone()).unwrap(), &config.lexical).unwrap();
        let mut other = config.clone();
        other.lexical.ngram_size = 4;
        let store: Arc<dyn DenseSearch> = Arc::new(
            FlatVectorStore::new(passages, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]).unwrap(),
        );
        let result = RagService::new(
            other,
            lexical,
            DenseRetriever::new(store, None),
            Collaborators {
                embedder: Arc::new(FakeEmbedder { fail: false }),
                reranker: Arc::new(PassthroughReranker),
                generator: Arc::new(RecordingGenerator::default()),
            },
        );
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_stats_counts_kinds() {
        let service = service_with(Arc::new(RecordingGenerator::default()), false, Config::default());
        let stats = service.lexical().stats();
        assert_eq!(stats.text_passages, 3);
        assert_eq!(stats.table_passages, 0);
        assert!(!service.has_dense_tables());
        assert_eq!(stats.index.documents, 3);
    }
}
