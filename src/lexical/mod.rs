/// Two-stage lexical search over a passage corpus.
///
/// Build once, query many times:
///   corpus → Normalizer → {character n-grams → TF-IDF, words → BM25}
///   query  → TF-IDF prefilter (limit_stage1, threshold) → BM25 on survivors
///          (limit_stage2) → geometric mean → deadband sort
///
/// A built `LexicalIndex` is immutable; share it behind an `Arc` and query it from
/// any number of threads.

pub mod bm25;
pub mod fusion;
pub mod ngram;
pub mod normalize;
pub mod tfidf;

pub use bm25::{Bm25Params, Bm25Ranker};
pub use fusion::{fuse_stages, geometric_mean, ScoredCandidate};
pub use normalize::Normalizer;
pub use tfidf::TfIdfPrefilter;

use serde::Serialize;
use std::time::Instant;

use crate::config::LexicalConfig;
use crate::corpus::Corpus;
use crate::errors::RagError;

use ngram::{to_ngrams, to_words};

/// Size figures for a built index, as reported by `ragfuse stats`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub empty_documents: usize,
    pub ngram_size: usize,
    pub ngram_vocabulary: usize,
    pub word_vocabulary: usize,
    pub avg_doc_len: f64,
}

#[derive(Debug)]
pub struct LexicalIndex {
    config: LexicalConfig,
    normalizer: Normalizer,
    tfidf: TfIdfPrefilter,
    bm25: Bm25Ranker,
    len: usize,
}

impl LexicalIndex {
    /// Build both stage indexes over every passage of `corpus`.
    pub fn build(corpus: &Corpus, config: &LexicalConfig) -> Result<Self, RagError> {
        let texts: Vec<&str> = corpus.passages().iter().map(|p| p.text.as_str()).collect();
        Self::build_from_texts(&texts, config)
    }

    /// Build over raw texts; position `i` of the index is `texts[i]`.
    pub fn build_from_texts<S: AsRef<str>>(texts: &[S], config: &LexicalConfig) -> Result<Self, RagError> {
        config.validate()?;
        let started = Instant::now();
        let normalizer = Normalizer::default();

        let normalized: Vec<String> = texts.iter().map(|t| normalizer.normalize(t.as_ref())).collect();
        let doc_ngrams = normalized.iter().map(|d| to_ngrams(d, config.ngram_size)).collect();
        let doc_words = normalized.iter().map(|d| to_words(d)).collect();

        let tfidf = TfIdfPrefilter::fit(doc_ngrams);
        let bm25 = Bm25Ranker::fit(doc_words, Bm25Params::from(config));

        let index = LexicalIndex {
            config: config.clone(),
            normalizer,
            tfidf,
            bm25,
            len: texts.len(),
        };

        tracing::info!(
            documents = index.len,
            ngram_size = config.ngram_size,
            ngram_vocabulary = index.tfidf.vocabulary_size(),
            word_vocabulary = index.bm25.vocabulary_size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Lexical index built"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ngram_size(&self) -> usize {
        self.config.ngram_size
    }

    pub fn config(&self) -> &LexicalConfig {
        &self.config
    }

    /// Fail fast when a caller expects a different n-gram size than the index was built with.
    pub fn ensure_compatible(&self, config: &LexicalConfig) -> Result<(), RagError> {
        if config.ngram_size != self.config.ngram_size {
            return Err(RagError::Config(format!(
                "lexical index was built with ngram_size={} but ngram_size={} was requested",
                self.config.ngram_size, config.ngram_size
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.len,
            empty_documents: self.bm25.empty_documents(),
            ngram_size: self.config.ngram_size,
            ngram_vocabulary: self.tfidf.vocabulary_size(),
            word_vocabulary: self.bm25.vocabulary_size(),
            avg_doc_len: self.bm25.avg_doc_len(),
        }
    }

    /// Stage 1 alone: TF-IDF over character n-grams of the normalized query.
    pub fn prefilter(&self, query: &str, limit: usize) -> Vec<(usize, f64)> {
        let normalized = self.normalizer.normalize(query);
        self.tfidf.search(&to_ngrams(&normalized, self.config.ngram_size), limit)
    }

    /// Stage 2 alone: BM25 over the whole corpus or the `only` positions.
    pub fn bm25(&self, query: &str, limit: usize, only: Option<&[usize]>) -> Vec<(usize, f64)> {
        let normalized = self.normalizer.normalize(query);
        self.bm25.search(&to_words(&normalized), limit, only)
    }

    /// Full two-stage search, keeping per-stage scores.
    pub fn search_scored(&self, query: &str, limit_stage1: usize, limit_stage2: usize) -> Vec<ScoredCandidate> {
        let normalized = self.normalizer.normalize(query);

        let stage1: Vec<(usize, f64)> = self
            .tfidf
            .search(&to_ngrams(&normalized, self.config.ngram_size), limit_stage1)
            .into_iter()
            .filter(|&(_, score)| score > self.config.stage1_threshold)
            .collect();

        let survivors: Vec<usize> = stage1.iter().map(|&(position, _)| position).collect();
        let stage2 = self.bm25.search(&to_words(&normalized), limit_stage2, Some(&survivors));
        let fused = fuse_stages(&stage1, &stage2);

        tracing::debug!(
            survivors = survivors.len(),
            reranked = stage2.len(),
            returned = fused.len(),
            "Lexical search complete"
        );
        fused
    }

    /// Full two-stage search: `(position, fused score)` best first.
    pub fn search(&self, query: &str, limit_stage1: usize, limit_stage2: usize) -> Vec<(usize, f64)> {
        self.search_scored(query, limit_stage1, limit_stage2)
            .into_iter()
            .map(|c| (c.position, c.fused))
            .collect()
    }

    /// `search` with the configured stage limits.
    pub fn search_default(&self, query: &str) -> Vec<(usize, f64)> {
        self.search(query, self.config.limit_stage1, self.config.limit_stage2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATS: [&str; 3] = ["кот сидит на окне", "собака бежит по двору", "кот спит"];

    fn sample_corpus() -> Vec<&'static str> {
        vec![
            "Температура закалки стали составляет 850 градусов",
            "Сварочный аппарат требует заземления перед работой",
            "Отпуск стали проводится после закалки",
            "Контроль качества сварных швов выполняется визуально",
            "Химический состав сплава определяет твердость",
            "Инструкция по охране труда для токаря",
        ]
    }

    fn index(texts: &[&str]) -> LexicalIndex {
        LexicalIndex::build_from_texts(texts, &LexicalConfig::default()).unwrap()
    }

    #[test]
    fn test_prefilter_scenario_ranks_cat_documents_first() {
        let index = index(&CATS);
        let results = index.prefilter("кот", 100);
        let ranked: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[2], 1);
    }

    #[test]
    fn test_search_returns_only_matching_documents() {
        let index = index(&CATS);
        let results = index.search("кот", 100, 5);
        let mut positions: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn test_empty_document_excluded_from_both_stages() {
        let index = index(&["", "кот спит", "собака"]);
        assert!(index.prefilter("кот", 10).iter().all(|(p, _)| *p != 0));
        assert!(index.bm25("кот", 10, None).iter().all(|(p, _)| *p != 0));
        assert!(index.search("кот", 10, 10).iter().all(|(p, _)| *p != 0));
        assert_eq!(index.stats().empty_documents, 1);
    }

    #[test]
    fn test_final_set_is_subset_of_stage1_survivors() {
        let texts = sample_corpus();
        let index = index(&texts);
        for query in ["закалка стали", "сварка", "охрана труда", "сплав", "нет совпадений xyz"] {
            let survivors: Vec<usize> = index
                .prefilter(query, 100)
                .into_iter()
                .filter(|&(_, s)| s > 1e-5)
                .map(|(p, _)| p)
                .collect();
            for (position, _) in index.search(query, 100, 5) {
                assert!(survivors.contains(&position), "{} not a survivor for {:?}", position, query);
            }
        }
    }

    #[test]
    fn test_raised_threshold_drops_weak_survivors() {
        let texts = sample_corpus();
        let query = "закалка стали";
        let baseline = index(&texts);
        let stage1: std::collections::HashMap<usize, f64> = baseline.prefilter(query, 100).into_iter().collect();
        let before = baseline.search(query, 100, 5);
        assert!(!before.is_empty());

        // cut exactly at the weakest final candidate's stage-1 score
        let (weakest, threshold) = before
            .iter()
            .map(|(p, _)| (*p, stage1[p]))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        let config = LexicalConfig {
            stage1_threshold: threshold,
            ..LexicalConfig::default()
        };
        let strict = LexicalIndex::build_from_texts(&texts, &config).unwrap();
        let after = strict.search(query, 100, 5);

        assert!(after.iter().all(|(p, _)| *p != weakest));
        assert!(after.iter().all(|(p, _)| stage1[p] > threshold));
        assert!(after.len() < before.len());
    }

    #[test]
    fn test_no_survivors_means_no_results() {
        let index = index(&sample_corpus());
        assert!(index.search("qqqq wwww", 100, 5).is_empty());
        assert!(index.search("", 100, 5).is_empty());
    }

    #[test]
    fn test_search_is_deterministic() {
        let texts = sample_corpus();
        let index = index(&texts);
        let first = index.search("закалка стали", 100, 5);
        for _ in 0..5 {
            assert_eq!(index.search("закалка стали", 100, 5), first);
        }
    }

    #[test]
    fn test_self_query_ranks_document_first() {
        let texts = sample_corpus();
        let index = index(&texts);
        for (position, text) in texts.iter().enumerate() {
            let results = index.search(text, 100, 5);
            assert_eq!(results.first().map(|r| r.0), Some(position), "query {:?}", text);
        }
    }

    #[test]
    fn test_stage2_limit_caps_results() {
        let index = index(&sample_corpus());
        assert!(index.search("стали закалки сварных", 100, 2).len() <= 2);
    }

    #[test]
    fn test_ensure_compatible_rejects_other_ngram_size() {
        let index = index(&CATS);
        assert!(index.ensure_compatible(&LexicalConfig::default()).is_ok());
        let other = LexicalConfig { ngram_size: 4, ..LexicalConfig::default() };
        assert!(matches!(index.ensure_compatible(&other), Err(RagError::Config(_))));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let bad = LexicalConfig { ngram_size: 0, ..LexicalConfig::default() };
        assert!(LexicalIndex::build_from_texts(&CATS, &bad).is_err());
    }

    #[test]
    fn test_build_on_empty_corpus() {
        let empty: [&str; 0] = [];
        let index = index(&empty);
        assert!(index.is_empty());
        assert!(index.search("кот", 100, 5).is_empty());
    }
}
