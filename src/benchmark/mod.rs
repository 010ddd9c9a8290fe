/// Retrieval benchmark for the lexical engine.
///
/// Scores the two-stage search against a dataset of questions with known relevant
/// passage ids: hit rate, recall@k, MRR and per-query latency. Several lexical
/// configurations can be compared in one run.

pub mod dataset;
pub mod report;
pub mod runner;

use serde::{Deserialize, Serialize};

use crate::config::LexicalConfig;

/// A named lexical configuration to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub name: String,
    pub ngram_size: usize,
    pub limit_stage1: usize,
    pub limit_stage2: usize,
}

impl BenchmarkConfig {
    /// Apply this configuration on top of `base`, keeping its BM25 parameters.
    pub fn lexical(&self, base: &LexicalConfig) -> LexicalConfig {
        LexicalConfig {
            ngram_size: self.ngram_size,
            limit_stage1: self.limit_stage1,
            limit_stage2: self.limit_stage2,
            ..base.clone()
        }
    }
}

/// Predefined configurations for comparison runs.
pub fn default_configs() -> Vec<BenchmarkConfig> {
    vec![
        BenchmarkConfig {
            name: "default".into(),
            ngram_size: 3,
            limit_stage1: 100,
            limit_stage2: 5,
        },
        BenchmarkConfig {
            name: "bigram".into(),
            ngram_size: 2,
            limit_stage1: 100,
            limit_stage2: 5,
        },
        BenchmarkConfig {
            name: "wide-prefilter".into(),
            ngram_size: 3,
            limit_stage1: 300,
            limit_stage2: 10,
        },
    ]
}

/// Result for a single benchmark question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub category: String,
    /// At least one relevant passage in the top k
    pub hit: bool,
    /// Share of relevant passages found in the top k
    pub recall: f64,
    /// 1 / rank of the first relevant passage, 0 when none was returned
    pub reciprocal_rank: f64,
    pub retrieved_ids: Vec<String>,
    pub latency_us: u64,
}
