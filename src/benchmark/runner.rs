/// Benchmark runner for the lexical retrieval engine.
///
/// Builds one index per configuration over the shared corpus, then times and
/// scores every question against it.

use std::collections::HashSet;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::LexicalConfig;
use crate::corpus::Corpus;
use crate::service::LexicalSearch;

use super::dataset::BenchmarkQuestion;
use super::{BenchmarkConfig, QuestionResult};

/// Score one ranked id list against the relevant set, looking at the top `k`.
///
/// Returns `(hit, recall, reciprocal_rank)`. A question with no relevant ids
/// scores zero on every metric.
pub fn score_ranking(ranked: &[String], relevant: &[String], k: usize) -> (bool, f64, f64) {
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    if relevant.is_empty() {
        return (false, 0.0, 0.0);
    }

    let top = &ranked[..ranked.len().min(k)];
    let found = top.iter().filter(|id| relevant.contains(id.as_str())).count();
    let reciprocal_rank = top
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .unwrap_or(0.0);

    (found > 0, found as f64 / relevant.len() as f64, reciprocal_rank)
}

/// Run every question against one configuration.
pub fn run_benchmark(
    questions: &[BenchmarkQuestion],
    corpus: &Corpus,
    base: &LexicalConfig,
    config: &BenchmarkConfig,
    k: usize,
) -> Result<Vec<QuestionResult>, anyhow::Error> {
    let lexical_config = config.lexical(base);
    let build_started = Instant::now();
    let search = LexicalSearch::build(corpus.clone(), &lexical_config)?;
    tracing::info!(
        config = %config.name,
        documents = corpus.len(),
        elapsed_ms = build_started.elapsed().as_millis() as u64,
        "Index built"
    );

    let pb = ProgressBar::new(questions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{pos}/{len}] {msg} [{elapsed_precise} / {eta_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut results = Vec::with_capacity(questions.len());
    for question in questions {
        let question_id = question.question_id.clone().unwrap_or_default();
        pb.set_message(question_id.clone());

        let start = Instant::now();
        let hits = search.search(&question.question, config.limit_stage1, config.limit_stage2);
        let latency_us = start.elapsed().as_micros() as u64;

        let retrieved_ids: Vec<String> = hits.into_iter().map(|h| h.passage.id).collect();
        let (hit, recall, reciprocal_rank) = score_ranking(&retrieved_ids, &question.relevant_ids, k);

        results.push(QuestionResult {
            question_id,
            category: question.category().to_string(),
            hit,
            recall,
            reciprocal_rank,
            retrieved_ids,
            latency_us,
        });
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(results)
}
