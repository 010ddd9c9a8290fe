/// Stage 1: character n-gram TF-IDF prefilter.
///
/// Coarse and cheap. Every document with at least one n-gram gets a score, so the
/// caller decides how many to keep via `limit` and the survival threshold.

use std::collections::HashMap;

use super::ngram::{document_frequencies, TermCounts};

/// IDF used for query n-grams never seen in the corpus.
pub const UNSEEN_NGRAM_IDF: f64 = 1e-3;

/// `ln((1 + N) / (1 + df))`
pub fn tfidf_idf(n_docs: usize, doc_freq: usize) -> f64 {
    ((1.0 + n_docs as f64) / (1.0 + doc_freq as f64)).ln()
}

#[derive(Debug, Clone)]
pub struct TfIdfPrefilter {
    docs: Vec<TermCounts>,
    idf: HashMap<String, f64>,
}

impl TfIdfPrefilter {
    /// Fit over per-document n-gram sequences, in corpus order.
    pub fn fit(doc_ngrams: Vec<Vec<String>>) -> Self {
        let docs: Vec<TermCounts> = doc_ngrams.into_iter().map(TermCounts::from_terms).collect();
        let n_docs = docs.len();
        let idf = document_frequencies(&docs)
            .into_iter()
            .map(|(term, df)| (term, tfidf_idf(n_docs, df)))
            .collect();
        TfIdfPrefilter { docs, idf }
    }

    pub fn idf(&self, ngram: &str) -> Option<f64> {
        self.idf.get(ngram).copied()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    /// Score every non-empty document against the query n-grams.
    ///
    /// Returns `(position, score)` sorted by descending score; equal scores keep
    /// corpus order. Documents without n-grams are left out entirely.
    pub fn search(&self, query_ngrams: &[String], limit: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(self.docs.len());
        for (position, doc) in self.docs.iter().enumerate() {
            if doc.is_empty() {
                continue;
            }
            let total = doc.total() as f64;
            let mut score = 0.0;
            for ngram in query_ngrams {
                let tf = doc.get(ngram).unwrap_or(0) as f64 / total;
                let idf = self.idf(ngram).unwrap_or(UNSEEN_NGRAM_IDF);
                score += tf * idf;
            }
            scored.push((position, score));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::ngram::to_ngrams;
    use crate::lexical::normalize::Normalizer;

    fn fit_texts(texts: &[&str], n: usize) -> TfIdfPrefilter {
        let normalizer = Normalizer::default();
        TfIdfPrefilter::fit(
            texts
                .iter()
                .map(|t| to_ngrams(&normalizer.normalize(t), n))
                .collect(),
        )
    }

    fn query(text: &str, n: usize) -> Vec<String> {
        to_ngrams(&Normalizer::default().normalize(text), n)
    }

    #[test]
    fn test_idf_formula() {
        assert!((tfidf_idf(3, 1) - (4.0f64 / 2.0).ln()).abs() < 1e-12);
        // a term in every document carries no weight
        assert_eq!(tfidf_idf(5, 5), 0.0);
    }

    #[test]
    fn test_idf_non_increasing_in_document_frequency() {
        for n in 1..20 {
            for df in 1..n {
                assert!(tfidf_idf(n, df + 1) <= tfidf_idf(n, df));
            }
        }
    }

    #[test]
    fn test_prefilter_ranks_matching_documents_first() {
        let index = fit_texts(&["кот сидит на окне", "собака бежит по двору", "кот спит"], 3);
        let results = index.search(&query("кот", 3), 10);

        assert_eq!(results.len(), 3);
        let top: Vec<usize> = results[..2].iter().map(|(p, _)| *p).collect();
        assert!(top.contains(&0) && top.contains(&2), "top two were {:?}", top);
        assert_eq!(results[2].0, 1);
        assert!(results[1].1 > results[2].1);
    }

    #[test]
    fn test_prefilter_skips_empty_documents() {
        let index = fit_texts(&["", "кот спит", "?!"], 3);
        let results = index.search(&query("кот", 3), 10);
        let positions: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1]);
    }

    #[test]
    fn test_prefilter_ties_keep_corpus_order_and_truncate() {
        let index = fit_texts(&["первый", "второй", "третий"], 3);
        let results = index.search(&query("пять", 3), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn test_unseen_ngrams_use_default_idf() {
        let index = fit_texts(&["abcabc"], 3);
        assert_eq!(index.idf("zzz"), None);
        // "abc" appears in the only document: idf 0, so the score comes from nothing else
        let results = index.search(&["abc".to_string()], 1);
        assert_eq!(results[0].1, 0.0);
    }
}
