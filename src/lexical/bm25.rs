/// Stage 2: whole-word BM25 ranking.
///
/// Two deliberate departures from textbook BM25 are kept as-is:
/// - IDF is `ln((N - df + 0.5) / (df + 0.5) + 1)`, never negative.
/// - `delta` is added once per query term even when the document lacks the term.

use std::collections::HashMap;

use crate::config::LexicalConfig;

use super::ngram::{document_frequencies, TermCounts};

/// IDF used for query terms never seen in the corpus.
pub const UNSEEN_TERM_IDF: f64 = 1e-6;

/// Raw term frequency assumed when a document lacks the query term.
pub const ABSENT_TERM_TF: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub delta: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params {
            k1: 1.5,
            b: 0.75,
            delta: 1.0,
        }
    }
}

impl From<&LexicalConfig> for Bm25Params {
    fn from(config: &LexicalConfig) -> Self {
        Bm25Params {
            k1: config.k1,
            b: config.b,
            delta: config.delta,
        }
    }
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`
pub fn bm25_idf(n_docs: usize, doc_freq: usize) -> f64 {
    let n = n_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Contribution of one query term to one document.
pub fn bm25_term_score(idf: f64, tf: f64, doc_len: f64, avg_doc_len: f64, params: &Bm25Params) -> f64 {
    let Bm25Params { k1, b, delta } = *params;
    let numerator = tf * (k1 + 1.0);
    let denominator = tf + k1 * (1.0 - b + b * doc_len / avg_doc_len);
    idf * (numerator / denominator + delta)
}

#[derive(Debug, Clone)]
pub struct Bm25Ranker {
    docs: Vec<TermCounts>,
    idf: HashMap<String, f64>,
    avg_doc_len: f64,
    params: Bm25Params,
}

impl Bm25Ranker {
    /// Fit over per-document word sequences, in corpus order.
    pub fn fit(doc_words: Vec<Vec<String>>, params: Bm25Params) -> Self {
        let docs: Vec<TermCounts> = doc_words.into_iter().map(TermCounts::from_terms).collect();
        let n_docs = docs.len();
        let idf = document_frequencies(&docs)
            .into_iter()
            .map(|(term, df)| (term, bm25_idf(n_docs, df)))
            .collect();
        let total_len: u64 = docs.iter().map(|d| d.total() as u64).sum();
        let avg_doc_len = if n_docs == 0 {
            0.0
        } else {
            total_len as f64 / n_docs as f64
        };
        Bm25Ranker {
            docs,
            idf,
            avg_doc_len,
            params,
        }
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    pub fn empty_documents(&self) -> usize {
        self.docs.iter().filter(|d| d.is_empty()).count()
    }

    /// Score documents against the query terms.
    ///
    /// With `only`, just those positions are scored, in the order given; positions
    /// outside the corpus are ignored. Zero-length documents are skipped. Output is
    /// sorted by descending score (stable) and truncated to `limit`.
    pub fn search(&self, query_terms: &[String], limit: usize, only: Option<&[usize]>) -> Vec<(usize, f64)> {
        let positions: Box<dyn Iterator<Item = usize> + '_> = match only {
            Some(subset) => Box::new(subset.iter().copied()),
            None => Box::new(0..self.docs.len()),
        };

        let mut scored = Vec::new();
        for position in positions {
            let Some(doc) = self.docs.get(position) else {
                continue;
            };
            if doc.is_empty() {
                continue;
            }
            let doc_len = doc.total() as f64;
            let score: f64 = query_terms
                .iter()
                .map(|term| {
                    let idf = self.idf(term).unwrap_or(UNSEEN_TERM_IDF);
                    let tf = doc.get(term).map(f64::from).unwrap_or(ABSENT_TERM_TF);
                    bm25_term_score(idf, tf, doc_len, self.avg_doc_len, &self.params)
                })
                .sum();
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
    use crate::lexical::ngram::to_words;
    use crate::lexical::normalize::Normalizer;

    fn fit_texts(texts: &[&str]) -> Bm25Ranker {
        let normalizer = Normalizer::default();
        Bm25Ranker::fit(
            texts.iter().map(|t| to_words(&normalizer.normalize(t))).collect(),
            Bm25Params::default(),
        )
    }

    fn words(text: &str) -> Vec<String> {
        to_words(&Normalizer::default().normalize(text))
    }

    #[test]
    fn test_idf_is_positive_even_for_ubiquitous_terms() {
        assert!(bm25_idf(10, 10) > 0.0);
        assert!((bm25_idf(10, 10) - (0.5f64 / 10.5 + 1.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_idf_non_increasing_in_document_frequency() {
        for n in 1..30 {
            for df in 0..n {
                assert!(bm25_idf(n, df + 1) <= bm25_idf(n, df));
            }
        }
    }

    #[test]
    fn test_term_score_finite_and_non_negative() {
        for &k1 in &[0.1, 1.2, 1.5, 3.0] {
            for &b in &[0.01, 0.5, 0.75, 1.0] {
                for &tf in &[0.0, ABSENT_TERM_TF, 1.0, 7.0, 1000.0] {
                    for &doc_len in &[1.0, 5.0, 500.0] {
                        let params = Bm25Params { k1, b, delta: 1.0 };
                        let s = bm25_term_score(bm25_idf(10, 3), tf, doc_len, 12.0, &params);
                        assert!(s.is_finite() && s >= 0.0, "k1={} b={} tf={} score={}", k1, b, tf, s);
                    }
                }
            }
        }
    }

    #[test]
    fn test_delta_applies_to_absent_terms() {
        let params = Bm25Params::default();
        let s = bm25_term_score(2.0, ABSENT_TERM_TF, 4.0, 4.0, &params);
        // tf term is ~0, the delta keeps idf * 1.0
        assert!((s - 2.0).abs() < 1e-5, "score {}", s);
    }

    #[test]
    fn test_search_prefers_matching_document() {
        let ranker = fit_texts(&["кот сидит на окне", "собака бежит по двору", "кот спит"]);
        let results = ranker.search(&words("собака"), 3, None);
        assert_eq!(results[0].0, 1);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_skips_empty_documents() {
        let ranker = fit_texts(&["", "кот спит"]);
        let results = ranker.search(&words("кот"), 10, None);
        let positions: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1]);
        assert_eq!(ranker.empty_documents(), 1);
        assert!((ranker.avg_doc_len() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_search_restricted_to_subset() {
        let ranker = fit_texts(&["кот сидит", "кот спит", "кот бежит"]);
        let results = ranker.search(&words("кот"), 10, Some(&[2, 0, 99]));
        let mut positions: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 2]);

        assert!(ranker.search(&words("кот"), 10, Some(&[])).is_empty());
    }

    #[test]
    fn test_unseen_query_terms_score_near_zero() {
        let ranker = fit_texts(&["кот сидит"]);
        let results = ranker.search(&["zzzz".to_string()], 1, None);
        assert!(results[0].1 > 0.0 && results[0].1 < 1e-5);
    }
}
