/// Tokenizers over normalized text, plus the multiset type both rankers index.

use std::collections::HashMap;

/// Character n-grams of every whitespace token, in document order.
///
/// Sliding window without padding; tokens shorter than `n` contribute nothing.
pub fn to_ngrams(normalized: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let mut grams = Vec::new();
    for token in normalized.split_whitespace() {
        let chars: Vec<char> = token.chars().collect();
        for window in chars.windows(n) {
            grams.push(window.iter().collect());
        }
    }
    grams
}

/// Whole-word terms of normalized text.
pub fn to_words(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Per-document term multiset.
#[derive(Debug, Clone, Default)]
pub struct TermCounts {
    counts: HashMap<String, u32>,
    total: u32,
}

impl TermCounts {
    pub fn from_terms<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut total = 0u32;
        for term in terms {
            *counts.entry(term).or_default() += 1;
            total += 1;
        }
        TermCounts { counts, total }
    }

    pub fn get(&self, term: &str) -> Option<u32> {
        self.counts.get(term).copied()
    }

    /// Number of terms counted with multiplicity.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Distinct terms, for document-frequency counting.
    pub fn distinct(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}

/// Document frequency of every term across `docs`.
pub(crate) fn document_frequencies(docs: &[TermCounts]) -> HashMap<String, usize> {
    let mut df: HashMap<String, usize> = HashMap::new();
    for doc in docs {
        for term in doc.distinct() {
            *df.entry(term.to_string()).or_default() += 1;
        }
    }
    df
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngrams_sliding_window() {
        assert_eq!(to_ngrams("abcd", 3), vec!["abc", "bcd"]);
    }

    #[test]
    fn test_ngrams_skip_short_tokens() {
        assert_eq!(to_ngrams("на окн", 3), vec!["окн"]);
        assert!(to_ngrams("ab cd", 3).is_empty());
    }

    #[test]
    fn test_ngrams_are_per_token_and_unicode_aware() {
        // no n-gram spans the space between tokens
        assert_eq!(to_ngrams("кот спит", 3), vec!["кот", "спи", "пит"]);
    }

    #[test]
    fn test_ngrams_zero_size_is_empty() {
        assert!(to_ngrams("anything", 0).is_empty());
    }

    #[test]
    fn test_term_counts_multiset() {
        let counts = TermCounts::from_terms(to_words("a b a"));
        assert_eq!(counts.get("a"), Some(2));
        assert_eq!(counts.get("b"), Some(1));
        assert_eq!(counts.get("c"), None);
        assert_eq!(counts.total(), 3);
        assert!(TermCounts::from_terms(to_words("")).is_empty());
    }

    #[test]
    fn test_document_frequencies_count_each_doc_once() {
        let docs = vec![
            TermCounts::from_terms(to_words("a a b")),
            TermCounts::from_terms(to_words("a c")),
        ];
        let df = document_frequencies(&docs);
        assert_eq!(df["a"], 2);
        assert_eq!(df["b"], 1);
        assert_eq!(df["c"], 1);
    }
}
