/// Text normalization shared by indexing and querying.
///
/// Lower-cases, keeps alphanumeric characters and plain spaces, drops everything
/// else (tabs and newlines included, so words around them are joined), then stems
/// each space-separated token. The same `Normalizer`
/// must see both the corpus and the queries or recall silently degrades.

use rust_stemmers::{Algorithm, Stemmer};

pub struct Normalizer {
    stemmer: Stemmer,
}

impl Normalizer {
    pub fn new(algorithm: Algorithm) -> Self {
        Normalizer {
            stemmer: Stemmer::create(algorithm),
        }
    }

    /// Normalize `text` into single-space-separated stemmed tokens.
    pub fn normalize(&self, text: &str) -> String {
        let mut cleaned = String::with_capacity(text.len());
        for c in text.chars() {
            if c.is_alphanumeric() {
                cleaned.extend(c.to_lowercase());
            } else if c == ' ' {
                cleaned.push(' ');
            }
        }

        let mut out = String::with_capacity(cleaned.len());
        for token in cleaned.split(' ').filter(|t| !t.is_empty()) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.stemmer.stem(token));
        }
        out
    }
}

impl Default for Normalizer {
    /// Russian Snowball stemmer.
    fn default() -> Self {
        Normalizer::new(Algorithm::Russian)
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}
