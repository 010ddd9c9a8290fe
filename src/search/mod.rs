/// Cross-source fusion of dense and lexical results
///
/// The reranked dense list is kept whole and in order. The lexical list may add a
/// bounded number of extra passages, skipping the dense top hit and, unless tables are
/// enabled, anything that is not text. The result is deduplicated by passage id.

use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::corpus::{Passage, PassageKind};
use crate::dense::DenseHit;

/// Separator between passages in the generation context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A passage returned by the two-stage lexical search with its fused score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub position: usize,
    pub score: f64,
    pub passage: Passage,
}

/// Admission rules for lexical passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionPolicy {
    pub use_tables: bool,
    /// Eligible lexical candidates to consider; each is appended unless already present
    pub max_lexical_additions: usize,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        FusionPolicy {
            use_tables: false,
            max_lexical_additions: 1,
        }
    }
}

impl FusionPolicy {
    pub fn from_config(config: &RetrievalConfig, use_tables: bool) -> Self {
        FusionPolicy {
            use_tables,
            max_lexical_additions: config.max_lexical_additions,
        }
    }

    fn admits_kind(&self, kind: PassageKind) -> bool {
        self.use_tables || kind == PassageKind::Text
    }
}

/// A passage as shown to the user next to the answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    pub filepath: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PassageKind,
}

impl From<&Passage> for SourceDocument {
    fn from(p: &Passage) -> Self {
        SourceDocument {
            filepath: p.source.clone(),
            content: p.text.clone(),
            kind: p.kind,
        }
    }
}

/// Final passages in rank order, plus the context string built from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalPassageSet {
    pub passages: Vec<Passage>,
    pub context: String,
}

impl FinalPassageSet {
    fn from_passages(passages: Vec<Passage>) -> Self {
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        FinalPassageSet { passages, context }
    }

    /// True when neither source produced anything usable ("no information found").
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn sources(&self) -> Vec<SourceDocument> {
        self.passages.iter().map(SourceDocument::from).collect()
    }
}

/// Merge the reranked dense list with the lexical list.
pub fn fuse_context(dense: &[DenseHit], lexical: &[LexicalHit], policy: &FusionPolicy) -> FinalPassageSet {
    let mut passages: Vec<Passage> = Vec::with_capacity(dense.len() + policy.max_lexical_additions);
    for hit in dense {
        if !passages.iter().any(|p| p.id == hit.passage.id) {
            passages.push(hit.passage.clone());
        }
    }
    let dense_top_id = dense.first().map(|h| h.passage.id.as_str());

    let mut picks = 0;
    for hit in lexical {
        if picks >= policy.max_lexical_additions {
            break;
        }
        let candidate = &hit.passage;
        if Some(candidate.id.as_str()) == dense_top_id || !policy.admits_kind(candidate.kind) {
            continue;
        }
        picks += 1;
        if passages.iter().any(|p| p.id == candidate.id) {
            continue;
        }
        tracing::debug!(id = %candidate.id, score = hit.score, "Admitted lexical passage");
        passages.push(candidate.clone());
    }

    FinalPassageSet::from_passages(passages)
}
