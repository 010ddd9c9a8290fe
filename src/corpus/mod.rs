/// Passage records and corpus ingestion
///
/// Payload files are JSON arrays (or JSON Lines when the extension is `.jsonl`) of
/// records shaped `{ "id"?, "text", "source", "type"?, ...extra }`. Records are
/// validated here, once, so the ranking code can rely on every field being present.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::config::CorpusConfig;
use crate::errors::RagError;

pub const PAYLOADS_FILE: &str = "payloads.json";

/// Kind of content a passage carries. Tables are gated behind `use_tables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassageKind {
    Text,
    Table,
}

impl fmt::Display for PassageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassageKind::Text => write!(f, "text"),
            PassageKind::Table => write!(f, "table"),
        }
    }
}

impl FromStr for PassageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(PassageKind::Text),
            "table" => Ok(PassageKind::Table),
            other => Err(format!("Unknown passage type: {}", other)),
        }
    }
}

/// A unit of retrievable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier used for cross-source deduplication
    pub id: String,
    /// Raw passage text, fed to both the lexical index and the generator
    pub text: String,
    /// Where the passage came from (file path or URL), shown to users
    pub source: String,
    #[serde(rename = "type")]
    pub kind: PassageKind,
    /// Payload fields we do not interpret, carried through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Passage {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: impl Into<String>, kind: PassageKind) -> Self {
        Passage {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            kind,
            extra: serde_json::Map::new(),
        }
    }
}

/// Loosely-shaped payload as found on disk.
#[derive(Deserialize)]
struct PayloadRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl PayloadRecord {
    /// Validate and convert. `position` is the record's index inside its file.
    fn into_passage(self, position: usize, default_kind: PassageKind) -> Result<Passage, RagError> {
        let at = |msg: &str| format!("record {}: {}", position, msg);

        let text = self
            .text
            .ok_or_else(|| RagError::validation("text", &at("missing text")))?;
        let source = self
            .source
            .ok_or_else(|| RagError::validation("source", &at("missing source")))?;
        let kind = match self.kind {
            Some(raw) => raw
                .parse::<PassageKind>()
                .map_err(|e| RagError::validation("type", &at(&e)))?,
            None => default_kind,
        };
        let id = match self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => {
                format!("{}:{}", default_kind, position)
            }
            Some(other) => {
                return Err(RagError::validation("id", &at(&format!("unsupported id value {}", other))));
            }
        };

        Ok(Passage {
            id,
            text,
            source,
            kind,
            extra: self.extra,
        })
    }
}

/// Read and validate a payload file.
///
/// Records without a `type` get `default_kind`; records without an `id`, or with
/// an empty one, get `"<default_kind>:<position>"`.
pub fn load_payloads(path: &Path, default_kind: PassageKind) -> Result<Vec<Passage>, RagError> {
    let file = std::fs::File::open(path)
        .map_err(|e| RagError::Corpus(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let records: Vec<PayloadRecord> = if path.extension().is_some_and(|ext| ext == "jsonl") {
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                RagError::Corpus(format!("{}:{}: {}", path.display(), line_no + 1, e))
            })?;
            records.push(record);
        }
        records
    } else {
        serde_json::from_reader(reader)
            .map_err(|e| RagError::Corpus(format!("{}: {}", path.display(), e)))?
    };

    records
        .into_iter()
        .enumerate()
        .map(|(position, record)| record.into_passage(position, default_kind))
        .collect()
}

/// The ordered, immutable passage collection the lexical index is built over.
///
/// Text passages come first, then table passages. Positions are stable for the
/// lifetime of the value.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    passages: Vec<Passage>,
}

impl Corpus {
    /// Build a corpus, rejecting duplicate ids.
    pub fn new(passages: Vec<Passage>) -> Result<Self, RagError> {
        let mut seen = HashSet::with_capacity(passages.len());
        for passage in &passages {
            if !seen.insert(passage.id.as_str()) {
                return Err(RagError::validation(
                    "id",
                    &format!("duplicate passage id '{}'", passage.id),
                ));
            }
        }
        Ok(Corpus { passages })
    }

    /// Concatenate text and table passages into one corpus.
    pub fn combined(text: Vec<Passage>, tables: Vec<Passage>) -> Result<Self, RagError> {
        let mut passages = text;
        passages.extend(tables);
        Self::new(passages)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn get(&self, position: usize) -> Option<&Passage> {
        self.passages.get(position)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn count_kind(&self, kind: PassageKind) -> usize {
        self.passages.iter().filter(|p| p.kind == kind).count()
    }
}

/// Text and table passages as loaded from the configured directories.
#[derive(Debug, Clone, Default)]
pub struct LoadedPayloads {
    pub text: Vec<Passage>,
    pub tables: Vec<Passage>,
}

impl LoadedPayloads {
    /// Load text payloads (required) and table payloads (optional).
    pub fn load(config: &CorpusConfig) -> Result<Self, RagError> {
        let text = load_payloads(&config.text_dir.join(PAYLOADS_FILE), PassageKind::Text)?;
        tracing::info!(count = text.len(), dir = %config.text_dir.display(), "Loaded text payloads");

        let table_path = config.table_dir.join(PAYLOADS_FILE);
        let tables = if table_path.exists() {
            let tables = load_payloads(&table_path, PassageKind::Table)?;
            tracing::info!(count = tables.len(), dir = %config.table_dir.display(), "Loaded table payloads");
            tables
        } else {
            tracing::warn!(
                path = %table_path.display(),
                "Table store not found, continuing with text passages only"
            );
            Vec::new()
        };

        Ok(LoadedPayloads { text, tables })
    }

    /// Combined corpus for lexical search (text first, then tables).
    pub fn corpus(&self) -> Result<Corpus, RagError> {
        Corpus::combined(self.text.clone(), self.tables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_payloads_assigns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "payloads.json",
            r#"[{"text": "alpha", "source": "a.pdf"},
                {"id": 7, "text": "beta", "source": "b.pdf", "page": 3}]"#,
        );

        let passages = load_payloads(&path, PassageKind::Table).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].id, "table:0");
        assert_eq!(passages[0].kind, PassageKind::Table);
        assert_eq!(passages[1].id, "7");
        assert_eq!(passages[1].extra.get("page"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_load_payloads_empty_id_is_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "payloads.json",
            r#"[{"id": "x", "text": "alpha", "source": "a.pdf"},
                {"id": "", "text": "beta", "source": "b.pdf"}]"#,
        );

        let passages = load_payloads(&path, PassageKind::Text).unwrap();
        assert_eq!(passages[0].id, "x");
        assert_eq!(passages[1].id, "text:1");
    }

    #[test]
    fn test_load_payloads_rejects_missing_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "payloads.json", r#"[{"source": "a.pdf"}]"#);

        match load_payloads(&path, PassageKind::Text) {
            Err(RagError::Validation { field, .. }) => assert_eq!(field.as_deref(), Some("text")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_payloads_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "payloads.json", r#"[{"text": "x", "source": "s", "type": "image"}]"#);

        assert!(matches!(
            load_payloads(&path, PassageKind::Text),
            Err(RagError::Validation { .. })
        ));
    }

    #[test]
    fn test_load_payloads_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "payloads.jsonl",
            "{\"id\": \"a\", \"text\": \"one\", \"source\": \"s\"}\n\n{\"id\": \"b\", \"text\": \"two\", \"source\": \"s\", \"type\": \"table\"}\n",
        );

        let passages = load_payloads(&path, PassageKind::Text).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[1].kind, PassageKind::Table);
    }

    #[test]
    fn test_corpus_rejects_duplicate_ids() {
        let passages = vec![
            Passage::new("x", "one", "s", PassageKind::Text),
            Passage::new("x", "two", "s", PassageKind::Table),
        ];
        assert!(Corpus::new(passages).is_err());
    }

    #[test]
    fn test_loaded_payloads_without_table_store() {
        let dir = tempfile::tempdir().unwrap();
        let text_dir = dir.path().join("text");
        std::fs::create_dir_all(&text_dir).unwrap();
        write(&text_dir, PAYLOADS_FILE, r#"[{"text": "alpha", "source": "a.pdf"}]"#);

        let config = CorpusConfig {
            text_dir,
            table_dir: dir.path().join("missing"),
        };
        let loaded = LoadedPayloads::load(&config).unwrap();
        assert_eq!(loaded.text.len(), 1);
        assert!(loaded.tables.is_empty());

        let corpus = loaded.corpus().unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.count_kind(PassageKind::Text), 1);
    }
}
