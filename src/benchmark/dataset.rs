/// Benchmark dataset types.
///
/// A dataset is a JSON array of `{ "question_id"?, "question", "relevant_ids",
/// "category"? }`. Ids refer to passage ids in the configured corpus.

use serde::Deserialize;

use crate::corpus::Corpus;

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkQuestion {
    #[serde(default)]
    pub question_id: Option<String>,
    pub question: String,
    pub relevant_ids: Vec<String>,
    /// Free-form grouping for the per-category breakdown
    #[serde(default)]
    pub category: Option<String>,
}

impl BenchmarkQuestion {
    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or("uncategorized")
    }
}

/// Load a dataset, numbering questions that carry no id (`q1`, `q2`, ...).
pub fn load_dataset(path: &std::path::Path) -> Result<Vec<BenchmarkQuestion>, anyhow::Error> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut questions: Vec<BenchmarkQuestion> = serde_json::from_reader(reader)?;
    for (i, q) in questions.iter_mut().enumerate() {
        if q.question_id.is_none() {
            q.question_id = Some(format!("q{}", i + 1));
        }
    }
    Ok(questions)
}

/// Relevant ids that do not exist in `corpus`, per question.
///
/// Such questions can never score; the runner warns about them up front.
pub fn unknown_ids<'a>(questions: &'a [BenchmarkQuestion], corpus: &Corpus) -> Vec<(&'a str, &'a str)> {
    let known: std::collections::HashSet<&str> = corpus.passages().iter().map(|p| p.id.as_str()).collect();
    questions
        .iter()
        .flat_map(|q| {
            let qid = q.question_id.as_deref().unwrap_or("");
            q.relevant_ids
                .iter()
                .filter(|id| !known.contains(id.as_str()))
                .map(move |id| (qid, id.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Passage, PassageKind};

    #[test]
    fn test_load_dataset_numbers_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.json");
        std::fs::write(
            &path,
            r#"[{"question": "кот?", "relevant_ids": ["a"]},
                {"question_id": "x", "question": "пёс?", "relevant_ids": [], "category": "animals"}]"#,
        )
        .unwrap();
        let questions = load_dataset(&path).unwrap();
        assert_eq!(questions[0].question_id.as_deref(), Some("q1"));
        assert_eq!(questions[0].category(), "uncategorized");
        assert_eq!(questions[1].question_id.as_deref(), Some("x"));
        assert_eq!(questions[1].category(), "animals");
    }

    #[test]
    fn test_unknown_ids_reported() {
        let corpus = Corpus::new(vec![Passage::new("a", "кот", "s", PassageKind::Text)]).unwrap();
        let questions = vec![BenchmarkQuestion {
            question_id: Some("q1".into()),
            question: "кот".into(),
            relevant_ids: vec!["a".into(), "zzz".into()],
            category: None,
        }];
        assert_eq!(unknown_ids(&questions, &corpus), vec![("q1", "zzz")]);
    }
}
