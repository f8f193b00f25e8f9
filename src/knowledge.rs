//! File-backed knowledge base.
//!
//! The knowledge base is a TOML file of ordered `[[faq]]` entries, each
//! tagged with the context it belongs to:
//!
//! ```toml
//! [[faq]]
//! context = "GENERAL"
//! question = "How do I open an account?"
//! answer = "Visit any branch."
//!
//! [[faq]]
//! context = "GOLDCARD"
//! question = "What is the annual fee?"
//! answer = "The Gold Card has no annual fee in the first year."
//! ```
//!
//! File order is insertion order within each context, which is also the
//! tie-break order of the index.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use context_faq_core::source::{InMemoryKnowledgeSource, KnowledgeSource};
use context_faq_core::Partition;

#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    faq: Vec<FaqEntry>,
}

#[derive(Debug, Deserialize)]
struct FaqEntry {
    context: String,
    question: String,
    answer: String,
}

/// Knowledge source read once from a TOML file.
#[derive(Debug, Clone)]
pub struct TomlKnowledgeSource {
    inner: InMemoryKnowledgeSource,
    entries: usize,
}

impl TomlKnowledgeSource {
    /// Read and validate `path` against the declared partitions.
    pub fn load(path: &Path, declared: &[Partition]) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base: {}", path.display()))?;
        Self::parse(&content, declared)
            .with_context(|| format!("Invalid knowledge base: {}", path.display()))
    }

    pub fn parse(content: &str, declared: &[Partition]) -> Result<Self> {
        let file: KnowledgeFile = toml::from_str(content)?;
        let declared: HashSet<&Partition> = declared.iter().collect();

        let mut inner = InMemoryKnowledgeSource::new();
        for (i, entry) in file.faq.iter().enumerate() {
            let partition = Partition::new(entry.context.as_str());
            if !declared.contains(&partition) {
                bail!(
                    "faq entry {} uses undeclared context '{}'",
                    i + 1,
                    entry.context
                );
            }
            if entry.question.trim().is_empty() {
                bail!("faq entry {} has an empty question", i + 1);
            }
            inner = inner.with_entry(partition, entry.question.clone(), entry.answer.clone());
        }

        Ok(Self {
            inner,
            entries: file.faq.len(),
        })
    }

    /// Total number of entries across all contexts.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

#[async_trait]
impl KnowledgeSource for TomlKnowledgeSource {
    async fn get_questions_answers(
        &self,
        partition: &Partition,
    ) -> Result<(Vec<String>, Vec<String>)> {
        self.inner.get_questions_answers(partition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> Vec<Partition> {
        vec![Partition::general(), Partition::goldcard()]
    }

    #[tokio::test]
    async fn test_entries_grouped_in_file_order() {
        let source = TomlKnowledgeSource::parse(
            r#"
[[faq]]
context = "GENERAL"
question = "How do I open an account?"
answer = "Visit any branch."

[[faq]]
context = "GOLDCARD"
question = "What is the annual fee?"
answer = "None in the first year."

[[faq]]
context = "GENERAL"
question = "What are your hours?"
answer = "9am–5pm."
"#,
            &declared(),
        )
        .unwrap();
        assert_eq!(source.len(), 3);

        let (q, a) = source
            .get_questions_answers(&Partition::general())
            .await
            .unwrap();
        assert_eq!(q, vec!["How do I open an account?", "What are your hours?"]);
        assert_eq!(a, vec!["Visit any branch.", "9am–5pm."]);
    }

    #[test]
    fn test_rejects_undeclared_context() {
        let err = TomlKnowledgeSource::parse(
            r#"
[[faq]]
context = "MORTGAGE"
question = "Rates?"
answer = "Call us."
"#,
            &declared(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("undeclared context 'MORTGAGE'"));
    }

    #[test]
    fn test_rejects_blank_question() {
        let err = TomlKnowledgeSource::parse(
            r#"
[[faq]]
context = "GENERAL"
question = "  "
answer = "?"
"#,
            &declared(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty question"));
    }

    #[test]
    fn test_missing_file_has_path_context() {
        let err = TomlKnowledgeSource::load(Path::new("/nonexistent/faq.toml"), &declared())
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/faq.toml"));
    }
}
