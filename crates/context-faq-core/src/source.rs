//! Knowledge-base source abstraction.
//!
//! A [`KnowledgeSource`] supplies the ordered question/answer pairs of one
//! partition. It is called once per declared partition at startup; the
//! application crate provides a file-backed implementation.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Partition;

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Returns `(questions, answers)` for `partition`, index-aligned and in
    /// insertion order. A partition with no entries yields two empty
    /// vectors.
    async fn get_questions_answers(&self, partition: &Partition)
        -> Result<(Vec<String>, Vec<String>)>;
}

/// In-memory knowledge source for tests and embedding callers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKnowledgeSource {
    partitions: HashMap<Partition, (Vec<String>, Vec<String>)>,
}

impl InMemoryKnowledgeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pair to `partition`.
    pub fn with_entry(
        mut self,
        partition: Partition,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        let (questions, answers) = self.partitions.entry(partition).or_default();
        questions.push(question.into());
        answers.push(answer.into());
        self
    }
}

#[async_trait]
impl KnowledgeSource for InMemoryKnowledgeSource {
    async fn get_questions_answers(
        &self,
        partition: &Partition,
    ) -> Result<(Vec<String>, Vec<String>)> {
        Ok(self.partitions.get(partition).cloned().unwrap_or_default())
    }
}
