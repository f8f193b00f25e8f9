//! Per-partition embedding index with top-1 nearest-neighbour lookup.
//!
//! Each partition holds its knowledge entries in insertion order. Question
//! embeddings are computed once by [`EmbeddingIndex::load`] (or installed
//! precomputed via [`EmbeddingIndex::insert`]); a query only embeds the
//! incoming text and scores it against every stored vector.
//!
//! The index is read-only once built and is shared across concurrent
//! turns behind an `Arc` without locking.
//!
//! # Tie-break
//!
//! When several entries share the maximum score, the one inserted first
//! wins. NaN scores never win.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::FaqError;
use crate::models::{KnowledgeEntry, Partition};

/// The nearest stored entry for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<'a> {
    /// Insertion index of the entry within its partition.
    pub index: usize,
    pub entry: &'a KnowledgeEntry,
    pub score: f32,
}

/// Knowledge entries and their embeddings, grouped by partition.
#[derive(Debug, Default, Clone)]
pub struct EmbeddingIndex {
    partitions: BTreeMap<Partition, Vec<KnowledgeEntry>>,
    dims: Option<usize>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed `questions` and store them aligned with `answers`.
    ///
    /// Questions are sent to the provider in batches of `batch_size`,
    /// preserving order. Returns the number of entries stored.
    ///
    /// # Errors
    ///
    /// - [`FaqError::Configuration`] if the sequences differ in length,
    ///   `questions` is empty, `batch_size` is zero, or the partition is
    ///   already loaded.
    /// - [`FaqError::EmbeddingService`] if the provider fails or returns
    ///   the wrong number of vectors.
    pub async fn load(
        &mut self,
        partition: Partition,
        questions: Vec<String>,
        answers: Vec<String>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<usize, FaqError> {
        if questions.len() != answers.len() {
            return Err(FaqError::configuration(format!(
                "partition {}: {} questions but {} answers",
                partition,
                questions.len(),
                answers.len()
            )));
        }
        if questions.is_empty() {
            return Err(FaqError::configuration(format!(
                "partition {} has no questions",
                partition
            )));
        }
        if batch_size == 0 {
            return Err(FaqError::configuration("batch_size must be > 0"));
        }
        if self.partitions.contains_key(&partition) {
            return Err(FaqError::configuration(format!(
                "partition {} is already loaded",
                partition
            )));
        }

        let mut embeddings = Vec::with_capacity(questions.len());
        for batch in questions.chunks(batch_size) {
            let vectors = embedder
                .embed_batch(batch)
                .await
                .map_err(FaqError::EmbeddingService)?;
            if vectors.len() != batch.len() {
                return Err(FaqError::EmbeddingService(anyhow::anyhow!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
        }

        let entries: Vec<KnowledgeEntry> = questions
            .into_iter()
            .zip(answers)
            .zip(embeddings)
            .map(|((question, answer), embedding)| KnowledgeEntry {
                question,
                answer,
                embedding,
            })
            .collect();

        self.dims = self
            .check_dims(&partition, &entries)
            .map_err(|e| FaqError::EmbeddingService(anyhow::anyhow!(e.to_string())))?;

        let count = entries.len();
        info!(partition = %partition, entries = count, model = embedder.model_name(), "loaded partition");
        self.partitions.insert(partition, entries);
        Ok(count)
    }

    /// Install precomputed entries for a partition, replacing nothing.
    ///
    /// Used when restoring from a snapshot. An empty entry list is
    /// accepted; querying that partition then fails with
    /// [`FaqError::EmptyPartition`].
    pub fn insert(
        &mut self,
        partition: Partition,
        entries: Vec<KnowledgeEntry>,
    ) -> Result<(), FaqError> {
        if self.partitions.contains_key(&partition) {
            return Err(FaqError::configuration(format!(
                "partition {} is already loaded",
                partition
            )));
        }
        self.dims = self.check_dims(&partition, &entries)?;
        self.partitions.insert(partition, entries);
        Ok(())
    }

    /// Embed `text` and return the closest entry in `partition`.
    ///
    /// The partition is validated before the provider is called.
    pub async fn query(
        &self,
        partition: &Partition,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Hit<'_>, FaqError> {
        self.entries_checked(partition)?;
        let query_vec = embedder
            .embed(text)
            .await
            .map_err(FaqError::EmbeddingService)?;
        self.nearest(partition, &query_vec, embedder)
    }

    /// Score `query_vec` against every entry in `partition` and return
    /// the best one.
    pub fn nearest(
        &self,
        partition: &Partition,
        query_vec: &[f32],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Hit<'_>, FaqError> {
        let entries = self.entries_checked(partition)?;
        if let Some(dims) = self.dims {
            if query_vec.len() != dims {
                return Err(FaqError::EmbeddingService(anyhow::anyhow!(
                    "query embedding has {} dims, index has {}",
                    query_vec.len(),
                    dims
                )));
            }
        }

        let mut best: Option<Hit<'_>> = None;
        for (index, entry) in entries.iter().enumerate() {
            let score = embedder.similarity(query_vec, &entry.embedding);
            let wins = match &best {
                None => true,
                Some(b) => rank(score) > rank(b.score),
            };
            if wins {
                best = Some(Hit {
                    index,
                    entry,
                    score,
                });
            }
        }

        let hit = best.ok_or_else(|| FaqError::EmptyPartition(partition.clone()))?;
        debug!(partition = %partition, index = hit.index, score = hit.score, "nearest entry");
        Ok(hit)
    }

    /// Entries of a partition in insertion order, if loaded.
    pub fn entries(&self, partition: &Partition) -> Option<&[KnowledgeEntry]> {
        self.partitions.get(partition).map(Vec::as_slice)
    }

    /// Loaded partitions with their entry counts, sorted by name.
    pub fn partitions(&self) -> impl Iterator<Item = (&Partition, usize)> {
        self.partitions.iter().map(|(p, e)| (p, e.len()))
    }

    pub fn contains(&self, partition: &Partition) -> bool {
        self.partitions.contains_key(partition)
    }

    /// Dimensionality shared by every stored embedding, once known.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn entries_checked(&self, partition: &Partition) -> Result<&[KnowledgeEntry], FaqError> {
        let entries = self
            .partitions
            .get(partition)
            .ok_or_else(|| FaqError::UnknownPartition(partition.clone()))?;
        if entries.is_empty() {
            return Err(FaqError::EmptyPartition(partition.clone()));
        }
        Ok(entries)
    }

    /// Verify `entries` agree with the index dimensionality and return
    /// the dimensionality the index has after accepting them.
    fn check_dims(
        &self,
        partition: &Partition,
        entries: &[KnowledgeEntry],
    ) -> Result<Option<usize>, FaqError> {
        let mut expected = self.dims;
        for entry in entries {
            let len = entry.embedding.len();
            match expected {
                None => expected = Some(len),
                Some(d) if d != len => {
                    return Err(FaqError::configuration(format!(
                        "partition {}: embedding of {:?} has {} dims, expected {}",
                        partition, entry.question, len, d
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(expected)
    }
}

/// Ordering key for scores: NaN sorts below every real score.
fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
