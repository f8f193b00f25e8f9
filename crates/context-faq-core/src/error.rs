//! Error taxonomy for loading and querying the FAQ index.

use thiserror::Error;

use crate::models::Partition;

/// Errors surfaced by the core.
///
/// Low-confidence matches are not errors; they are reported through
/// [`MatchResult::is_fallback`](crate::models::MatchResult::is_fallback).
#[derive(Debug, Error)]
pub enum FaqError {
    /// Malformed knowledge base or settings, detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A session referenced a partition that was never loaded.
    #[error("unknown partition: {0}")]
    UnknownPartition(Partition),

    /// The partition exists but holds no entries.
    #[error("partition {0} has no entries")]
    EmptyPartition(Partition),

    /// Opaque failure from the embedding collaborator. Never retried here.
    #[error("embedding service error: {0}")]
    EmbeddingService(#[source] anyhow::Error),
}

impl FaqError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for errors that can only be fixed by changing configuration
    /// or the knowledge base, never by retrying the same input.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::EmbeddingService(_))
    }
}
