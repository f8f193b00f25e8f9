//! # Context FAQ Core
//!
//! Runtime-agnostic logic for Context FAQ: knowledge models, the
//! per-partition embedding index, the session context tracker, and the
//! matcher that ties a turn together.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Every
//! external collaborator (embedding model, knowledge source, audit sink,
//! clock) is reached through a trait so the application crate can plug
//! in concrete backends and tests can plug in deterministic ones.
//!
//! ## Turn flow
//!
//! ```text
//! text ──▶ ContextTracker ──▶ partition ──▶ EmbeddingIndex ──▶ Hit
//!                                                              │
//!                           MatchResult ◀── FallbackPolicy ◀───┘
//!                                │
//!                                └──▶ AuditSink
//! ```

pub mod audit;
pub mod clock;
pub mod embedding;
pub mod error;
pub mod index;
pub mod matcher;
pub mod models;
pub mod source;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::FaqError;
pub use index::{EmbeddingIndex, Hit};
pub use matcher::{FallbackPolicy, FaqMatcher};
pub use models::{KnowledgeEntry, MatchResult, Partition, SessionState};
pub use tracker::{ContextTracker, TriggerRule};
