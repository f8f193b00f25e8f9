//! # Context FAQ
//!
//! A context-aware FAQ bot backend. Incoming messages are answered with the
//! closest known question from a curated knowledge base, searched only
//! within the conversation's current context (for example a general
//! banking FAQ versus a Gold Card FAQ).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ faq.toml     │──▶│  Embedding  │──▶│ EmbeddingIndex │
//! │ [[faq]] ...  │   │  provider   │   │ per context    │
//! └──────────────┘   └─────────────┘   └───────┬────────┘
//!                                              │
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!                 ┌──────────┐           ┌──────────┐
//!                 │   CLI    │           │   HTTP   │
//!                 │  (faq)   │           │ /answer  │
//!                 └──────────┘           └──────────┘
//! ```
//!
//! The matching logic itself (context tracking, index, fallback policy)
//! lives in the `context-faq-core` crate; this crate wires it to files,
//! embedding services, and the outside world.
//!
//! ## Quick Start
//!
//! ```bash
//! faq check                            # validate config and knowledge base
//! faq ask "What are your opening hours?"
//! faq chat                             # interactive conversation
//! faq serve                            # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`knowledge`] | TOML knowledge base |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | Knowledge → index → matcher startup pipeline |
//! | [`snapshot`] | Embedding index snapshots |
//! | [`audit`] | Per-turn audit sinks |
//! | [`sessions`] | Per-conversation session registry |
//! | [`ask`] | `ask` and `chat` commands |
//! | [`check`] | `check` and `snapshot` commands |
//! | [`server`] | HTTP server |

pub mod ask;
pub mod audit;
pub mod check;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod knowledge;
pub mod server;
pub mod sessions;
pub mod snapshot;

pub use context_faq_core::{
    ContextTracker, EmbeddingIndex, FallbackPolicy, FaqError, FaqMatcher, MatchResult, Partition,
    SessionState,
};
