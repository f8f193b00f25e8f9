//! Audit sinks.
//!
//! | `audit.sink` | Sink |
//! |--------------|------|
//! | `"tracing"` | [`TracingAuditSink`]: one structured event per turn on target `faq::audit` |
//! | `"jsonl"` | [`JsonlAuditSink`]: one JSON object per line, appended to `audit.path` |
//! | `"disabled"` | [`NullAuditSink`] |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::AuditConfig;

pub use context_faq_core::audit::{AuditRecord, AuditSink, MemoryAuditSink, NullAuditSink};

/// Emits each record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, record: &AuditRecord) -> Result<()> {
        tracing::info!(
            target: "faq::audit",
            turn_id = %record.turn_id,
            question = %record.question,
            matched_question = %record.matched_question,
            answer = %record.answer,
            score = record.score,
            context = %record.context,
            is_fallback = record.is_fallback,
            channel_id = record.session.channel_id.as_deref().unwrap_or(""),
            "turn"
        );
        Ok(())
    }
}

/// Appends records to a JSON Lines file.
///
/// Writes are serialized so concurrent turns never interleave lines.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlAuditSink {
    /// The file is opened lazily on the first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    async fn open(&self) -> Result<tokio::fs::File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn log(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let written = match guard.as_mut() {
            Some(file) => match file.write_all(&line).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            None => Ok(()),
        };
        if let Err(e) = written {
            // Reopen on the next record in case the file was rotated away.
            *guard = None;
            return Err(e)
                .with_context(|| format!("Failed to write audit log: {}", self.path.display()));
        }
        Ok(())
    }
}

/// Create the audit sink named by `[audit]`.
pub fn create_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    match config.sink.as_str() {
        "tracing" => Ok(Arc::new(TracingAuditSink)),
        "disabled" => Ok(Arc::new(NullAuditSink)),
        "jsonl" => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("audit.path required for jsonl sink"))?;
            Ok(Arc::new(JsonlAuditSink::new(path)))
        }
        other => anyhow::bail!("Unknown audit sink: {}", other),
    }
}
