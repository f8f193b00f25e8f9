//! Audit records and the sink they are handed to.
//!
//! Every answered turn produces one [`AuditRecord`]. Sinks are best
//! effort: the matcher logs a sink failure and carries on, so a broken
//! audit backend never blocks a reply.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Partition, SessionState};

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub turn_id: Uuid,
    pub received_at: DateTime<Utc>,
    /// Text as received from the user.
    pub question: String,
    pub matched_question: String,
    /// Answer actually sent (the fallback text when `is_fallback`).
    pub answer: String,
    pub score: f32,
    pub context: Partition,
    pub is_fallback: bool,
    /// Session after this turn's context update.
    pub session: SessionState,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, record: &AuditRecord) -> Result<()>;
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn log(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
