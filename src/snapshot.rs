//! Embedding index snapshots.
//!
//! Embedding the whole knowledge base on every start is slow (and costs
//! money with a hosted model), so the built index can be written to a
//! JSON file and restored on the next start.
//!
//! Vectors are stored as base64 of their little-endian f32 bytes
//! ([`vec_to_blob`]). A snapshot is only reused when its fingerprint
//! matches: SHA-256 over the model name and every partition's questions
//! and answers, in order. Any edit to the knowledge base or a model change
//! therefore forces a rebuild.

use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use context_faq_core::embedding::{blob_to_vec, vec_to_blob};
use context_faq_core::{EmbeddingIndex, KnowledgeEntry, Partition};

use crate::ingest::PartitionData;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    model: String,
    dims: Option<usize>,
    fingerprint: String,
    partitions: Vec<SnapshotPartition>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPartition {
    name: Partition,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    question: String,
    answer: String,
    embedding: String,
}

/// Fingerprint of a knowledge base as embedded by `model`.
pub fn fingerprint(model: &str, knowledge: &[PartitionData]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    for data in knowledge {
        hasher.update(data.partition.as_str().as_bytes());
        hasher.update([0u8]);
        for (q, a) in data.questions.iter().zip(&data.answers) {
            hasher.update(q.as_bytes());
            hasher.update([0u8]);
            hasher.update(a.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
    }
    hex::encode(hasher.finalize())
}

/// Write `index` to `path`, replacing any previous snapshot atomically.
pub fn save(path: &Path, index: &EmbeddingIndex, model: &str, fingerprint: &str) -> Result<()> {
    let partitions = index
        .partitions()
        .map(|(partition, _)| SnapshotPartition {
            name: partition.clone(),
            entries: index
                .entries(partition)
                .unwrap_or_default()
                .iter()
                .map(|e| SnapshotEntry {
                    question: e.question.clone(),
                    answer: e.answer.clone(),
                    embedding: BASE64.encode(vec_to_blob(&e.embedding)),
                })
                .collect(),
        })
        .collect();

    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        model: model.to_string(),
        dims: index.dims(),
        fingerprint: fingerprint.to_string(),
        partitions,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec(&file)?)
        .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into place: {}", path.display()))?;

    info!(path = %path.display(), "wrote embedding snapshot");
    Ok(())
}

/// Restore an index from `path` if it was built from the same knowledge
/// base and model.
///
/// Returns `Ok(None)` when the file is missing or stale; errors only for
/// unreadable or corrupt snapshots.
pub fn load(path: &Path, model: &str, fingerprint: &str) -> Result<Option<EmbeddingIndex>> {
    if !path.exists() {
        debug!(path = %path.display(), "no embedding snapshot");
        return Ok(None);
    }

    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let file: SnapshotFile = serde_json::from_slice(&content)
        .with_context(|| format!("Corrupt snapshot: {}", path.display()))?;

    if file.version != SNAPSHOT_VERSION {
        bail!(
            "Unsupported snapshot version {} in {}",
            file.version,
            path.display()
        );
    }
    if file.model != model || file.fingerprint != fingerprint {
        info!(path = %path.display(), "embedding snapshot is stale; rebuilding");
        return Ok(None);
    }

    let mut index = EmbeddingIndex::new();
    for partition in file.partitions {
        let entries = partition
            .entries
            .into_iter()
            .map(|e| {
                let blob = BASE64
                    .decode(e.embedding.as_bytes())
                    .with_context(|| format!("Corrupt embedding for {:?}", e.question))?;
                Ok(KnowledgeEntry {
                    question: e.question,
                    answer: e.answer,
                    embedding: blob_to_vec(&blob),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        index.insert(partition.name, entries)?;
    }

    if file.dims.is_some() && index.dims() != file.dims {
        bail!("Snapshot dims do not match its vectors: {}", path.display());
    }

    info!(path = %path.display(), "restored embedding snapshot");
    Ok(Some(index))
}
