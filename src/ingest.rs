//! Startup pipeline: knowledge source → embeddings → index → matcher.
//!
//! Every declared context is read from the knowledge source and embedded
//! in batches. When `[snapshot]` is configured, a fresh snapshot replaces
//! the embedding step entirely and a rebuilt index is written back.
//! Snapshot failures never stop startup; they are logged and the index is
//! built from scratch.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use context_faq_core::source::KnowledgeSource;
use context_faq_core::{EmbeddingIndex, FaqMatcher, Partition};

use crate::audit::create_audit_sink;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::knowledge::TomlKnowledgeSource;
use crate::snapshot;

/// Questions and answers of one context, as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionData {
    pub partition: Partition,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
}

/// Read every declared partition from `source`, in declaration order.
pub async fn fetch_knowledge(
    source: &dyn KnowledgeSource,
    partitions: &[Partition],
) -> Result<Vec<PartitionData>> {
    let mut out = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let (questions, answers) = source
            .get_questions_answers(partition)
            .await
            .with_context(|| format!("Failed to read knowledge for context {}", partition))?;
        out.push(PartitionData {
            partition: partition.clone(),
            questions,
            answers,
        });
    }
    Ok(out)
}

/// Embed `knowledge` into a fresh index.
pub async fn embed_knowledge(
    knowledge: Vec<PartitionData>,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<EmbeddingIndex> {
    let mut index = EmbeddingIndex::new();
    for data in knowledge {
        let name = data.partition.clone();
        let started = Instant::now();
        let count = index
            .load(data.partition, data.questions, data.answers, provider, batch_size)
            .await
            .with_context(|| format!("Failed to load context {}", name))?;
        info!(
            context = %name,
            entries = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedded context"
        );
    }
    Ok(index)
}

/// Build the index for `config`, reusing a fresh snapshot when present.
pub async fn build_index(
    config: &Config,
    source: &dyn KnowledgeSource,
    provider: &dyn EmbeddingProvider,
) -> Result<EmbeddingIndex> {
    let knowledge = fetch_knowledge(source, &config.partitions()).await?;
    let model = model_key(provider);
    let fingerprint = snapshot::fingerprint(&model, &knowledge);

    if let Some(snap) = &config.snapshot {
        match snapshot::load(&snap.path, &model, &fingerprint) {
            Ok(Some(index)) => return Ok(index),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring unusable embedding snapshot"),
        }
    }

    let index = embed_knowledge(knowledge, provider, config.embedding.batch_size).await?;

    if let Some(snap) = &config.snapshot {
        if let Err(e) = snapshot::save(&snap.path, &index, &model, &fingerprint) {
            warn!(error = %e, "failed to write embedding snapshot");
        }
    }
    Ok(index)
}

/// Snapshot key for `provider`: the same model at another width is a
/// different embedding space.
fn model_key(provider: &dyn EmbeddingProvider) -> String {
    format!("{}/{}", provider.model_name(), provider.dims())
}

/// Build a ready-to-serve matcher from `config`.
///
/// Fails if the provider is disabled, the knowledge base is invalid, any
/// context cannot be embedded, or a reachable context has no entries.
pub async fn build_matcher(config: &Config) -> Result<FaqMatcher> {
    let provider = create_provider(&config.embedding)?;
    let source = TomlKnowledgeSource::load(&config.knowledge.path, &config.partitions())?;
    info!(
        path = %config.knowledge.path.display(),
        entries = source.len(),
        model = provider.model_name(),
        "loading knowledge base"
    );

    let index = build_index(config, &source, provider.as_ref()).await?;
    let matcher = FaqMatcher::new(Arc::new(index), provider, config.tracker()?)
        .with_policy(config.fallback_policy())
        .with_audit(create_audit_sink(&config.audit)?);
    matcher.validate()?;
    Ok(matcher)
}
