//! Configuration checks and snapshot maintenance.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::{build_index, build_matcher};
use crate::knowledge::TomlKnowledgeSource;

/// Build the matcher exactly as `serve` would and print what was loaded.
pub async fn run_check(config: &Config) -> Result<()> {
    let matcher = build_matcher(config).await?;
    let tracker = matcher.tracker();

    println!("Knowledge base: {}", config.knowledge.path.display());
    println!(
        "Fallback below {:.2}: {:?}",
        matcher.policy().threshold,
        matcher.policy().message
    );
    println!(
        "Context timeout: {}s (default {})",
        tracker.timeout().num_seconds(),
        tracker.default_context()
    );
    println!("{:<12} {:>8}  TRIGGERS", "CONTEXT", "ENTRIES");
    for (partition, entries) in matcher.index().partitions() {
        let triggers: Vec<&str> = tracker
            .triggers()
            .iter()
            .filter(|t| t.partition() == partition)
            .map(|t| t.pattern())
            .collect();
        println!("{:<12} {:>8}  {}", partition, entries, triggers.join(", "));
    }
    println!("OK");
    Ok(())
}

/// Rebuild the embedding snapshot from the knowledge base.
///
/// Any existing snapshot is discarded first, so this always re-embeds.
pub async fn run_snapshot(config: &Config) -> Result<()> {
    let Some(snapshot) = &config.snapshot else {
        bail!("No [snapshot] section in config");
    };
    if snapshot.path.exists() {
        std::fs::remove_file(&snapshot.path)?;
    }

    let provider = create_provider(&config.embedding)?;
    let source = TomlKnowledgeSource::load(&config.knowledge.path, &config.partitions())?;
    let index = build_index(config, &source, provider.as_ref()).await?;

    if !snapshot.path.exists() {
        bail!("Failed to write snapshot: {}", snapshot.path.display());
    }
    let entries: usize = index.partitions().map(|(_, n)| n).sum();
    println!(
        "Wrote {} entries ({} dims) to {}",
        entries,
        index.dims().unwrap_or(0),
        snapshot.path.display()
    );
    Ok(())
}
