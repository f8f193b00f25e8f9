use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use context_faq_core::matcher::{FallbackPolicy, DEFAULT_FALLBACK_ANSWER, DEFAULT_UNKNOWN_THRESHOLD};
use context_faq_core::tracker::{ContextTracker, TriggerRule, GOLD_CARD_PATTERN};
use context_faq_core::Partition;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_contexts")]
    pub contexts: Vec<ContextConfig>,
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub snapshot: Option<SnapshotConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_unknown_threshold")]
    pub unknown_threshold: f32,
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            unknown_threshold: default_unknown_threshold(),
            fallback_answer: default_fallback_answer(),
        }
    }
}

fn default_unknown_threshold() -> f32 {
    DEFAULT_UNKNOWN_THRESHOLD
}
fn default_fallback_answer() -> String {
    DEFAULT_FALLBACK_ANSWER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_timeout_secs_session")]
    pub timeout_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_context_name")]
    pub default_context: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs_session(),
            retention_secs: default_retention_secs(),
            default_context: default_context_name(),
        }
    }
}

fn default_timeout_secs_session() -> u64 {
    300
}
fn default_retention_secs() -> u64 {
    86_400
}
fn default_context_name() -> String {
    Partition::GENERAL.to_string()
}

/// A declared knowledge-base partition and the patterns that switch a
/// session into it. Declaration order is trigger priority order.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<String>,
}

fn default_contexts() -> Vec<ContextConfig> {
    vec![
        ContextConfig {
            name: Partition::GENERAL.to_string(),
            triggers: Vec::new(),
        },
        ContextConfig {
            name: Partition::GOLDCARD.to_string(),
            triggers: vec![GOLD_CARD_PATTERN.to_string()],
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_sink")]
    pub sink: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_audit_sink(),
            path: None,
        }
    }
}

fn default_audit_sink() -> String {
    "tracing".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on one `/answer` request, embedding call included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Declared partitions in priority order.
    pub fn partitions(&self) -> Vec<Partition> {
        self.contexts
            .iter()
            .map(|c| Partition::new(c.name.as_str()))
            .collect()
    }

    pub fn default_partition(&self) -> Partition {
        Partition::new(self.session.default_context.as_str())
    }

    /// Build the context tracker from `[session]` and `[[contexts]]`.
    pub fn tracker(&self) -> Result<ContextTracker> {
        let timeout = Duration::seconds(self.session.timeout_secs as i64);
        let mut tracker = ContextTracker::new(self.default_partition(), timeout);
        for context in &self.contexts {
            for pattern in &context.triggers {
                let rule = TriggerRule::new(pattern, Partition::new(context.name.as_str()))?;
                tracker = tracker.with_trigger(rule);
            }
        }
        Ok(tracker)
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::new(
            self.matcher.unknown_threshold,
            self.matcher.fallback_answer.clone(),
        )
    }

    /// Resolve relative paths against the directory holding the config file.
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.knowledge.path);
        if let Some(path) = self.audit.path.as_mut() {
            resolve(path);
        }
        if let Some(snapshot) = self.snapshot.as_mut() {
            resolve(&mut snapshot.path);
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// Relative paths are left as written.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate matcher
    if !config.matcher.unknown_threshold.is_finite() {
        bail!("matcher.unknown_threshold must be a finite number");
    }
    if config.matcher.fallback_answer.trim().is_empty() {
        bail!("matcher.fallback_answer must not be empty");
    }

    // Validate session
    if config.session.timeout_secs == 0 {
        bail!("session.timeout_secs must be > 0");
    }
    if config.session.timeout_secs > i64::MAX as u64 / 1000 {
        bail!("session.timeout_secs is too large");
    }
    if config.session.retention_secs > i64::MAX as u64 / 1000 {
        bail!("session.retention_secs is too large");
    }

    // Validate contexts
    if config.contexts.is_empty() {
        bail!("at least one [[contexts]] entry is required");
    }
    let mut seen = HashSet::new();
    for context in &config.contexts {
        if context.name.trim().is_empty() {
            bail!("contexts.name must not be empty");
        }
        if !seen.insert(context.name.as_str()) {
            bail!("context '{}' is declared twice", context.name);
        }
    }
    if !seen.contains(config.session.default_context.as_str()) {
        bail!(
            "session.default_context '{}' is not a declared context",
            config.session.default_context
        );
    }
    config.tracker()?;

    if config.server.request_timeout_secs == 0 {
        bail!("server.request_timeout_secs must be > 0");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "hashed" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'hashed'");
            }
        }
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashed, openai, ollama, or local.",
            other
        ),
    }

    // Validate audit
    match config.audit.sink.as_str() {
        "tracing" | "disabled" => {}
        "jsonl" => {
            if config.audit.path.is_none() {
                bail!("audit.path must be set when audit.sink is 'jsonl'");
            }
        }
        other => bail!(
            "Unknown audit sink: '{}'. Must be tracing, jsonl, or disabled.",
            other
        ),
    }

    Ok(config)
}
