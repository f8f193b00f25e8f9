//! Session context detection.
//!
//! [`ContextTracker`] decides, once per incoming turn, which partition the
//! question is matched against. The rules are evaluated in this order:
//!
//! 1. **Timeout**: if the session has been idle for longer than the
//!    configured timeout, it falls back to the default partition.
//! 2. **Trigger**: the first trigger rule (in declared order) whose
//!    pattern matches the text moves the session to that rule's
//!    partition. A trigger overrides a timeout fired in the same turn.
//! 3. Otherwise the active partition is kept.
//!
//! The session's `last_activity` is then set to `now`, whatever happened.

use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::FaqError;
use crate::models::{Partition, SessionState};

/// Idle time after which a specialised context expires.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 300;

/// Pattern of the built-in gold card trigger.
pub const GOLD_CARD_PATTERN: &str = "gold card";

/// A case-insensitive pattern that switches a session to a partition.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pattern: Regex,
    partition: Partition,
}

impl TriggerRule {
    /// Compile `pattern` as a case-insensitive regular expression.
    ///
    /// The pattern may match anywhere in the text.
    pub fn new(pattern: &str, partition: Partition) -> Result<Self, FaqError> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                FaqError::configuration(format!(
                    "invalid trigger pattern for {}: {}",
                    partition, e
                ))
            })?;
        Ok(Self { pattern, partition })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }
}

/// Why a turn ended up in its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No rule fired; the previous partition is kept.
    Unchanged,
    /// The idle timeout reset the session to the default partition.
    TimedOut,
    /// The trigger rule at this priority position matched.
    Triggered(usize),
}

/// Per-turn context state machine.
///
/// Holds no per-session data itself; the state lives in the
/// [`SessionState`] passed to [`update`](ContextTracker::update), so one
/// tracker serves every conversation.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    default_context: Partition,
    timeout: Duration,
    triggers: Vec<TriggerRule>,
}

impl ContextTracker {
    /// Tracker with no trigger rules.
    pub fn new(default_context: Partition, timeout: Duration) -> Self {
        Self {
            default_context,
            timeout,
            triggers: Vec::new(),
        }
    }

    /// Append a trigger rule; earlier rules take priority.
    pub fn with_trigger(mut self, rule: TriggerRule) -> Self {
        self.triggers.push(rule);
        self
    }

    pub fn default_context(&self) -> &Partition {
        &self.default_context
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn triggers(&self) -> &[TriggerRule] {
        &self.triggers
    }

    /// Partitions this tracker can move a session into.
    pub fn reachable_partitions(&self) -> Vec<&Partition> {
        let mut out = vec![&self.default_context];
        for rule in &self.triggers {
            if !out.contains(&rule.partition()) {
                out.push(rule.partition());
            }
        }
        out
    }

    /// Compute the transition for a turn without touching the session.
    pub fn detect(&self, session: &SessionState, text: &str, now: DateTime<Utc>) -> Transition {
        if let Some(position) = self.triggers.iter().position(|r| r.matches(text)) {
            return Transition::Triggered(position);
        }
        if self.is_expired(session, now) {
            return Transition::TimedOut;
        }
        Transition::Unchanged
    }

    /// Apply one turn to `session` and return the partition to match in.
    ///
    /// Sets `session.last_activity` to `now` unconditionally.
    pub fn update(&self, session: &mut SessionState, text: &str, now: DateTime<Utc>) -> Partition {
        let transition = self.detect(session, text, now);
        let previous = session.active_context.clone();

        match transition {
            Transition::Triggered(position) => {
                session.active_context = self.triggers[position].partition().clone();
            }
            Transition::TimedOut => {
                session.active_context = self.default_context.clone();
            }
            Transition::Unchanged => {}
        }
        session.last_activity = Some(now);

        if session.active_context != previous {
            debug!(
                from = %previous,
                to = %session.active_context,
                ?transition,
                "session context changed"
            );
        }
        session.active_context.clone()
    }

    fn is_expired(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        match session.last_activity {
            Some(last) => now.signed_duration_since(last) > self.timeout,
            None => false,
        }
    }
}

impl Default for ContextTracker {
    /// `GENERAL` by default, 300 s timeout, `"gold card"` → `GOLDCARD`.
    fn default() -> Self {
        let gold_card = TriggerRule::new(GOLD_CARD_PATTERN, Partition::goldcard())
            .expect("built-in trigger pattern compiles");
        Self::new(
            Partition::general(),
            Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
        )
        .with_trigger(gold_card)
    }
}
