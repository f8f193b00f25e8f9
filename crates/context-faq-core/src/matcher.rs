//! One question, one answer.
//!
//! [`FaqMatcher::answer`] runs a full turn:
//!
//! 1. [`ContextTracker::update`] picks the partition (and mutates the
//!    session's context and timestamp).
//! 2. [`EmbeddingIndex::query`] finds the closest stored question.
//! 3. [`FallbackPolicy`] replaces the answer when the score is below the
//!    unknown-answer threshold. The matched question and raw score are
//!    still reported.
//! 4. An [`AuditRecord`] goes to the [`AuditSink`]; sink failures are
//!    logged and swallowed.
//!
//! Embedding failures propagate unchanged and are never retried here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, NullAuditSink};
use crate::embedding::EmbeddingProvider;
use crate::error::FaqError;
use crate::index::EmbeddingIndex;
use crate::models::{MatchResult, SessionState};
use crate::tracker::ContextTracker;

/// Scores below this are answered with the fallback message.
pub const DEFAULT_UNKNOWN_THRESHOLD: f32 = 0.5;

pub const DEFAULT_FALLBACK_ANSWER: &str =
    "Sorry, I can't help with that yet. Try to ask another question!";

/// Unknown-answer policy.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    /// Exclusive lower bound: a score equal to the threshold is answered.
    pub threshold: f32,
    pub message: String,
}

impl FallbackPolicy {
    pub fn new(threshold: f32, message: impl Into<String>) -> Self {
        Self {
            threshold,
            message: message.into(),
        }
    }

    pub fn is_fallback(&self, score: f32) -> bool {
        // NaN compares false, so it is treated as low confidence explicitly.
        score.is_nan() || score < self.threshold
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_UNKNOWN_THRESHOLD, DEFAULT_FALLBACK_ANSWER)
    }
}

/// Context-aware FAQ matcher.
///
/// Cheap to share behind an `Arc`: the index is read-only and all
/// per-conversation state is passed in by the caller.
pub struct FaqMatcher {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    tracker: ContextTracker,
    policy: FallbackPolicy,
    audit: Arc<dyn AuditSink>,
}

impl FaqMatcher {
    /// Matcher with the default fallback policy and no audit sink.
    pub fn new(
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        tracker: ContextTracker,
    ) -> Self {
        Self {
            index,
            embedder,
            tracker,
            policy: FallbackPolicy::default(),
            audit: Arc::new(NullAuditSink),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Check that every partition the tracker can reach is loaded.
    ///
    /// Call once after building; a session can otherwise be moved into a
    /// partition that fails every query.
    pub fn validate(&self) -> Result<(), FaqError> {
        for partition in self.tracker.reachable_partitions() {
            if !self.index.contains(partition) {
                return Err(FaqError::configuration(format!(
                    "context {} can be entered but has no loaded knowledge",
                    partition
                )));
            }
        }
        Ok(())
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Answer `text` for the conversation owning `session`.
    ///
    /// `session` is updated (context and `last_activity`) even when the
    /// query itself fails.
    pub async fn answer(
        &self,
        session: &mut SessionState,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchResult, FaqError> {
        let context = self.tracker.update(session, text, now);

        let hit = self
            .index
            .query(&context, text, self.embedder.as_ref())
            .await?;

        let is_fallback = self.policy.is_fallback(hit.score);
        let answer = if is_fallback {
            self.policy.message.clone()
        } else {
            hit.entry.answer.clone()
        };

        let result = MatchResult {
            answer,
            matched_question: hit.entry.question.clone(),
            score: hit.score,
            context,
            is_fallback,
        };
        debug!(
            context = %result.context,
            score = result.score,
            is_fallback = result.is_fallback,
            "answered question"
        );

        let record = AuditRecord {
            turn_id: Uuid::new_v4(),
            received_at: now,
            question: text.to_string(),
            matched_question: result.matched_question.clone(),
            answer: result.answer.clone(),
            score: result.score,
            context: result.context.clone(),
            is_fallback: result.is_fallback,
            session: session.clone(),
        };
        if let Err(e) = self.audit.log(&record).await {
            warn!(turn_id = %record.turn_id, error = %e, "audit sink failed; continuing");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::models::Partition;
    use crate::test_support::ScriptedEmbedder;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    const OPEN_ACCOUNT: &str = "How do I open an account?";
    const HOURS: &str = "What are your hours?";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn log(&self, _record: &AuditRecord) -> anyhow::Result<()> {
            bail!("sheet is read-only")
        }
    }

    fn embedder() -> ScriptedEmbedder {
        ScriptedEmbedder::new(2)
            .one_hot(&[OPEN_ACCOUNT, HOURS])
            .query("When are you open?", &[0.2, 0.82])
            .query("asdkjaslkdj", &[0.1, 0.05])
            .query("borderline", &[0.5, 0.3])
            .query("gold card fees?", &[0.9, 0.1])
    }

    async fn matcher_with(
        embedder: ScriptedEmbedder,
        audit: Arc<dyn AuditSink>,
    ) -> FaqMatcher {
        let mut index = EmbeddingIndex::new();
        index
            .load(
                Partition::general(),
                vec![OPEN_ACCOUNT.to_string(), HOURS.to_string()],
                vec!["Visit any branch.".to_string(), "9am–5pm.".to_string()],
                &embedder,
                64,
            )
            .await
            .unwrap();
        index
            .load(
                Partition::goldcard(),
                vec![OPEN_ACCOUNT.to_string()],
                vec!["Apply online for a Gold Card.".to_string()],
                &embedder,
                64,
            )
            .await
            .unwrap();
        FaqMatcher::new(
            Arc::new(index),
            Arc::new(embedder),
            ContextTracker::default(),
        )
        .with_audit(audit)
    }

    #[tokio::test]
    async fn test_confident_match() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "When are you open?", t0())
            .await
            .unwrap();
        assert_eq!(result.answer, "9am–5pm.");
        assert_eq!(result.matched_question, HOURS);
        assert!((result.score - 0.82).abs() < 1e-6);
        assert_eq!(result.context, Partition::general());
        assert!(!result.is_fallback);
    }

    #[tokio::test]
    async fn test_low_score_falls_back_but_reports_match() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "asdkjaslkdj", t0())
            .await
            .unwrap();
        assert!(result.is_fallback);
        assert_eq!(result.answer, DEFAULT_FALLBACK_ANSWER);
        assert_eq!(result.matched_question, OPEN_ACCOUNT);
        assert!((result.score - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "borderline", t0())
            .await
            .unwrap();
        assert_eq!(result.score, 0.5);
        assert!(!result.is_fallback);
        assert_eq!(result.answer, "Visit any branch.");
    }

    #[test]
    fn test_policy_treats_nan_as_fallback() {
        let policy = FallbackPolicy::default();
        assert!(policy.is_fallback(f32::NAN));
        assert!(policy.is_fallback(0.4999));
        assert!(!policy.is_fallback(0.5));
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink))
            .await
            .with_policy(FallbackPolicy::new(0.9, "Ask a human."));
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "When are you open?", t0())
            .await
            .unwrap();
        assert!(result.is_fallback);
        assert_eq!(result.answer, "Ask a human.");
    }

    #[tokio::test]
    async fn test_trigger_routes_to_goldcard_partition() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "gold card fees?", t0())
            .await
            .unwrap();
        assert_eq!(result.context, Partition::goldcard());
        assert_eq!(result.answer, "Apply online for a Gold Card.");
        assert_eq!(session.active_context, Partition::goldcard());
        assert_eq!(session.last_activity, Some(t0()));
    }

    #[tokio::test]
    async fn test_answer_is_deterministic_for_same_snapshot() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let snapshot = SessionState {
            last_activity: Some(t0()),
            active_context: Partition::goldcard(),
            ..SessionState::default()
        };
        let now = t0() + Duration::seconds(400);

        let mut first = snapshot.clone();
        let mut second = snapshot.clone();
        let a = matcher
            .answer(&mut first, "When are you open?", now)
            .await
            .unwrap();
        let b = matcher
            .answer(&mut second, "When are you open?", now)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(first, second);
        assert_eq!(a.context, Partition::general());
    }

    #[tokio::test]
    async fn test_audit_record_written() {
        let sink = Arc::new(MemoryAuditSink::new());
        let matcher = matcher_with(embedder(), sink.clone()).await;
        let mut session = SessionState::default();

        matcher
            .answer(&mut session, "asdkjaslkdj", t0())
            .await
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.question, "asdkjaslkdj");
        assert_eq!(r.matched_question, OPEN_ACCOUNT);
        assert_eq!(r.answer, DEFAULT_FALLBACK_ANSWER);
        assert!(r.is_fallback);
        assert_eq!(r.session.last_activity, Some(t0()));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_turn() {
        let matcher = matcher_with(embedder(), Arc::new(FailingSink)).await;
        let mut session = SessionState::default();

        let result = matcher
            .answer(&mut session, "When are you open?", t0())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let matcher = matcher_with(embedder(), Arc::new(NullAuditSink)).await;
        let mut session = SessionState::default();

        let err = matcher
            .answer(&mut session, "unscripted text", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, FaqError::EmbeddingService(_)));
        assert_eq!(session.last_activity, Some(t0()));
    }

    #[tokio::test]
    async fn test_validate_flags_unloaded_trigger_target() {
        let embedder = embedder();
        let mut index = EmbeddingIndex::new();
        index
            .load(
                Partition::general(),
                vec![HOURS.to_string()],
                vec!["9am–5pm.".to_string()],
                &embedder,
                64,
            )
            .await
            .unwrap();
        let matcher = FaqMatcher::new(
            Arc::new(index),
            Arc::new(embedder),
            ContextTracker::default(),
        );
        assert!(matches!(
            matcher.validate(),
            Err(FaqError::Configuration(_))
        ));
    }
}
