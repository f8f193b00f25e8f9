//! Per-conversation session registry.
//!
//! Each conversation id maps to its own [`SessionState`] behind an async
//! mutex. Turns of the same conversation therefore run one at a time,
//! while different conversations proceed in parallel.
//!
//! Sessions idle for longer than the retention window are dropped by
//! [`SessionRegistry::sweep`]. A dropped session simply starts over in the
//! default context, which is also what the context timeout would do.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::debug;

use context_faq_core::clock::Clock;
use context_faq_core::{Partition, SessionState};

pub type SessionHandle = Arc<AsyncMutex<SessionState>>;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    default_context: Partition,
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(default_context: Partition, retention: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            default_context,
            retention,
        }
    }

    /// Session for `conversation_id`, created in the default context on
    /// first use.
    pub fn get(&self, conversation_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(SessionState::new(self.default_context.clone()))))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle for longer than the retention window.
    ///
    /// Sessions mid-turn are skipped. Returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, handle| {
            // A turn between `get` and `lock` still holds a clone.
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(state) => match state.last_activity {
                    Some(last) => now - last <= self.retention,
                    None => false,
                },
                Err(_) => true,
            }
        });
        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(dropped, remaining = sessions.len(), "swept idle sessions");
        }
        dropped
    }

    /// Run [`sweep`](Self::sweep) every `every` until the task is aborted.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        every: StdDuration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep(clock.now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_same_id_shares_state() {
        let registry = SessionRegistry::new(Partition::general(), Duration::hours(1));
        registry.get("c1").lock().await.active_context = Partition::goldcard();

        assert_eq!(
            registry.get("c1").lock().await.active_context,
            Partition::goldcard()
        );
        assert_eq!(
            registry.get("c2").lock().await.active_context,
            Partition::general()
        );
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_idle_sessions() {
        let registry = SessionRegistry::new(Partition::general(), Duration::hours(1));
        registry.get("old").lock().await.last_activity = Some(t0());
        registry.get("recent").lock().await.last_activity = Some(t0() + Duration::minutes(50));

        assert_eq!(registry.sweep(t0() + Duration::minutes(61)), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("recent").lock().await.last_activity.is_some());
    }

    #[tokio::test]
    async fn test_sweep_keeps_session_held_by_pending_turn() {
        let registry = SessionRegistry::new(Partition::general(), Duration::hours(1));
        let pending = registry.get("c1");

        assert_eq!(registry.sweep(t0()), 0);

        pending.lock().await.active_context = Partition::goldcard();
        let next = registry.get("c1");
        assert!(Arc::ptr_eq(&pending, &next));
        assert_eq!(next.lock().await.active_context, Partition::goldcard());
    }

    #[tokio::test]
    async fn test_sweep_skips_locked_sessions() {
        let registry = SessionRegistry::new(Partition::general(), Duration::hours(1));
        let handle = registry.get("busy");
        let _guard = handle.lock().await;

        assert_eq!(registry.sweep(t0() + Duration::days(1)), 0);
        assert_eq!(registry.len(), 1);
    }
}
