//! Per-chat session objects and the registry that owns them.
//!
//! A [`ChatSession`] bundles everything the scheduling layer tracks for one
//! chat: the run lock, the pending passive batch, the idle timer and the
//! reply-chance accumulator. Nothing here is persisted; timers re-arm on
//! the next message after a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;

use mm_domain::ChatId;

use super::batching::PassiveBatch;
use super::idle::IdleTimer;
use super::reply_chance::ReplyChance;
use super::session_lock::ChatLock;

pub struct ChatSession {
    chat_id: ChatId,
    lock: ChatLock,
    batch: PassiveBatch,
    idle: IdleTimer,
    reply_chance: Mutex<ReplyChance>,
    last_activity: Mutex<Instant>,
    created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            lock: ChatLock::new(),
            batch: PassiveBatch::default(),
            idle: IdleTimer::default(),
            reply_chance: Mutex::new(ReplyChance::default()),
            last_activity: Mutex::new(Instant::now()),
            created_at: Utc::now(),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn lock(&self) -> &ChatLock {
        &self.lock
    }

    pub fn batch(&self) -> &PassiveBatch {
        &self.batch
    }

    pub fn idle(&self) -> &IdleTimer {
        &self.idle
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Feed a flushed batch into the reply-chance accumulator.
    pub fn register_passive(&self, count: u32, probability: f64) -> bool {
        self.reply_chance.lock().register(count, probability)
    }

    /// No run in flight and no timer that still needs this session.
    pub fn is_quiescent(&self) -> bool {
        !self.lock.is_held() && self.batch.pending_count().is_none() && !self.idle.is_armed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chat_id: self.chat_id,
            busy: self.lock.is_held(),
            pending_batch: self.batch.pending_count(),
            idle_armed: self.idle.is_armed(),
            idle_secs: self.idle_for().as_secs(),
            created_at: self.created_at,
        }
    }
}

/// Read-only view served by the sessions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub chat_id: ChatId,
    pub busy: bool,
    pub pending_batch: Option<u32>,
    pub idle_armed: bool,
    pub idle_secs: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ChatId, Arc<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, chat_id: ChatId) -> Arc<ChatSession> {
        if let Some(s) = self.sessions.read().get(&chat_id) {
            return Arc::clone(s);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(chat_id)
                .or_insert_with(|| Arc::new(ChatSession::new(chat_id))),
        )
    }

    pub fn get(&self, chat_id: ChatId) -> Option<Arc<ChatSession>> {
        self.sessions.read().get(&chat_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshots of every session, ordered by chat id.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut out: Vec<SessionSnapshot> = self.sessions.read().values().map(|s| s.snapshot()).collect();
        out.sort_by_key(|s| s.chat_id);
        out
    }

    /// Drop sessions idle for longer than `ttl` that nothing else holds.
    /// Returns how many were removed.
    pub fn prune_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| Arc::strong_count(s) > 1 || !s.is_quiescent() || s.idle_for() < ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = sessions.len(), "pruned idle chat sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_session() {
        let reg = SessionRegistry::new();
        let a = reg.get_or_create(1);
        let b = reg.get_or_create(1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(reg.get(2).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn prune_skips_busy_and_recent_sessions() {
        let reg = SessionRegistry::new();
        let ttl = Duration::from_secs(60);

        drop(reg.get_or_create(1));
        let busy = reg.get_or_create(2);
        let permit = busy.lock().try_acquire().unwrap();
        drop(busy);

        tokio::time::sleep(ttl * 2).await;
        drop(reg.get_or_create(3));

        assert_eq!(reg.prune_idle(ttl), 1);
        let left: Vec<_> = reg.snapshot().into_iter().map(|s| s.chat_id).collect();
        assert_eq!(left, vec![2, 3]);
        assert!(reg.snapshot()[0].busy);

        drop(permit);
        tokio::time::sleep(ttl * 2).await;
        assert_eq!(reg.prune_idle(ttl), 2);
        assert!(reg.is_empty());
    }
}
