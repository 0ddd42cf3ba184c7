//! Persistent chat state: history, summaries, facts, reputation,
//! relationships, per-chat settings and reminders.

pub mod memory;
pub mod model;

pub use memory::MemoryStore;
pub use model::{Fact, HistoryEntry, NewReminder, Relationship, ReminderRecord, Speaker};

use chrono::{DateTime, Utc};
use mm_domain::error::Result;
use mm_domain::{ChatId, UserId};
use uuid::Uuid;

/// Storage contract consumed by the runtime.
///
/// Implementations must be read-after-write consistent within the process:
/// a reminder created by a tool call is visible to the next poller sweep.
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    // ── history ────────────────────────────────────────────────────
    async fn append_history(&self, chat_id: ChatId, entry: HistoryEntry) -> Result<()>;
    /// Newest `limit` entries, oldest first.
    async fn recent_history(&self, chat_id: ChatId, limit: usize) -> Result<Vec<HistoryEntry>>;

    // ── standing summary ───────────────────────────────────────────
    async fn chat_summary(&self, chat_id: ChatId) -> Result<Option<String>>;
    async fn set_chat_summary(&self, chat_id: ChatId, summary: &str) -> Result<()>;

    // ── facts ──────────────────────────────────────────────────────
    async fn remember_fact(
        &self,
        chat_id: ChatId,
        fact: &str,
        about_user_id: Option<UserId>,
    ) -> Result<()>;
    /// Facts matching every word of `query` (case-insensitive), newest first.
    async fn facts(&self, chat_id: ChatId, query: Option<&str>, limit: usize) -> Result<Vec<Fact>>;

    // ── reputation ─────────────────────────────────────────────────
    /// Apply `delta` and return the new score.
    async fn adjust_reputation(&self, chat_id: ChatId, user_id: UserId, delta: i64) -> Result<i64>;
    async fn reputation(&self, chat_id: ChatId, user_id: UserId) -> Result<i64>;
    /// Every non-zero score in the chat, highest first.
    async fn reputations(&self, chat_id: ChatId) -> Result<Vec<(UserId, i64)>>;

    // ── relationships ──────────────────────────────────────────────
    async fn set_relationship(&self, chat_id: ChatId, user_id: UserId, note: &str) -> Result<()>;
    async fn relationships(&self, chat_id: ChatId) -> Result<Vec<Relationship>>;

    // ── settings ───────────────────────────────────────────────────
    async fn setting(&self, chat_id: ChatId, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, chat_id: ChatId, key: &str, value: &str) -> Result<()>;

    // ── reminders ──────────────────────────────────────────────────
    async fn create_reminder(&self, reminder: NewReminder) -> Result<ReminderRecord>;
    /// Unsent reminders with `due_at <= now`, earliest first.
    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>>;
    async fn mark_reminder_sent(&self, id: Uuid) -> Result<()>;
}
