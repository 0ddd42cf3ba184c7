//! MemoryStore — in-process chat state with JSON snapshot persistence.
//!
//! All reads and writes hit the in-memory maps. Mutations set a dirty flag;
//! [`MemoryStore::flush_if_dirty`] rewrites the snapshot file (periodically
//! from a background task and once on shutdown).

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use mm_domain::error::{Error, Result};
use mm_domain::{ChatId, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Fact, HistoryEntry, NewReminder, Relationship, ReminderRecord};
use crate::ChatStore;

const DEFAULT_HISTORY_CAP: usize = 500;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatRecord {
    #[serde(default)]
    history: VecDeque<HistoryEntry>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    facts: Vec<Fact>,
    #[serde(default)]
    reputation: HashMap<UserId, i64>,
    #[serde(default)]
    relationships: HashMap<UserId, Relationship>,
    #[serde(default)]
    settings: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    chats: HashMap<ChatId, ChatRecord>,
    #[serde(default)]
    reminders: Vec<ReminderRecord>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryStore {
    inner: RwLock<Snapshot>,
    persist_path: Option<PathBuf>,
    dirty: AtomicBool,
    history_cap: usize,
}

impl MemoryStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Snapshot::default()),
            persist_path: None,
            dirty: AtomicBool::new(false),
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }

    /// Open (or create) a store backed by the snapshot file at `path`.
    ///
    /// A missing file starts empty. A corrupt file is an error so that a
    /// later flush cannot silently overwrite it.
    pub fn open(path: impl Into<PathBuf>, history_cap: usize) -> Result<Self> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<Snapshot>(&data).map_err(|e| {
                Error::Store(format!("corrupt snapshot {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            path = %path.display(),
            chats = snapshot.chats.len(),
            reminders = snapshot.reminders.len(),
            "loaded chat store"
        );
        Ok(Self {
            inner: RwLock::new(snapshot),
            persist_path: Some(path),
            dirty: AtomicBool::new(false),
            history_cap: history_cap.max(1),
        })
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap.max(1);
        self
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the snapshot if anything changed since the last flush.
    /// Returns whether a write happened.
    pub async fn flush_if_dirty(&self) -> Result<bool> {
        let Some(path) = self.persist_path.clone() else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let json = {
            let snapshot = self.inner.read();
            serde_json::to_string(&*snapshot)?
        };

        let result = tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| Error::Store(format!("flush task failed: {e}")))
            .and_then(|r| r);

        if let Err(ref e) = result {
            // Retry on the next tick.
            self.dirty.store(true, Ordering::Release);
            tracing::warn!(error = %e, "failed to persist chat store");
        }
        result.map(|_| true)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let out = {
            let mut guard = self.inner.write();
            f(&mut *guard)
        };
        self.dirty.store(true, Ordering::Release);
        out
    }

    fn mutate_chat<T>(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatRecord) -> T) -> T {
        self.mutate(|s| f(s.chats.entry(chat_id).or_default()))
    }

    fn read_chat<T>(&self, chat_id: ChatId, f: impl FnOnce(Option<&ChatRecord>) -> T) -> T {
        f(self.inner.read().chats.get(&chat_id))
    }
}

fn write_atomic(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn matches_query(text: &str, query: &str) -> bool {
    let haystack = text.to_lowercase();
    query
        .split_whitespace()
        .all(|word| haystack.contains(&word.to_lowercase()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatStore implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatStore for MemoryStore {
    async fn append_history(&self, chat_id: ChatId, entry: HistoryEntry) -> Result<()> {
        let cap = self.history_cap;
        self.mutate_chat(chat_id, |c| {
            c.history.push_back(entry);
            while c.history.len() > cap {
                c.history.pop_front();
            }
        });
        Ok(())
    }

    async fn recent_history(&self, chat_id: ChatId, limit: usize) -> Result<Vec<HistoryEntry>> {
        Ok(self.read_chat(chat_id, |c| {
            c.map(|c| {
                let skip = c.history.len().saturating_sub(limit);
                c.history.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
        }))
    }

    async fn chat_summary(&self, chat_id: ChatId) -> Result<Option<String>> {
        Ok(self.read_chat(chat_id, |c| c.and_then(|c| c.summary.clone())))
    }

    async fn set_chat_summary(&self, chat_id: ChatId, summary: &str) -> Result<()> {
        self.mutate_chat(chat_id, |c| c.summary = Some(summary.to_string()));
        Ok(())
    }

    async fn remember_fact(
        &self,
        chat_id: ChatId,
        fact: &str,
        about_user_id: Option<UserId>,
    ) -> Result<()> {
        let text = fact.trim();
        if text.is_empty() {
            return Err(Error::Store("fact must not be empty".into()));
        }
        self.mutate_chat(chat_id, |c| {
            // Re-remembering the same fact refreshes it instead of duplicating.
            c.facts
                .retain(|f| !(f.text.eq_ignore_ascii_case(text) && f.about_user_id == about_user_id));
            c.facts.push(Fact {
                text: text.to_string(),
                about_user_id,
                at: Utc::now(),
            });
        });
        Ok(())
    }

    async fn facts(&self, chat_id: ChatId, query: Option<&str>, limit: usize) -> Result<Vec<Fact>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        Ok(self.read_chat(chat_id, |c| {
            c.map(|c| {
                c.facts
                    .iter()
                    .rev()
                    .filter(|f| query.map_or(true, |q| matches_query(&f.text, q)))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
        }))
    }

    async fn adjust_reputation(&self, chat_id: ChatId, user_id: UserId, delta: i64) -> Result<i64> {
        Ok(self.mutate_chat(chat_id, |c| {
            let score = c.reputation.entry(user_id).or_insert(0);
            *score = score.saturating_add(delta);
            *score
        }))
    }

    async fn reputation(&self, chat_id: ChatId, user_id: UserId) -> Result<i64> {
        Ok(self.read_chat(chat_id, |c| {
            c.and_then(|c| c.reputation.get(&user_id).copied())
                .unwrap_or(0)
        }))
    }

    async fn reputations(&self, chat_id: ChatId) -> Result<Vec<(UserId, i64)>> {
        let mut scores: Vec<(UserId, i64)> = self.read_chat(chat_id, |c| {
            c.map(|c| {
                c.reputation
                    .iter()
                    .filter(|(_, s)| **s != 0)
                    .map(|(u, s)| (*u, *s))
                    .collect()
            })
            .unwrap_or_default()
        });
        scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(scores)
    }

    async fn set_relationship(&self, chat_id: ChatId, user_id: UserId, note: &str) -> Result<()> {
        self.mutate_chat(chat_id, |c| {
            c.relationships.insert(
                user_id,
                Relationship {
                    user_id,
                    note: note.trim().to_string(),
                    updated_at: Utc::now(),
                },
            );
        });
        Ok(())
    }

    async fn relationships(&self, chat_id: ChatId) -> Result<Vec<Relationship>> {
        let mut rels: Vec<Relationship> = self.read_chat(chat_id, |c| {
            c.map(|c| c.relationships.values().cloned().collect())
                .unwrap_or_default()
        });
        rels.sort_by_key(|r| r.user_id);
        Ok(rels)
    }

    async fn setting(&self, chat_id: ChatId, key: &str) -> Result<Option<String>> {
        Ok(self.read_chat(chat_id, |c| c.and_then(|c| c.settings.get(key).cloned())))
    }

    async fn set_setting(&self, chat_id: ChatId, key: &str, value: &str) -> Result<()> {
        self.mutate_chat(chat_id, |c| {
            c.settings.insert(key.to_string(), value.to_string());
        });
        Ok(())
    }

    async fn create_reminder(&self, reminder: NewReminder) -> Result<ReminderRecord> {
        let record = ReminderRecord {
            id: Uuid::new_v4(),
            chat_id: reminder.chat_id,
            user_id: reminder.user_id,
            text: reminder.text,
            due_at: reminder.due_at,
            sent: false,
            created_at: Utc::now(),
        };
        self.mutate(|s| s.reminders.push(record.clone()));
        tracing::debug!(
            reminder_id = %record.id,
            chat_id = record.chat_id,
            due_at = %record.due_at,
            "reminder stored"
        );
        Ok(record)
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>> {
        let mut due: Vec<ReminderRecord> = self
            .inner
            .read()
            .reminders
            .iter()
            .filter(|r| !r.sent && r.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.due_at);
        Ok(due)
    }

    async fn mark_reminder_sent(&self, id: Uuid) -> Result<()> {
        self.mutate(|s| match s.reminders.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.sent = true;
                Ok(())
            }
            None => Err(Error::Store(format!("unknown reminder {id}"))),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
