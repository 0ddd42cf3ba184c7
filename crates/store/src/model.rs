use chrono::{DateTime, Utc};
use mm_domain::{ChatId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// One line of chat history as seen by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    /// Display name of the author (the persona name for agent lines).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn user(user_id: UserId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            name: name.into(),
            user_id: Some(user_id),
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn agent(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            name: name.into(),
            user_id: None,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// A remembered fact, optionally about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_user_id: Option<UserId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub user_id: UserId,
    pub note: String,
    pub updated_at: DateTime<Utc>,
}

/// A scheduled reminder. Delivered rows are flagged, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: Uuid,
    pub chat_id: ChatId,
    /// Who asked for it; `None` for reminders set during spontaneous runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub text: String,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::ChatStore::create_reminder`].
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub text: String,
    pub due_at: DateTime<Utc>,
}
