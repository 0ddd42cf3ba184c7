//! Telegram Bot API connector.
//!
//! Long-polls `getUpdates`, normalizes each text message into an
//! [`InboundEvent`] and hands it to the [`ChatEngine`]. Implements
//! [`ChatPlatform`] over `sendMessage`, `sendPhoto` and `sendChatAction`.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use mm_domain::config::TelegramConfig;
use mm_domain::error::{Error, Result};
use mm_domain::ChatId;

use crate::engine::ChatEngine;
use crate::platform::{ChatPlatform, InboundEvent, TextFormat};

/// Telegram rejects messages longer than this.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const MAX_CAPTION_CHARS: usize = 1024;
const RETRY_DELAY: Duration = Duration::from_secs(5);

// ─── Bot API types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    pub from: Option<TgUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl TgUser {
    fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

/// The bot's own account, from `getMe`.
#[derive(Debug, Clone, PartialEq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    cfg: TelegramConfig,
}

impl TelegramClient {
    pub fn new(cfg: &TelegramConfig, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.poll_timeout_secs + 15))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base: format!("{}/bot{}", cfg.api_base.trim_end_matches('/'), token),
            cfg: cfg.clone(),
        })
    }

    /// Build a client when the token env var is set; `None` otherwise.
    pub fn from_env(cfg: &TelegramConfig) -> Result<Option<Self>> {
        match std::env::var(&cfg.token_env) {
            Ok(token) if !token.trim().is_empty() => Self::new(cfg, token.trim()).map(Some),
            _ => Ok(None),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let resp = self
            .http
            .post(format!("{}/{method}", self.base))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{method}: {e}")))?;
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("{method}: invalid response: {e}")))?;
        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Error::Platform(format!(
                "{method}: {}",
                parsed.description.unwrap_or_else(|| "request rejected".into())
            ))),
        }
    }

    pub async fn get_me(&self) -> Result<BotIdentity> {
        let me: TgUser = self.call("getMe", serde_json::json!({})).await?;
        Ok(BotIdentity {
            id: me.id,
            username: me.username.unwrap_or_default(),
        })
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": self.cfg.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Poll forever, spawning one engine call per accepted message.
    pub async fn run(self: Arc<Self>, engine: Arc<ChatEngine>) {
        let me = loop {
            match self.get_me().await {
                Ok(me) => break me,
                Err(e) => {
                    tracing::warn!(error = %e, "telegram getMe failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        };
        tracing::info!(bot_id = me.id, username = %me.username, "telegram polling started");

        let mut offset = 0i64;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(msg) = update.message else { continue };
                let Some(event) = to_inbound(&msg, &me) else { continue };
                if !self.cfg.is_chat_allowed(event.chat_id) {
                    tracing::debug!(chat_id = event.chat_id, "ignoring message from chat not on the allow-list");
                    continue;
                }
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let chat_id = event.chat_id;
                    let disposition = engine.handle_inbound(event).await;
                    tracing::debug!(chat_id, ?disposition, "telegram message handled");
                });
            }
        }
    }
}

/// Normalize a Telegram message. Returns `None` for non-text messages and
/// for messages from bots.
pub fn to_inbound(msg: &TgMessage, me: &BotIdentity) -> Option<InboundEvent> {
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    let text = msg.text.as_deref().or(msg.caption.as_deref())?.trim();
    if text.is_empty() {
        return None;
    }

    let mentions_bot = !me.username.is_empty()
        && text
            .to_lowercase()
            .contains(&format!("@{}", me.username.to_lowercase()));
    let reply_to_bot = msg
        .reply_to_message
        .as_ref()
        .and_then(|r| r.from.as_ref())
        .is_some_and(|u| u.id == me.id);

    Some(InboundEvent {
        chat_id: msg.chat.id,
        user_id: from.id,
        user_name: from.display_name(),
        text: text.to_string(),
        is_private: msg.chat.kind == "private",
        mentions_bot,
        reply_to_bot,
    })
}

/// Split `text` into chunks of at most `max` characters, preferring to
/// break at a newline.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };
        let cut = match remaining[..limit].rfind('\n') {
            Some(nl) if nl > 0 => nl,
            _ => limit,
        };
        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].strip_prefix('\n').unwrap_or(&remaining[cut..]);
    }
    chunks
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait::async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let mut body = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            if format == TextFormat::Markdown {
                body["parse_mode"] = "Markdown".into();
            }
            let _: serde_json::Value = self.call("sendMessage", body).await?;
        }
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendPhoto",
                serde_json::json!({
                    "chat_id": chat_id,
                    "photo": url,
                    "caption": truncate_chars(caption, MAX_CAPTION_CHARS),
                }),
            )
            .await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> BotIdentity {
        BotIdentity {
            id: 999,
            username: "MurmurBot".into(),
        }
    }

    fn parse(json: serde_json::Value) -> TgMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn group_mention_is_detected() {
        let msg = parse(serde_json::json!({
            "chat": { "id": -100, "type": "supergroup" },
            "from": { "id": 5, "first_name": "Ann", "last_name": "Lee" },
            "text": "hey @murmurbot what's the weather"
        }));
        let ev = to_inbound(&msg, &me()).unwrap();
        assert_eq!(ev.chat_id, -100);
        assert_eq!(ev.user_name, "Ann Lee");
        assert!(ev.mentions_bot);
        assert!(!ev.is_private);
        assert!(!ev.reply_to_bot);
    }

    #[test]
    fn reply_to_bot_and_private_chat() {
        let msg = parse(serde_json::json!({
            "chat": { "id": 5, "type": "private" },
            "from": { "id": 5, "first_name": "Ann" },
            "text": "thanks",
            "reply_to_message": {
                "chat": { "id": 5, "type": "private" },
                "from": { "id": 999, "is_bot": true, "first_name": "Murmur" },
                "text": "you're welcome"
            }
        }));
        let ev = to_inbound(&msg, &me()).unwrap();
        assert!(ev.is_private);
        assert!(ev.reply_to_bot);
        assert!(!ev.mentions_bot);
    }

    #[test]
    fn bots_and_empty_messages_are_ignored() {
        let from_bot = parse(serde_json::json!({
            "chat": { "id": 1, "type": "group" },
            "from": { "id": 2, "is_bot": true, "first_name": "Other" },
            "text": "beep"
        }));
        assert!(to_inbound(&from_bot, &me()).is_none());

        let sticker = parse(serde_json::json!({
            "chat": { "id": 1, "type": "group" },
            "from": { "id": 3, "first_name": "Ann" }
        }));
        assert!(to_inbound(&sticker, &me()).is_none());
    }

    #[test]
    fn long_text_splits_on_newlines() {
        let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert_eq!(chunks, vec!["a".repeat(3000), "b".repeat(3000)]);
    }

    #[test]
    fn split_without_newlines_respects_char_boundaries() {
        let text = "é".repeat(5000);
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
        assert_eq!(split_message("short", 10), vec!["short".to_string()]);
    }
}
