//! Chat platform contract: what the runtime receives and how it talks back.

use serde::{Deserialize, Serialize};

use mm_domain::error::Result;
use mm_domain::{ChatId, UserId};

use crate::runtime::turn::OrchestratorResult;

/// One message seen by the agent, normalized by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    /// One-to-one chat with the agent.
    #[serde(default)]
    pub is_private: bool,
    /// The message @-mentions the agent's account.
    #[serde(default)]
    pub mentions_bot: bool,
    /// The message replies to one of the agent's messages.
    #[serde(default)]
    pub reply_to_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Markdown,
    Plain,
}

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<()>;
    async fn send_photo(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()>;
    async fn send_typing(&self, chat_id: ChatId) -> Result<()>;
}

/// Send a text reply as Markdown, retrying once as plain text.
pub async fn send_reply(platform: &dyn ChatPlatform, chat_id: ChatId, text: &str) -> Result<()> {
    match platform.send_text(chat_id, text, TextFormat::Markdown).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(chat_id, error = %e, "formatted send failed, retrying as plain text");
            platform.send_text(chat_id, text, TextFormat::Plain).await
        }
    }
}

/// Deliver an orchestrator result: the attachment first, then the text.
///
/// A photo that cannot be sent is downgraded to a caption-and-link line.
pub async fn deliver(
    platform: &dyn ChatPlatform,
    chat_id: ChatId,
    result: &OrchestratorResult,
) -> Result<()> {
    if let Some(att) = &result.attachment {
        if let Err(e) = platform.send_photo(chat_id, &att.url, &att.caption).await {
            tracing::warn!(chat_id, error = %e, "photo send failed, sending link instead");
            platform
                .send_text(chat_id, &format!("{}\n{}", att.caption, att.url), TextFormat::Plain)
                .await?;
        }
    }
    if let Some(text) = &result.text {
        send_reply(platform, chat_id, text).await?;
    }
    Ok(())
}

/// Platform used when no connector is configured: outbound messages are
/// only logged.
#[derive(Debug, Default)]
pub struct LogPlatform;

#[async_trait::async_trait]
impl ChatPlatform for LogPlatform {
    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<()> {
        tracing::info!(chat_id, ?format, text, "outbound message");
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, url: &str, caption: &str) -> Result<()> {
        tracing::info!(chat_id, url, caption, "outbound photo");
        Ok(())
    }

    async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::turn::Attachment;
    use mm_domain::Error;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Picky {
        sent: Mutex<Vec<(String, TextFormat)>>,
        reject_markdown: bool,
        reject_photos: bool,
    }

    #[async_trait::async_trait]
    impl ChatPlatform for Picky {
        async fn send_text(&self, _chat_id: ChatId, text: &str, format: TextFormat) -> Result<()> {
            if self.reject_markdown && format == TextFormat::Markdown {
                return Err(Error::Platform("can't parse entities".into()));
            }
            self.sent.lock().push((text.to_string(), format));
            Ok(())
        }
        async fn send_photo(&self, _chat_id: ChatId, url: &str, _caption: &str) -> Result<()> {
            if self.reject_photos {
                return Err(Error::Platform("bad photo".into()));
            }
            self.sent.lock().push((format!("photo:{url}"), TextFormat::Plain));
            Ok(())
        }
        async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
            Ok(())
        }
    }

    fn result(text: Option<&str>, photo: bool) -> OrchestratorResult {
        OrchestratorResult {
            text: text.map(str::to_string),
            attachment: photo.then(|| Attachment {
                url: "https://img/x.png".into(),
                caption: "x".into(),
            }),
        }
    }

    #[tokio::test]
    async fn markdown_failure_retries_plain() {
        let p = Picky {
            reject_markdown: true,
            ..Default::default()
        };
        deliver(&p, 1, &result(Some("*hi*"), false)).await.unwrap();
        assert_eq!(*p.sent.lock(), vec![("*hi*".to_string(), TextFormat::Plain)]);
    }

    #[tokio::test]
    async fn photo_goes_first_and_falls_back_to_link() {
        let p = Picky::default();
        deliver(&p, 1, &result(Some("look"), true)).await.unwrap();
        let sent = p.sent.lock().clone();
        assert_eq!(sent[0].0, "photo:https://img/x.png");
        assert_eq!(sent[1], ("look".to_string(), TextFormat::Markdown));

        let p = Picky {
            reject_photos: true,
            ..Default::default()
        };
        deliver(&p, 1, &result(None, true)).await.unwrap();
        assert_eq!(p.sent.lock()[0].0, "x\nhttps://img/x.png");
    }
}
