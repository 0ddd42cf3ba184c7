//! `murmur run`: push one message through the engine and print the reply.
//!
//! The message is treated as a private message, so it always runs the
//! orchestrator immediately. History and memory writes go to the
//! configured store and are flushed before exit.

use std::path::PathBuf;
use std::sync::Arc;

use mm_domain::config::Config;
use mm_domain::error::Result;
use mm_domain::ChatId;

use crate::bootstrap;
use crate::engine::Disposition;
use crate::platform::{ChatPlatform, InboundEvent, TextFormat};

pub const DEFAULT_CHAT_ID: ChatId = 1;
const CLI_USER_ID: i64 = 0;

/// Prints outbound messages to stdout.
struct ConsolePlatform;

#[async_trait::async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send_text(&self, _chat_id: ChatId, text: &str, _format: TextFormat) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    async fn send_photo(&self, _chat_id: ChatId, url: &str, caption: &str) -> Result<()> {
        println!("[image] {caption}\n{url}");
        Ok(())
    }

    async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
        Ok(())
    }
}

pub async fn run(
    config: Arc<Config>,
    config_path: PathBuf,
    message: String,
    chat_id: ChatId,
) -> anyhow::Result<()> {
    let shutdown_tx = Arc::new(tokio::sync::Notify::new());
    let state = bootstrap::build_app_state(
        config,
        config_path,
        shutdown_tx,
        Some(Arc::new(ConsolePlatform)),
    )
    .await?;

    let user_name = std::env::var("USER").unwrap_or_else(|_| "cli".into());
    let disposition = state
        .engine
        .handle_inbound(InboundEvent {
            chat_id,
            user_id: CLI_USER_ID,
            user_name,
            text: message,
            is_private: true,
            mentions_bot: false,
            reply_to_bot: false,
        })
        .await;

    if let Err(e) = state.store.flush_if_dirty().await {
        tracing::warn!(error = %e, "store flush failed");
    }

    match disposition {
        Disposition::Replied => Ok(()),
        Disposition::Silent => {
            eprintln!("(no reply)");
            Ok(())
        }
        Disposition::Failed => anyhow::bail!("the agent could not answer"),
        other => anyhow::bail!("unexpected outcome: {other:?}"),
    }
}
