use std::path::PathBuf;
use std::sync::Arc;

use mm_domain::config::Config;
use mm_providers::registry::ProviderRegistry;
use mm_store::{ChatStore, MemoryStore};

use crate::engine::ChatEngine;
use crate::platform::ChatPlatform;
use crate::runtime::session::SessionRegistry;
use crate::telegram::TelegramClient;

/// Shared application state passed to every handler and background task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub config_path: PathBuf,
    /// Concrete store, kept for flushing; handlers use [`AppState::chat_store`].
    pub store: Arc<MemoryStore>,
    pub llm: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub engine: Arc<ChatEngine>,
    pub platform: Arc<dyn ChatPlatform>,
    /// Present when a bot token was found in the environment.
    pub telegram: Option<Arc<TelegramClient>>,
    pub shutdown_tx: Arc<tokio::sync::Notify>,
}

impl AppState {
    pub fn chat_store(&self) -> Arc<dyn ChatStore> {
        self.store.clone()
    }
}
