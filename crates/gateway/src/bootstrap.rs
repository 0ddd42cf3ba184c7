//! AppState construction and background-task spawning shared by `serve`
//! and `run`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use mm_domain::config::{Config, ConfigSeverity};
use mm_providers::registry::ProviderRegistry;
use mm_store::{ChatStore, MemoryStore};
use mm_tools::{ImageSearch, PageReader, SearxClient, WebFetchReader, WebSearch};

use crate::engine::ChatEngine;
use crate::platform::{ChatPlatform, LogPlatform};
use crate::runtime::reminders::ReminderPoller;
use crate::runtime::session::SessionRegistry;
use crate::runtime::tools::{ToolBackends, ToolDispatcher};
use crate::runtime::turn::Orchestrator;
use crate::state::AppState;
use crate::telegram::TelegramClient;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
///
/// `platform` overrides the outbound connector (the CLI prints to stdout).
/// When `None`, Telegram is used if a bot token is set, otherwise replies
/// are only logged.
pub async fn build_app_state(
    config: Arc<Config>,
    config_path: PathBuf,
    shutdown_tx: Arc<tokio::sync::Notify>,
    platform: Option<Arc<dyn ChatPlatform>>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let store = Arc::new(
        MemoryStore::open(&config.store.path, config.store.history_cap)
            .with_context(|| format!("opening store at {}", config.store.path.display()))?,
    );
    tracing::info!(path = %config.store.path.display(), "chat store ready");

    // ── LLM providers ────────────────────────────────────────────────
    let llm = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    tracing::info!(providers = llm.len(), "LLM provider registry ready");

    // ── Tool backends ────────────────────────────────────────────────
    let backends = build_tool_backends(&config)?;

    // ── Outbound platform ────────────────────────────────────────────
    let telegram = match TelegramClient::from_env(&config.telegram)
        .context("initializing Telegram client")?
    {
        Some(client) => {
            tracing::info!(
                allowed_chats = config.telegram.allowed_chats.len(),
                "Telegram connector enabled"
            );
            Some(Arc::new(client))
        }
        None => {
            tracing::info!(
                token_env = %config.telegram.token_env,
                "Telegram connector disabled (token not set)"
            );
            None
        }
    };
    let platform: Arc<dyn ChatPlatform> = match (platform, &telegram) {
        (Some(p), _) => p,
        (None, Some(tg)) => tg.clone(),
        (None, None) => Arc::new(LogPlatform),
    };

    // ── Runtime ──────────────────────────────────────────────────────
    let chat_store: Arc<dyn ChatStore> = store.clone();
    let dispatcher = Arc::new(ToolDispatcher::new(
        chat_store.clone(),
        backends,
        config.tools.clone(),
    ));
    let orchestrator = Orchestrator::new(
        llm.clone(),
        dispatcher,
        chat_store.clone(),
        config.compaction.clone(),
        &config.llm,
    );
    let sessions = Arc::new(SessionRegistry::new());
    let engine = ChatEngine::new(
        chat_store,
        platform.clone(),
        orchestrator,
        sessions.clone(),
        config.persona.clone(),
        config.scheduling.clone(),
    );
    tracing::info!(
        persona = %config.persona.name,
        max_depth = config.llm.max_depth,
        idle_enabled = config.scheduling.idle_enabled,
        "chat engine ready"
    );

    Ok(AppState {
        config,
        config_path,
        store,
        llm,
        sessions,
        engine,
        platform,
        telegram,
        shutdown_tx,
    })
}

fn build_tool_backends(config: &Config) -> anyhow::Result<ToolBackends> {
    let mut backends = ToolBackends::default();

    match config.tools.searx_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let searx = Arc::new(
                SearxClient::new(url, SEARCH_TIMEOUT).context("initializing SearXNG client")?,
            );
            backends.web = Some(searx.clone() as Arc<dyn WebSearch>);
            backends.images = Some(searx as Arc<dyn ImageSearch>);
            tracing::info!(url, "web and image search enabled");
        }
        None => tracing::info!("no searx_url configured; search tools will report unavailable"),
    }

    let reader = WebFetchReader::new(&config.tools.fetch).context("initializing page reader")?;
    backends.reader = Some(Arc::new(reader) as Arc<dyn PageReader>);
    Ok(backends)
}

/// Spawn the long-running background tasks: store flush, session pruning,
/// the reminder poller and the Telegram poller.
///
/// Call this after [`build_app_state`] when serving. The one-shot `run`
/// command skips it.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic store flush ─────────────────────────────────────────
    {
        let store = state.store.clone();
        let every = Duration::from_secs(state.config.store.flush_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = store.flush_if_dirty().await {
                    tracing::warn!(error = %e, "store flush failed");
                }
            }
        });
    }

    // ── Idle session pruning ─────────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        let ttl = Duration::from_secs(state.config.scheduling.session_ttl_minutes * 60);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                sessions.prune_idle(ttl);
            }
        });
    }

    // ── Reminder poller ──────────────────────────────────────────────
    {
        let poller = ReminderPoller::new(state.chat_store(), state.platform.clone());
        let every = Duration::from_secs(state.config.scheduling.reminder_poll_secs.max(1));
        tokio::spawn(poller.run(every));
    }

    // ── Telegram long-polling ────────────────────────────────────────
    if let Some(telegram) = &state.telegram {
        tokio::spawn(telegram.clone().run(state.engine.clone()));
    }

    tracing::info!("background tasks spawned");
}
