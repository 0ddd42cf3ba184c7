#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use mm_domain::config::{CompactionConfig, LlmConfig, PersonaConfig, SchedulingConfig, ToolsConfig};
use mm_domain::error::{Error, Result};
use mm_domain::ChatId;
use mm_gateway::engine::ChatEngine;
use mm_gateway::platform::{ChatPlatform, InboundEvent, TextFormat};
use mm_gateway::runtime::session::SessionRegistry;
use mm_gateway::runtime::tools::{ToolBackends, ToolDispatcher};
use mm_gateway::runtime::turn::Orchestrator;
use mm_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry};
use mm_store::{ChatStore, MemoryStore};
use mm_tools::{SearchHit, WebSearch};

// ── Provider ─────────────────────────────────────────────────────────

/// Replays canned replies in order, then keeps returning the last one.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ChatResponse>>>,
    fallback: ChatResponse,
    pub seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: text_reply(""),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.seen.lock().push(req.clone());
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

pub fn text_reply(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        model: "scripted-1".into(),
        ..ChatResponse::default()
    }
}

pub fn provider_down() -> Result<ChatResponse> {
    Err(Error::Provider {
        provider: "scripted".into(),
        message: "503 upstream unavailable".into(),
    })
}

// ── Platform ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(ChatId, String),
    Photo(ChatId, String),
    Typing(ChatId),
}

#[derive(Default)]
pub struct RecordingPlatform {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingPlatform {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(_, t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn send_text(&self, chat_id: ChatId, text: &str, _format: TextFormat) -> Result<()> {
        self.sent.lock().push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, url: &str, _caption: &str) -> Result<()> {
        self.sent.lock().push(Sent::Photo(chat_id, url.to_string()));
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.sent.lock().push(Sent::Typing(chat_id));
        Ok(())
    }
}

// ── Search backend ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSearch {
    pub queries: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().push(query.to_string());
        Ok(vec![SearchHit {
            title: format!("All about {query}"),
            url: "https://example.com/x".into(),
            snippet: "X is a letter.".into(),
        }])
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: Arc<ChatEngine>,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<RecordingPlatform>,
    pub provider: Arc<ScriptedProvider>,
    pub search: Arc<FakeSearch>,
    pub sessions: Arc<SessionRegistry>,
}

pub fn harness(replies: Vec<Result<ChatResponse>>, scheduling: SchedulingConfig) -> Harness {
    let store = Arc::new(MemoryStore::in_memory());
    let platform = Arc::new(RecordingPlatform::default());
    let provider = ScriptedProvider::new(replies);
    let search = Arc::new(FakeSearch::default());
    let sessions = Arc::new(SessionRegistry::new());

    let chat_store: Arc<dyn ChatStore> = store.clone();
    let llm = Arc::new(ProviderRegistry::from_providers(
        vec![provider.clone() as Arc<dyn LlmProvider>],
        HashMap::new(),
    ));
    let backends = ToolBackends {
        web: Some(search.clone() as Arc<dyn WebSearch>),
        ..ToolBackends::default()
    };
    let dispatcher = Arc::new(ToolDispatcher::new(
        chat_store.clone(),
        backends,
        ToolsConfig::default(),
    ));
    let llm_cfg = LlmConfig {
        max_depth: 3,
        ..LlmConfig::default()
    };
    let orchestrator = Orchestrator::new(
        llm,
        dispatcher,
        chat_store.clone(),
        CompactionConfig::default(),
        &llm_cfg,
    );
    let engine = ChatEngine::new(
        chat_store,
        platform.clone(),
        orchestrator,
        sessions.clone(),
        PersonaConfig {
            name: "Murmur".into(),
            ..PersonaConfig::default()
        },
        scheduling,
    );

    Harness {
        engine,
        store,
        platform,
        provider,
        search,
        sessions,
    }
}

pub fn group_message(chat_id: ChatId, user_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        chat_id,
        user_id,
        user_name: format!("user{user_id}"),
        text: text.to_string(),
        is_private: false,
        mentions_bot: false,
        reply_to_bot: false,
    }
}

pub fn private_message(chat_id: ChatId, text: &str) -> InboundEvent {
    InboundEvent {
        is_private: true,
        ..group_message(chat_id, chat_id, text)
    }
}
