//! Turn orchestrator: the bounded LLM → extract → dispatch loop.
//!
//! One call to [`Orchestrator::run`] owns its conversation buffer. The loop
//! walks explicit [`TurnPhase`]s with a depth counter, so a model that keeps
//! calling tools is cut off after `max_depth` provider calls.

use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use mm_domain::config::{CompactionConfig, LlmConfig};
use mm_domain::tool::{Message, Role, ToolDefinition};
use mm_domain::{ChatId, UserId};
use mm_providers::registry::{ROLE_EXECUTOR, ROLE_SUMMARIZER};
use mm_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry, ToolChoice};
use mm_store::ChatStore;

use super::compact::{self, Summarizer};
use super::extract::{Extraction, ToolCallExtractor};
use super::tools::{self, ToolContext, ToolDispatcher, ToolOutcome};

/// Reply used when the tool loop hits the depth ceiling.
pub const DEPTH_LIMIT_REPLY: &str =
    "I went down a rabbit hole of lookups and lost the thread. Could you ask me again?";

/// Appended to the system message for passive and idle runs.
pub const BACKGROUND_DIRECTIVE: &str = "You were not addressed directly. Reply only if you have \
    something genuinely useful, funny or important to add. Keep it to one or two short \
    sentences. If there is nothing worth saying, reply with an empty message.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Compacting,
    Requesting,
    Extracting,
    Dispatching,
    Recursing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub url: String,
    pub caption: String,
}

/// What to deliver. Both fields empty means stay silent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorResult {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl OrchestratorResult {
    pub fn is_silent(&self) -> bool {
        self.text.is_none() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub result: OrchestratorResult,
    /// Provider calls made.
    pub rounds: usize,
    pub depth_limited: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("LLM provider failed: {0}")]
    Provider(#[source] mm_domain::Error),
}

/// Input for one orchestrator run.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    /// System message first, then history and the new input.
    pub messages: Vec<Message>,
    /// Passive or idle run: ask the model to stay quiet unless it matters.
    pub background: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    llm: Arc<ProviderRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    store: Arc<dyn ChatStore>,
    extractor: ToolCallExtractor,
    tool_defs: Vec<ToolDefinition>,
    compaction: CompactionConfig,
    max_depth: usize,
    temperature: f32,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<ProviderRegistry>,
        dispatcher: Arc<ToolDispatcher>,
        store: Arc<dyn ChatStore>,
        compaction: CompactionConfig,
        llm_cfg: &LlmConfig,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            store,
            extractor: ToolCallExtractor::new(tools::known_tools()),
            tool_defs: tools::tool_definitions(),
            compaction,
            max_depth: llm_cfg.max_depth.max(1),
            temperature: llm_cfg.temperature,
        }
    }

    pub async fn run(&self, req: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let span = tracing::info_span!(
            "turn",
            chat_id = req.chat_id,
            background = req.background,
            "otel.kind" = "SERVER",
            rounds = tracing::field::Empty,
            depth_limited = tracing::field::Empty,
        );
        let outcome = self.run_inner(req).instrument(span.clone()).await;
        if let Ok(o) = &outcome {
            span.record("rounds", o.rounds);
            span.record("depth_limited", o.depth_limited);
        }
        outcome
    }

    async fn run_inner(&self, req: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let provider = self.llm.for_role(ROLE_EXECUTOR).ok_or_else(|| {
            TurnError::Provider(mm_domain::Error::Config("no LLM provider configured".into()))
        })?;
        let model = self.llm.model_for_role(ROLE_EXECUTOR);

        let chat_id = req.chat_id;
        let ctx = ToolContext {
            chat_id,
            user_id: req.user_id,
            now: Utc::now(),
        };
        let mut messages = req.messages;
        if req.background {
            apply_background_directive(&mut messages);
        }

        let mut phase = TurnPhase::Compacting;
        let mut depth = 0usize;
        let mut rounds = 0usize;
        let mut depth_limited = false;
        let mut response = ChatResponse::default();
        let mut extraction = Extraction {
            text: String::new(),
            calls: Vec::new(),
        };
        let mut result = OrchestratorResult::default();
        let mut failure: Option<mm_domain::Error> = None;

        loop {
            tracing::trace!(?phase, depth, "turn phase");
            phase = match phase {
                TurnPhase::Compacting => {
                    let summarizer_provider = self.llm.for_role(ROLE_SUMMARIZER);
                    let summarizer = summarizer_provider.as_deref().map(|p| Summarizer {
                        provider: p,
                        model: self.llm.model_for_role(ROLE_SUMMARIZER),
                    });
                    let compacted = compact::compact(
                        std::mem::take(&mut messages),
                        &self.compaction,
                        summarizer,
                        self.store.as_ref(),
                        chat_id,
                    )
                    .await;
                    messages = compacted.messages;
                    TurnPhase::Requesting
                }

                TurnPhase::Requesting => {
                    let chat_req = ChatRequest {
                        messages: messages.clone(),
                        tools: self.tool_defs.clone(),
                        tool_choice: ToolChoice::Auto,
                        temperature: Some(self.temperature),
                        max_tokens: None,
                        model: model.clone(),
                    };
                    rounds += 1;
                    match call_llm(provider.as_ref(), &chat_req, rounds).await {
                        Ok(r) => {
                            response = r;
                            TurnPhase::Extracting
                        }
                        Err(e) => {
                            failure = Some(e);
                            TurnPhase::Failed
                        }
                    }
                }

                TurnPhase::Extracting => {
                    extraction = self
                        .extractor
                        .extract(&response.content, std::mem::take(&mut response.tool_calls));
                    if extraction.calls.is_empty() {
                        let text = std::mem::take(&mut extraction.text);
                        result.text = Some(text).filter(|t| !t.is_empty());
                        TurnPhase::Done
                    } else {
                        TurnPhase::Dispatching
                    }
                }

                TurnPhase::Dispatching => {
                    let calls = std::mem::take(&mut extraction.calls);
                    messages.push(Message::assistant_tool_calls(&extraction.text, calls.clone()));
                    for call in &calls {
                        let content = match self.dispatcher.dispatch(call, &ctx).await {
                            ToolOutcome::Text(text) => text,
                            ToolOutcome::Attachment { url, caption } => {
                                let note = format!("[image attached: {caption}]");
                                result.attachment = Some(Attachment { url, caption });
                                note
                            }
                        };
                        messages.push(Message::tool_result(call.call_id.clone(), content));
                    }
                    TurnPhase::Recursing
                }

                TurnPhase::Recursing => {
                    depth += 1;
                    if depth >= self.max_depth {
                        tracing::warn!(chat_id, depth, "tool loop hit the depth ceiling");
                        depth_limited = true;
                        result.text = Some(DEPTH_LIMIT_REPLY.to_string());
                        TurnPhase::Done
                    } else {
                        TurnPhase::Requesting
                    }
                }

                TurnPhase::Done => break,

                TurnPhase::Failed => {
                    let err = failure
                        .take()
                        .unwrap_or_else(|| mm_domain::Error::Other("provider call failed".into()));
                    tracing::warn!(chat_id, rounds, error = %err, "turn failed");
                    return Err(TurnError::Provider(err));
                }
            };
        }

        tracing::debug!(
            chat_id,
            rounds,
            depth_limited,
            has_text = result.text.is_some(),
            has_attachment = result.attachment.is_some(),
            "turn finished"
        );
        Ok(TurnOutcome {
            result,
            rounds,
            depth_limited,
        })
    }
}

async fn call_llm(
    provider: &dyn LlmProvider,
    req: &ChatRequest,
    round: usize,
) -> mm_domain::Result<ChatResponse> {
    let span = tracing::info_span!(
        "llm.call",
        "otel.kind" = "CLIENT",
        provider = provider.provider_id(),
        model = req.model.as_deref().unwrap_or("default"),
        round,
        input_tokens = tracing::field::Empty,
        output_tokens = tracing::field::Empty,
    );
    let resp = provider.chat(req).instrument(span.clone()).await?;
    if let Some(u) = resp.usage {
        span.record("input_tokens", u.prompt_tokens);
        span.record("output_tokens", u.completion_tokens);
    }
    Ok(resp)
}

fn apply_background_directive(messages: &mut Vec<Message>) {
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            let base = first.content_str().trim_end().to_string();
            first.content = Some(if base.is_empty() {
                BACKGROUND_DIRECTIVE.to_string()
            } else {
                format!("{base}\n\n{BACKGROUND_DIRECTIVE}")
            });
        }
        _ => messages.insert(0, Message::system(BACKGROUND_DIRECTIVE)),
    }
}
