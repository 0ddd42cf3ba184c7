//! Chat engine: routes inbound events and fired timers into orchestrator
//! runs.
//!
//! Addressed messages (private chat, mention, reply, persona alias) run the
//! orchestrator immediately. Everything else goes through the passive batch
//! and the reply-chance gate. Every run for a chat is serialized through the
//! session's [`ChatLock`](crate::runtime::session_lock::ChatLock); a trigger
//! that loses the race is skipped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;

use mm_domain::config::{PersonaConfig, SchedulingConfig};
use mm_domain::tool::Message;
use mm_domain::{ChatId, UserId};
use mm_store::{ChatStore, HistoryEntry, Speaker};

use crate::platform::{self, ChatPlatform, InboundEvent};
use crate::runtime::batching::BatchStatus;
use crate::runtime::idle;
use crate::runtime::reply_chance::parse_probability;
use crate::runtime::session::{ChatSession, SessionRegistry};
use crate::runtime::turn::{Orchestrator, TurnOutcome, TurnRequest};
use crate::runtime::{Trigger, TriggerSink};

/// Sent when an addressed run fails on the provider.
pub const SERVICE_UNAVAILABLE_REPLY: &str =
    "Sorry, my brain is offline right now. Try again in a bit.";

/// Per-chat setting that overrides the configured reply probability.
pub const REPLY_PROBABILITY_SETTING: &str = "reply_probability";

/// Appended to the context of an idle-wake run.
pub const IDLE_NUDGE: &str = "(The chat has been quiet for a while. If there is something \
    worth bringing up, say it briefly. Otherwise stay silent.)";

const FACTS_IN_PROMPT: usize = 20;

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    /// A reply (text or attachment) was delivered.
    Replied,
    /// The run finished without anything to say.
    Silent,
    /// Another run holds the chat.
    Busy,
    /// Queued in the passive batch; `count` includes this message.
    Batched { count: u32 },
    /// Provider or delivery failure.
    Failed,
}

pub struct ChatEngine {
    me: Weak<ChatEngine>,
    store: Arc<dyn ChatStore>,
    platform: Arc<dyn ChatPlatform>,
    orchestrator: Orchestrator,
    sessions: Arc<SessionRegistry>,
    persona: PersonaConfig,
    scheduling: SchedulingConfig,
    alias_re: Option<Regex>,
}

impl ChatEngine {
    pub fn new(
        store: Arc<dyn ChatStore>,
        platform: Arc<dyn ChatPlatform>,
        orchestrator: Orchestrator,
        sessions: Arc<SessionRegistry>,
        persona: PersonaConfig,
        scheduling: SchedulingConfig,
    ) -> Arc<Self> {
        let alias_re = alias_regex(&persona);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            platform,
            orchestrator,
            sessions,
            persona,
            scheduling,
            alias_re,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    fn sink(&self) -> Option<Arc<dyn TriggerSink>> {
        self.me.upgrade().map(|me| me as Arc<dyn TriggerSink>)
    }

    /// Whether the event addresses the agent directly.
    pub fn is_addressed(&self, ev: &InboundEvent) -> bool {
        ev.is_private
            || ev.mentions_bot
            || ev.reply_to_bot
            || self.alias_re.as_ref().is_some_and(|re| re.is_match(&ev.text))
    }

    // ── Inbound ────────────────────────────────────────────────────

    pub async fn handle_inbound(&self, ev: InboundEvent) -> Disposition {
        let chat_id = ev.chat_id;
        if let Err(e) = self
            .store
            .append_history(chat_id, HistoryEntry::user(ev.user_id, &ev.user_name, &ev.text))
            .await
        {
            tracing::warn!(chat_id, error = %e, "failed to record inbound message");
        }

        let session = self.sessions.get_or_create(chat_id);
        session.touch();
        self.rearm_idle(&session);

        if !self.is_addressed(&ev) {
            let Some(sink) = self.sink() else {
                return Disposition::Silent;
            };
            let window = Duration::from_secs(self.scheduling.batch_window_secs);
            return match session.batch().push(ev, window, sink) {
                BatchStatus::Started { .. } => Disposition::Batched { count: 1 },
                BatchStatus::Joined { count } => Disposition::Batched { count },
            };
        }

        if let Some(dropped) = session.batch().cancel() {
            tracing::debug!(chat_id, dropped, "addressed message cancelled passive batch");
        }
        let _permit = match session.lock().try_acquire() {
            Ok(p) => p,
            Err(_) => {
                tracing::debug!(chat_id, "chat busy, skipping addressed message");
                return Disposition::Busy;
            }
        };

        if let Err(e) = self.platform.send_typing(chat_id).await {
            tracing::debug!(chat_id, error = %e, "typing indicator failed");
        }

        let messages = self.build_messages(chat_id).await;
        let outcome = self
            .orchestrator
            .run(TurnRequest {
                chat_id,
                user_id: Some(ev.user_id),
                messages,
                background: false,
            })
            .await;

        let disposition = match outcome {
            Ok(outcome) => self.deliver_and_record(chat_id, &outcome).await,
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "addressed run failed");
                let sent =
                    platform::send_reply(self.platform.as_ref(), chat_id, SERVICE_UNAVAILABLE_REPLY)
                        .await;
                if let Err(e) = sent {
                    tracing::warn!(chat_id, error = %e, "failed to send fallback reply");
                }
                Disposition::Failed
            }
        };
        self.rearm_idle(&session);
        disposition
    }

    // ── Timers ─────────────────────────────────────────────────────

    async fn on_batch_flush(&self, chat_id: ChatId, count: u32, last_event: InboundEvent) {
        let session = self.sessions.get_or_create(chat_id);
        // A busy skip must leave the reply-chance counter untouched.
        let Ok(_permit) = session.lock().try_acquire() else {
            tracing::debug!(chat_id, count, "chat busy, skipping passive run");
            return;
        };
        let probability = self.reply_probability(chat_id).await;
        if !session.register_passive(count, probability) {
            tracing::debug!(chat_id, count, probability, "reply chance declined");
            return;
        }

        let messages = self.build_messages(chat_id).await;
        self.background_run(&session, Some(last_event.user_id), messages).await;
    }

    async fn on_idle_wake(&self, chat_id: ChatId) {
        let session = self.sessions.get_or_create(chat_id);
        let Ok(_permit) = session.lock().try_acquire() else {
            tracing::debug!(chat_id, "chat busy, skipping idle wake");
            return;
        };

        let mut messages = self.build_messages(chat_id).await;
        messages.push(Message::user(IDLE_NUDGE));
        self.background_run(&session, None, messages).await;
    }

    /// Run without being addressed. Failures and depth-limited runs stay
    /// silent. The caller holds the chat lock.
    async fn background_run(
        &self,
        session: &ChatSession,
        user_id: Option<UserId>,
        messages: Vec<Message>,
    ) {
        let chat_id = session.chat_id();
        let outcome = self
            .orchestrator
            .run(TurnRequest {
                chat_id,
                user_id,
                messages,
                background: true,
            })
            .await;
        match outcome {
            Ok(outcome) if outcome.depth_limited => {
                tracing::debug!(chat_id, "background run hit the depth ceiling, staying quiet");
            }
            Ok(outcome) => {
                self.deliver_and_record(chat_id, &outcome).await;
            }
            Err(e) => tracing::warn!(chat_id, error = %e, "background run failed"),
        }
        self.rearm_idle(session);
    }

    async fn reply_probability(&self, chat_id: ChatId) -> f64 {
        match self.store.setting(chat_id, REPLY_PROBABILITY_SETTING).await {
            Ok(Some(raw)) => parse_probability(&raw).unwrap_or_else(|| {
                tracing::warn!(chat_id, value = %raw, "ignoring invalid reply probability override");
                self.scheduling.reply_probability
            }),
            Ok(None) => self.scheduling.reply_probability,
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "failed to read reply probability override");
                self.scheduling.reply_probability
            }
        }
    }

    fn rearm_idle(&self, session: &ChatSession) {
        if !self.scheduling.idle_enabled {
            return;
        }
        if let Some(sink) = self.sink() {
            let delay = idle::random_delay(&self.scheduling);
            session.idle().reset(session.chat_id(), delay, sink);
        }
    }

    // ── Delivery ───────────────────────────────────────────────────

    async fn deliver_and_record(&self, chat_id: ChatId, outcome: &TurnOutcome) -> Disposition {
        let result = &outcome.result;
        if result.is_silent() {
            return Disposition::Silent;
        }
        if let Err(e) = platform::deliver(self.platform.as_ref(), chat_id, result).await {
            tracing::warn!(chat_id, error = %e, "reply delivery failed");
            return Disposition::Failed;
        }

        let recorded = match (&result.text, &result.attachment) {
            (Some(text), _) => text.clone(),
            (None, Some(att)) => format!("[sent an image: {}]", att.caption),
            (None, None) => return Disposition::Replied,
        };
        if let Err(e) = self
            .store
            .append_history(chat_id, HistoryEntry::agent(&self.persona.name, recorded))
            .await
        {
            tracing::warn!(chat_id, error = %e, "failed to record reply");
        }
        Disposition::Replied
    }

    // ── Prompt ─────────────────────────────────────────────────────

    /// System prompt plus recent history, oldest first.
    pub async fn build_messages(&self, chat_id: ChatId) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt(chat_id).await)];

        let history = self
            .store
            .recent_history(chat_id, self.persona.history_limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(chat_id, error = %e, "failed to load history");
                Vec::new()
            });
        messages.extend(history.into_iter().map(|entry| match entry.speaker {
            Speaker::Agent => Message::assistant(entry.text),
            Speaker::User => {
                let line = match entry.user_id {
                    Some(id) => format!("{} (id {id}): {}", entry.name, entry.text),
                    None => format!("{}: {}", entry.name, entry.text),
                };
                Message::user_named(speaker_label(&entry.name), line)
            }
        }));
        messages
    }

    async fn system_prompt(&self, chat_id: ChatId) -> String {
        let mut prompt = self.persona.system_prompt.trim().to_string();

        if let Ok(Some(summary)) = self.store.chat_summary(chat_id).await {
            if !summary.trim().is_empty() {
                prompt.push_str("\n\n## Chat summary\n");
                prompt.push_str(summary.trim());
            }
        }

        if let Ok(facts) = self.store.facts(chat_id, None, FACTS_IN_PROMPT).await {
            if !facts.is_empty() {
                prompt.push_str("\n\n## Things you remember\n");
                for fact in facts {
                    match fact.about_user_id {
                        Some(uid) => prompt.push_str(&format!("- (about id {uid}) {}\n", fact.text)),
                        None => prompt.push_str(&format!("- {}\n", fact.text)),
                    }
                }
            }
        }

        if let Ok(rels) = self.store.relationships(chat_id).await {
            if !rels.is_empty() {
                prompt.push_str("\n\n## How you feel about people\n");
                for rel in rels {
                    prompt.push_str(&format!("- id {}: {}\n", rel.user_id, rel.note));
                }
            }
        }

        if let Ok(reps) = self.store.reputations(chat_id).await {
            if !reps.is_empty() {
                prompt.push_str("\n\n## Reputation\n");
                for (uid, score) in reps {
                    prompt.push_str(&format!("- id {uid}: {score}\n"));
                }
            }
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        prompt.push_str(&format!("\n\nCurrent time (UTC): {now}"));
        prompt.trim_end().to_string()
    }
}

#[async_trait::async_trait]
impl TriggerSink for ChatEngine {
    async fn fire(&self, trigger: Trigger) {
        match trigger {
            Trigger::BatchFlush {
                chat_id,
                count,
                last_event,
            } => self.on_batch_flush(chat_id, count, last_event).await,
            Trigger::IdleWake { chat_id } => self.on_idle_wake(chat_id).await,
        }
    }
}

fn alias_regex(persona: &PersonaConfig) -> Option<Regex> {
    let names: Vec<String> = std::iter::once(&persona.name)
        .chain(persona.aliases.iter())
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(regex::escape)
        .collect();
    if names.is_empty() {
        return None;
    }
    match Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|"))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "persona aliases do not form a valid pattern");
            None
        }
    }
}

/// Provider-safe speaker label: ASCII letters, digits, `_` and `-`.
fn speaker_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(64)
        .collect();
    if label.trim_matches('_').is_empty() {
        "user".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_match_whole_words_case_insensitively() {
        let persona = PersonaConfig {
            name: "Murmur".into(),
            aliases: vec!["mur".into(), " ".into()],
            ..PersonaConfig::default()
        };
        let re = alias_regex(&persona).unwrap();
        assert!(re.is_match("hey MURMUR what's up"));
        assert!(re.is_match("mur, you there?"));
        assert!(!re.is_match("murmuring in the back"));
    }

    #[test]
    fn speaker_labels_are_sanitized() {
        assert_eq!(speaker_label("ann-b"), "ann-b");
        assert_eq!(speaker_label("Zoë K."), "Zo__K_");
        assert_eq!(speaker_label("★"), "user");
    }
}
