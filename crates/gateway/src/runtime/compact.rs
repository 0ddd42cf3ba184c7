//! Context compaction: keeps the conversation buffer under a size ceiling.
//!
//! Size is the length of the compact JSON serialization of the message
//! array. Two stages run in order:
//!
//! 1. Above `soft_summarize_threshold` (and with a summarizer available) the
//!    older part of the conversation is replaced by a short synopsis that is
//!    also stored as the chat's standing summary.
//! 2. At or above `hard_char_ceiling` the oldest messages are dropped,
//!    keeping the system message and a contiguous newest suffix strictly
//!    under the ceiling.

use mm_domain::config::CompactionConfig;
use mm_domain::tool::{serialized_len, Message, Role};
use mm_domain::ChatId;
use mm_providers::{ChatRequest, LlmProvider};
use mm_store::ChatStore;

/// Heading under which the synopsis is appended to the system message.
pub const SUMMARY_HEADING: &str = "## Earlier in this chat";

/// Provider (plus optional model override) used to write synopses.
pub struct Summarizer<'a> {
    pub provider: &'a dyn LlmProvider,
    pub model: Option<String>,
}

/// What a compaction pass did to the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Compaction {
    pub messages: Vec<Message>,
    pub summarized: bool,
    /// Messages dropped by truncation.
    pub dropped: usize,
}

/// Run both compaction stages over `messages`.
///
/// Never fails: a failed synopsis is logged and truncation still applies.
pub async fn compact(
    messages: Vec<Message>,
    cfg: &CompactionConfig,
    summarizer: Option<Summarizer<'_>>,
    store: &dyn ChatStore,
    chat_id: ChatId,
) -> Compaction {
    let mut messages = messages;
    let mut summarized = false;

    let size = serialized_len(&messages);
    if size > cfg.soft_summarize_threshold && cfg.summarize {
        match summarizer {
            Some(s) if body_len(&messages) > 1 => {
                match generate_summary(&s, &messages).await {
                    Ok(summary) if !summary.trim().is_empty() => {
                        let summary = summary.trim();
                        if let Err(e) = store.set_chat_summary(chat_id, summary).await {
                            tracing::warn!(chat_id, error = %e, "failed to persist chat summary");
                        }
                        messages = rebuild_with_summary(messages, summary, cfg.keep_last_messages);
                        summarized = true;
                        tracing::info!(
                            chat_id,
                            before = size,
                            after = serialized_len(&messages),
                            "conversation summarized"
                        );
                    }
                    Ok(_) => {
                        tracing::warn!(chat_id, "summarizer returned empty text, truncating instead");
                    }
                    Err(e) => {
                        tracing::warn!(chat_id, error = %e, "summarization failed, truncating instead");
                    }
                }
            }
            Some(_) => {}
            None => {
                tracing::debug!(chat_id, size, "no summarizer available");
            }
        }
    }

    let mut dropped = 0;
    if serialized_len(&messages) >= cfg.hard_char_ceiling {
        let before = messages.len();
        messages = truncate_to_fit(messages, cfg.hard_char_ceiling);
        dropped = before.saturating_sub(messages.len());
        tracing::info!(chat_id, dropped, ceiling = cfg.hard_char_ceiling, "conversation truncated");
    }

    Compaction {
        messages,
        summarized,
        dropped,
    }
}

fn has_system(messages: &[Message]) -> bool {
    messages.first().is_some_and(|m| m.role == Role::System)
}

fn body_len(messages: &[Message]) -> usize {
    messages.len() - usize::from(has_system(messages))
}

/// Ask the summarizer for a short synopsis of every non-system message
/// except the newest.
pub async fn generate_summary(
    summarizer: &Summarizer<'_>,
    messages: &[Message],
) -> mm_domain::Result<String> {
    let start = usize::from(has_system(messages));
    let end = messages.len().saturating_sub(1).max(start);
    let transcript = build_transcript(&messages[start..end]);

    let prompt = format!(
        "Summarize the following chat in 2-3 sentences. Keep who said what, \
         open questions and anything someone asked to be remembered. \
         Write plain prose without preamble.\n\nCHAT:\n{transcript}"
    );

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        temperature: Some(0.2),
        max_tokens: Some(400),
        model: summarizer.model.clone(),
        ..Default::default()
    };
    let resp = summarizer.provider.chat(&req).await?;
    Ok(resp.content)
}

/// Replace everything but the last `keep_last` messages with the synopsis,
/// appended to the system message.
pub fn rebuild_with_summary(messages: Vec<Message>, summary: &str, keep_last: usize) -> Vec<Message> {
    let mut iter = messages.into_iter().peekable();
    let system = match iter.peek() {
        Some(m) if m.role == Role::System => iter.next(),
        _ => None,
    };
    let body: Vec<Message> = iter.collect();

    let mut system = system.unwrap_or_else(|| Message::system(""));
    let base = system.content_str().trim_end().to_string();
    let joined = if base.is_empty() {
        format!("{SUMMARY_HEADING}\n{summary}")
    } else {
        format!("{base}\n\n{SUMMARY_HEADING}\n{summary}")
    };
    system.content = Some(joined);

    let skip = body.len().saturating_sub(keep_last);
    let mut out = Vec::with_capacity(keep_last + 1);
    out.push(system);
    out.extend(drop_orphan_tool_results(body.into_iter().skip(skip).collect()));
    out
}

/// Keep the system message plus the longest newest suffix whose size stays
/// under `ceiling`. Leading tool results whose assistant call was dropped are
/// removed too.
///
/// When not even the newest message fits, its text is shortened so the
/// model still sees what it is answering.
pub fn truncate_to_fit(messages: Vec<Message>, ceiling: usize) -> Vec<Message> {
    let mut iter = messages.into_iter().peekable();
    let system = match iter.peek() {
        Some(m) if m.role == Role::System => iter.next(),
        _ => None,
    };
    let body: Vec<Message> = iter.collect();

    let head: Vec<Message> = system.into_iter().collect();
    let mut size = serialized_len(&head);
    let mut count = head.len();
    let mut keep_from = body.len();

    for (i, msg) in body.iter().enumerate().rev() {
        let add = msg.serialized_len() + usize::from(count > 0);
        if size + add >= ceiling {
            break;
        }
        size += add;
        count += 1;
        keep_from = i;
    }

    let mut suffix = drop_orphan_tool_results(body[keep_from..].to_vec());

    if suffix.is_empty() {
        if let Some(newest) = body.iter().rev().find(|m| m.role != Role::Tool) {
            if let Some(shrunk) = shrink_to_fit(&head, newest, ceiling) {
                suffix.push(shrunk);
            } else {
                tracing::warn!(ceiling, "system message alone exceeds the context ceiling");
            }
        }
    }

    let mut out = head;
    out.extend(suffix);
    out
}

fn drop_orphan_tool_results(mut suffix: Vec<Message>) -> Vec<Message> {
    let orphans = suffix.iter().take_while(|m| m.role == Role::Tool).count();
    suffix.drain(..orphans);
    suffix
}

/// Cut `msg`'s text until `head + msg` is under `ceiling`.
fn shrink_to_fit(head: &[Message], msg: &Message, ceiling: usize) -> Option<Message> {
    const MARKER: &str = " …";
    let mut candidate = msg.clone();
    candidate.tool_calls.clear();
    let mut keep = candidate.content_str().chars().count();

    loop {
        let mut trial = head.to_vec();
        trial.push(candidate.clone());
        if serialized_len(&trial) < ceiling {
            return Some(candidate);
        }
        if keep == 0 {
            return None;
        }
        keep /= 2;
        let text: String = msg.content_str().chars().take(keep).collect();
        candidate.content = Some(if keep == 0 { String::new() } else { format!("{text}{MARKER}") });
    }
}

fn build_transcript(messages: &[Message]) -> String {
    let mut buf = String::new();
    for msg in messages {
        let label = match (msg.role, msg.name.as_deref()) {
            (_, Some(name)) => name,
            (Role::User, None) => "User",
            (Role::Assistant, None) => "Assistant",
            (Role::Tool, None) => "Tool",
            (Role::System, None) => "System",
        };
        let text = msg.content_str();
        if text.is_empty() {
            continue;
        }
        buf.push_str(label);
        buf.push_str(": ");
        // Long tool output dominates the prompt otherwise.
        let chars = text.chars().count();
        if chars > 2000 {
            let head: String = text.chars().take(1000).collect();
            let tail: String = text.chars().skip(chars - 500).collect();
            buf.push_str(&head);
            buf.push_str(" [...] ");
            buf.push_str(&tail);
        } else {
            buf.push_str(text);
        }
        buf.push('\n');
    }
    buf
}
