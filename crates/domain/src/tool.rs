use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Structured provider calls and calls decoded from text both end up here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Build a call with a freshly generated correlation id.
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation buffer (provider-agnostic).
///
/// `content` is `None` only for assistant messages that carry nothing but
/// tool calls. `tool_call_id` is set on tool results, `tool_calls` on
/// assistant messages that invoke tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Display label of the speaker (group chats).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }
    /// A user message attributed to a named speaker.
    pub fn user_named(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::text(Role::User, text)
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }
    /// Assistant message that invokes tools. Empty text becomes `None`.
    pub fn assistant_tool_calls(text: &str, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: if text.trim().is_empty() {
                None
            } else {
                Some(text.to_string())
            },
            name: None,
            tool_call_id: None,
            tool_calls: calls,
        }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }

    /// Text content, or the empty string for tool-call-only messages.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Length of this message's compact JSON serialization.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

/// Length of the compact JSON array serialization of `messages`
/// (`[` + items joined by `,` + `]`), computed per message so callers can
/// reason about adding or dropping single entries.
pub fn serialized_len(messages: &[Message]) -> usize {
    let items: usize = messages.iter().map(Message::serialized_len).sum();
    2 + items + messages.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_len_matches_serde_array() {
        let msgs = vec![
            Message::system("you are terse"),
            Message::user_named("ann", "hi \"there\""),
            Message::assistant_tool_calls(
                "",
                vec![ToolCall::new("search_web", serde_json::json!({"query": "x"}))],
            ),
            Message::tool_result("call_1", "result"),
        ];
        let expected = serde_json::to_string(&msgs).unwrap().len();
        assert_eq!(serialized_len(&msgs), expected);
        assert_eq!(serialized_len(&[]), 2);
    }

    #[test]
    fn tool_call_only_message_has_no_content() {
        let msg = Message::assistant_tool_calls("  ", vec![]);
        assert!(msg.content.is_none());
        assert_eq!(msg.content_str(), "");
    }

    #[test]
    fn fresh_call_ids_are_unique() {
        let a = ToolCall::new("recall_facts", serde_json::json!({}));
        let b = ToolCall::new("recall_facts", serde_json::json!({}));
        assert_ne!(a.call_id, b.call_id);
        assert!(a.call_id.starts_with("call_"));
    }
}
