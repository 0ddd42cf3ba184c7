//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, LM Studio, Together,
//! and any other endpoint that follows the OpenAI chat completions contract.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};
use crate::util::{from_reqwest, resolve_api_key};
use mm_domain::config::ProviderConfig;
use mm_domain::error::{Error, Result};
use mm_domain::tool::{Message, Role, ToolCall, ToolDefinition};
use serde_json::Value;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    /// Fully rendered auth header (`name`, `value`), absent for local servers.
    auth_header: Option<(String, String)>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let auth_header = resolve_api_key(&cfg.auth)?.map(|key| {
            let header = cfg
                .auth
                .header
                .clone()
                .unwrap_or_else(|| "Authorization".into());
            let prefix = cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into());
            (header, format!("{prefix}{key}"))
        });

        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".into());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_header,
            default_model,
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.auth_header {
            Some((name, value)) => builder.header(name.as_str(), value.as_str()),
            None => builder,
        }
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String(req.tool_choice.as_str().into());
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({
        "role": role_to_str(msg.role),
        "content": msg.content,
    });
    if let Some(name) = &msg.name {
        obj["name"] = Value::String(sanitize_name(name));
    }
    if let Some(id) = &msg.tool_call_id {
        obj["tool_call_id"] = Value::String(id.clone());
    }
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.call_id,
                    "type": "function",
                    "function": {
                        "name": tc.tool_name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        obj["tool_calls"] = Value::Array(calls);
    }
    obj
}

/// The `name` field only accepts `[a-zA-Z0-9_-]{1,64}`.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "user".into()
    } else {
        cleaned
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.into(),
        message: "no message in choice".into(),
    })?;

    // Reasoning fields (`reasoning_content`, `reasoning`) are ignored.
    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let tool_calls = parse_openai_tool_calls(message);
    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model,
        finish_reason,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            // Some servers send arguments as an object instead of a string.
            let arguments = match func.get("arguments") {
                Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|e| {
                    tracing::warn!(tool = %tool_name, error = %e, "unparseable tool arguments");
                    Value::Object(Default::default())
                }),
                Some(v @ Value::Object(_)) => v.clone(),
                _ => Value::Object(Default::default()),
            };
            let mut call = ToolCall::new(tool_name, arguments);
            if let Some(id) = tc.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
                call.call_id = id.to_string();
            }
            Some(call)
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(
            provider = %self.id,
            url = %url,
            messages = req.messages.len(),
            tools = req.tools.len(),
            "openai_compat chat request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&self.id, &resp_json)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ToolChoice;
    use mm_domain::config::AuthConfig;

    fn provider() -> OpenAiCompatProvider {
        let cfg = ProviderConfig {
            id: "local".into(),
            kind: Default::default(),
            base_url: "http://localhost:11434/v1/".into(),
            auth: AuthConfig::default(),
            default_model: Some("qwen2.5:14b".into()),
        };
        OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn anonymous_provider_has_no_auth_header() {
        let p = provider();
        assert!(p.auth_header.is_none());
        assert_eq!(p.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn bearer_header_from_plaintext_key() {
        let cfg = ProviderConfig {
            id: "openai".into(),
            kind: Default::default(),
            base_url: "https://api.openai.com/v1".into(),
            auth: AuthConfig {
                key: Some("sk-abc".into()),
                ..Default::default()
            },
            default_model: None,
        };
        let p = OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(5)).unwrap();
        assert_eq!(
            p.auth_header,
            Some(("Authorization".to_string(), "Bearer sk-abc".to_string()))
        );
    }

    #[test]
    fn body_carries_tools_and_tool_choice() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::system("sys"), Message::user_named("Ann Lee", "hi")],
            tools: vec![ToolDefinition {
                name: "search_web".into(),
                description: "Search".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            tool_choice: ToolChoice::Auto,
            temperature: Some(0.5),
            ..Default::default()
        };
        let body = p.build_chat_body(&req);
        assert_eq!(body["model"], "qwen2.5:14b");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "search_web");
        assert_eq!(body["messages"][1]["name"], "Ann_Lee");
    }

    #[test]
    fn body_omits_tool_choice_without_tools() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            model: Some("override".into()),
            ..Default::default()
        };
        let body = p.build_chat_body(&req);
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["model"], "override");
    }

    #[test]
    fn tool_call_round_trip_shapes() {
        let call = ToolCall {
            call_id: "call_1".into(),
            tool_name: "recall_facts".into(),
            arguments: serde_json::json!({"query": "cats"}),
        };
        let assistant = msg_to_openai(&Message::assistant_tool_calls("", vec![call]));
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"cats"}"#
        );

        let result = msg_to_openai(&Message::tool_result("call_1", "none"));
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_structured_tool_calls() {
        let body = serde_json::json!({
            "model": "m",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "reasoning_content": "thinking...",
                    "tool_calls": [
                        {"id": "abc", "type": "function",
                         "function": {"name": "search_web", "arguments": "{\"query\":\"rust\"}"}},
                        {"type": "function",
                         "function": {"name": "recall_facts", "arguments": {"query": "x"}}}
                    ]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let resp = parse_chat_response("local", &body).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].call_id, "abc");
        assert_eq!(resp.tool_calls[0].arguments["query"], "rust");
        assert!(resp.tool_calls[1].call_id.starts_with("call_"));
        assert_eq!(resp.usage.map(|u| u.total_tokens), Some(12));
    }

    #[test]
    fn empty_choices_is_a_provider_error() {
        let err = parse_chat_response("local", &serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }
}
