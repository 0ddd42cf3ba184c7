//! Tool table and dispatcher.
//!
//! One static [`ToolSpec`] table drives both the JSON schema offered to the
//! model and argument resolution at dispatch time. Dispatch never fails:
//! unknown tools, bad arguments and backend errors all come back as
//! `"error: …"` text for the model to read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::Instrument;

use mm_domain::config::ToolsConfig;
use mm_domain::tool::{ToolCall, ToolDefinition};
use mm_domain::{ChatId, UserId};
use mm_store::{ChatStore, NewReminder};
use mm_tools::{ImageSearch, PageReader, WebSearch};

/// Longest accepted reminder delay (one year).
pub const MAX_REMINDER_DELAY_MINUTES: i64 = 365 * 24 * 60;

const RECALL_LIMIT: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
        }
    }
}

#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Alternate argument names models use for this parameter.
    pub aliases: &'static [&'static str],
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    /// Parameter bound by a single positional argument.
    pub fn positional(&self) -> Option<&'static str> {
        self.params.first().filter(|p| p.required).map(|p| p.name)
    }
}

const fn param(
    name: &'static str,
    kind: ParamKind,
    aliases: &'static [&'static str],
    required: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        aliases,
        required,
        description,
    }
}

pub static TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        name: "search_web",
        description: "Search the web. Returns titles, links and snippets.",
        params: &[param(
            "query",
            ParamKind::String,
            &["q", "search", "search_query", "text", "term"],
            true,
            "What to search for",
        )],
    },
    ToolSpec {
        name: "search_image",
        description: "Find an image and attach it to your reply.",
        params: &[
            param(
                "query",
                ParamKind::String,
                &["q", "prompt", "description", "search", "image"],
                true,
                "What the image should show",
            ),
            param(
                "caption",
                ParamKind::String,
                &["title", "alt", "text"],
                false,
                "Caption shown under the image",
            ),
        ],
    },
    ToolSpec {
        name: "read_url",
        description: "Fetch a web page and return its readable text.",
        params: &[param(
            "url",
            ParamKind::String,
            &["link", "href", "uri", "page", "address"],
            true,
            "Absolute http(s) URL",
        )],
    },
    ToolSpec {
        name: "remember_fact",
        description: "Store a fact about this chat or one of its members for later.",
        params: &[
            param(
                "fact",
                ParamKind::String,
                &["text", "content", "memory", "note", "info"],
                true,
                "The fact to remember",
            ),
            param(
                "about_user_id",
                ParamKind::Integer,
                &["user_id", "user", "about", "subject_id"],
                false,
                "Numeric id of the user the fact is about",
            ),
        ],
    },
    ToolSpec {
        name: "recall_facts",
        description: "List remembered facts, optionally filtered by words.",
        params: &[param(
            "query",
            ParamKind::String,
            &["q", "search", "topic", "about", "filter"],
            false,
            "Words every returned fact must contain",
        )],
    },
    ToolSpec {
        name: "set_reminder",
        description: "Post a reminder in this chat after a delay.",
        params: &[
            param(
                "delay_minutes",
                ParamKind::Integer,
                &["minutes", "delay", "in_minutes", "after_minutes", "delay_min"],
                true,
                "Minutes from now",
            ),
            param(
                "text",
                ParamKind::String,
                &["message", "reminder", "note", "content", "what"],
                true,
                "What to remind about",
            ),
        ],
    },
    ToolSpec {
        name: "change_reputation",
        description: "Raise or lower a member's reputation score.",
        params: &[
            param(
                "user_id",
                ParamKind::Integer,
                &["user", "target", "target_user_id", "id", "member"],
                true,
                "Numeric id of the member",
            ),
            param(
                "delta",
                ParamKind::Integer,
                &["amount", "change", "points", "value", "by"],
                true,
                "Points to add (negative to subtract)",
            ),
            param(
                "reason",
                ParamKind::String,
                &["why", "note", "because"],
                false,
                "Why the score changes",
            ),
        ],
    },
    ToolSpec {
        name: "set_relationship",
        description: "Record how you relate to a member.",
        params: &[
            param(
                "user_id",
                ParamKind::Integer,
                &["user", "target", "target_user_id", "id", "member"],
                true,
                "Numeric id of the member",
            ),
            param(
                "note",
                ParamKind::String,
                &["relationship", "text", "description", "status", "feeling"],
                true,
                "Short description of the relationship",
            ),
        ],
    },
];

/// Lowercase and drop `_ - . space`, so `Search-Web` and `searchweb`
/// resolve to `search_web`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn find_spec(name: &str) -> Option<&'static ToolSpec> {
    let wanted = normalize_name(name);
    TOOL_SPECS.iter().find(|s| normalize_name(s.name) == wanted)
}

/// `(name, positional parameter)` pairs for bare-call decoding.
pub fn known_tools() -> impl Iterator<Item = (&'static str, Option<&'static str>)> {
    TOOL_SPECS.iter().map(|s| (s.name, s.positional()))
}

/// Definitions offered to the model, built from [`TOOL_SPECS`].
pub fn tool_definitions() -> Vec<ToolDefinition> {
    TOOL_SPECS
        .iter()
        .map(|spec| {
            let mut properties = Map::new();
            for p in spec.params {
                properties.insert(
                    p.name.to_string(),
                    json!({ "type": p.kind.json_type(), "description": p.description }),
                );
            }
            let required: Vec<&str> = spec.params.iter().filter(|p| p.required).map(|p| p.name).collect();
            ToolDefinition {
                name: spec.name.to_string(),
                description: spec.description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgError {
    #[error("missing required argument '{0}'")]
    Missing(&'static str),
    #[error("argument '{param}' must be a whole number, got {value}")]
    NotNumeric { param: &'static str, value: String },
    #[error("argument '{param}' {reason}")]
    Invalid { param: &'static str, reason: String },
}

/// Arguments keyed by canonical parameter name.
#[derive(Debug, Default)]
pub struct ResolvedArgs {
    strings: HashMap<&'static str, String>,
    integers: HashMap<&'static str, i64>,
}

impl ResolvedArgs {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.integers.get(name).copied()
    }
}

/// Map raw arguments onto `spec`: for each parameter the canonical name
/// wins, then the first alias present (keys compared normalized).
pub fn resolve_args(spec: &ToolSpec, arguments: &Value) -> Result<ResolvedArgs, ArgError> {
    let empty = Map::new();
    let raw = arguments.as_object().unwrap_or(&empty);
    let by_key: HashMap<String, &Value> = raw.iter().map(|(k, v)| (normalize_name(k), v)).collect();

    let mut out = ResolvedArgs::default();
    for p in spec.params {
        let value = std::iter::once(p.name)
            .chain(p.aliases.iter().copied())
            .find_map(|name| by_key.get(&normalize_name(name)).copied())
            .filter(|v| !v.is_null());

        let Some(value) = value else {
            if p.required {
                return Err(ArgError::Missing(p.name));
            }
            continue;
        };

        match p.kind {
            ParamKind::String => {
                let text = match value {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if text.is_empty() {
                    if p.required {
                        return Err(ArgError::Missing(p.name));
                    }
                    continue;
                }
                out.strings.insert(p.name, text);
            }
            ParamKind::Integer => {
                out.integers.insert(p.name, as_integer(p.name, value)?);
            }
        }
    }
    Ok(out)
}

fn as_integer(param: &'static str, value: &Value) -> Result<i64, ArgError> {
    let not_numeric = || ArgError::NotNumeric {
        param,
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64).map(|f| f as i64))
            .ok_or_else(not_numeric),
        Value::String(s) => {
            let t = s.trim();
            let t = t.strip_prefix('+').unwrap_or(t);
            t.parse::<i64>().map_err(|_| not_numeric())
        }
        _ => Err(not_numeric()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who a tool call acts for.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext {
    pub chat_id: ChatId,
    /// Author of the message being answered; `None` for spontaneous runs.
    pub user_id: Option<UserId>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Text(String),
    /// An image to send alongside the reply.
    Attachment { url: String, caption: String },
}

impl ToolOutcome {
    fn error(message: impl std::fmt::Display) -> Self {
        ToolOutcome::Text(format!("error: {message}"))
    }
}

/// External backends. Missing ones make their tools report "not configured".
#[derive(Clone, Default)]
pub struct ToolBackends {
    pub web: Option<Arc<dyn WebSearch>>,
    pub images: Option<Arc<dyn ImageSearch>>,
    pub reader: Option<Arc<dyn PageReader>>,
}

pub struct ToolDispatcher {
    store: Arc<dyn ChatStore>,
    backends: ToolBackends,
    cfg: ToolsConfig,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn ChatStore>, backends: ToolBackends, cfg: ToolsConfig) -> Self {
        Self { store, backends, cfg }
    }

    /// Execute one call. Text results are capped at `max_result_chars`.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let span = tracing::info_span!(
            "tool.call",
            tool_name = %call.tool_name,
            call_id = %call.call_id,
            chat_id = ctx.chat_id,
        );
        async {
            let started = std::time::Instant::now();
            let outcome = match self.route(call, ctx).await {
                ToolOutcome::Text(text) => ToolOutcome::Text(cap_result(&text, self.cfg.max_result_chars)),
                attachment => attachment,
            };
            let is_error = matches!(&outcome, ToolOutcome::Text(t) if t.starts_with("error:"));
            tracing::debug!(
                duration_ms = started.elapsed().as_millis() as u64,
                is_error,
                "tool call finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn route(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let Some(spec) = find_spec(&call.tool_name) else {
            let available: Vec<&str> = TOOL_SPECS.iter().map(|s| s.name).collect();
            return ToolOutcome::error(format!(
                "unknown tool '{}'. Available tools: {}",
                call.tool_name,
                available.join(", ")
            ));
        };
        let args = match resolve_args(spec, &call.arguments) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::error(e),
        };

        let result = match spec.name {
            "search_web" => self.search_web(&args).await,
            "search_image" => self.search_image(&args).await,
            "read_url" => self.read_url(&args).await,
            "remember_fact" => self.remember_fact(&args, ctx).await,
            "recall_facts" => self.recall_facts(&args, ctx).await,
            "set_reminder" => self.set_reminder(&args, ctx).await,
            "change_reputation" => self.change_reputation(&args, ctx).await,
            "set_relationship" => self.set_relationship(&args, ctx).await,
            other => Err(format!("tool '{other}' has no handler")),
        };
        result.unwrap_or_else(ToolOutcome::error)
    }

    // ── web ────────────────────────────────────────────────────────

    async fn search_web(&self, args: &ResolvedArgs) -> Result<ToolOutcome, String> {
        let web = self.backends.web.as_ref().ok_or("web search is not configured")?;
        let query = args.str("query").unwrap_or_default();
        let hits = web
            .search(query, self.cfg.search_results)
            .await
            .map_err(|e| format!("search failed: {e}"))?;
        if hits.is_empty() {
            return Ok(ToolOutcome::Text(format!("No results for \"{query}\".")));
        }
        let mut out = String::new();
        for (i, hit) in hits.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   {}\n", i + 1, hit.title, hit.url));
            if !hit.snippet.is_empty() {
                out.push_str(&format!("   {}\n", hit.snippet));
            }
        }
        Ok(ToolOutcome::Text(out.trim_end().to_string()))
    }

    async fn search_image(&self, args: &ResolvedArgs) -> Result<ToolOutcome, String> {
        let images = self.backends.images.as_ref().ok_or("image search is not configured")?;
        let query = args.str("query").unwrap_or_default();
        let hit = images
            .find_image(query)
            .await
            .map_err(|e| format!("image search failed: {e}"))?;
        Ok(match hit {
            Some(hit) => {
                let caption = args
                    .str("caption")
                    .map(str::to_string)
                    .or_else(|| Some(hit.title.trim().to_string()).filter(|t| !t.is_empty()))
                    .unwrap_or_else(|| query.to_string());
                ToolOutcome::Attachment { url: hit.url, caption }
            }
            None => ToolOutcome::Text(format!("No image found for \"{query}\".")),
        })
    }

    async fn read_url(&self, args: &ResolvedArgs) -> Result<ToolOutcome, String> {
        let reader = self.backends.reader.as_ref().ok_or("URL reading is not configured")?;
        let url = args.str("url").unwrap_or_default();
        let text = reader.read(url).await.map_err(|e| format!("could not read {url}: {e}"))?;
        if text.trim().is_empty() {
            return Ok(ToolOutcome::Text(format!("{url} has no readable text.")));
        }
        Ok(ToolOutcome::Text(format!("Content of {url}:\n{text}")))
    }

    // ── memory ─────────────────────────────────────────────────────

    async fn remember_fact(&self, args: &ResolvedArgs, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let fact = args.str("fact").unwrap_or_default();
        let about = args.int("about_user_id");
        self.store
            .remember_fact(ctx.chat_id, fact, about)
            .await
            .map_err(|e| format!("could not store fact: {e}"))?;
        Ok(ToolOutcome::Text("Remembered.".into()))
    }

    async fn recall_facts(&self, args: &ResolvedArgs, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let query = args.str("query");
        let facts = self
            .store
            .facts(ctx.chat_id, query, RECALL_LIMIT)
            .await
            .map_err(|e| format!("could not load facts: {e}"))?;
        if facts.is_empty() {
            return Ok(ToolOutcome::Text("No matching facts.".into()));
        }
        let lines: Vec<String> = facts
            .iter()
            .map(|f| match f.about_user_id {
                Some(uid) => format!("- {} (about user {uid})", f.text),
                None => format!("- {}", f.text),
            })
            .collect();
        Ok(ToolOutcome::Text(lines.join("\n")))
    }

    // ── reminders ──────────────────────────────────────────────────

    async fn set_reminder(&self, args: &ResolvedArgs, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let delay = args.int("delay_minutes").unwrap_or_default();
        let min = self.cfg.min_reminder_delay_minutes;
        if delay < min {
            return Err(ArgError::Invalid {
                param: "delay_minutes",
                reason: format!("must be at least {min} minute(s)"),
            }
            .to_string());
        }
        if delay > MAX_REMINDER_DELAY_MINUTES {
            return Err(ArgError::Invalid {
                param: "delay_minutes",
                reason: "must be at most one year".into(),
            }
            .to_string());
        }

        let due_at = ctx.now + Duration::minutes(delay);
        let record = self
            .store
            .create_reminder(NewReminder {
                chat_id: ctx.chat_id,
                user_id: ctx.user_id,
                text: args.str("text").unwrap_or_default().to_string(),
                due_at,
            })
            .await
            .map_err(|e| format!("could not save reminder: {e}"))?;
        tracing::info!(chat_id = ctx.chat_id, reminder_id = %record.id, %due_at, "reminder scheduled");
        Ok(ToolOutcome::Text(format!(
            "Reminder set for {} UTC (in {delay} minutes).",
            due_at.format("%Y-%m-%d %H:%M")
        )))
    }

    // ── social ─────────────────────────────────────────────────────

    async fn change_reputation(&self, args: &ResolvedArgs, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let user_id = args.int("user_id").unwrap_or_default();
        let max = self.cfg.max_reputation_delta.abs();
        let requested = args.int("delta").unwrap_or_default();
        let delta = requested.clamp(-max, max);
        let score = self
            .store
            .adjust_reputation(ctx.chat_id, user_id, delta)
            .await
            .map_err(|e| format!("could not update reputation: {e}"))?;
        tracing::info!(
            chat_id = ctx.chat_id,
            user_id,
            delta,
            reason = args.str("reason").unwrap_or(""),
            "reputation changed"
        );
        let clamped = if delta != requested {
            format!(" (clamped from {requested})")
        } else {
            String::new()
        };
        Ok(ToolOutcome::Text(format!(
            "Reputation of user {user_id} changed by {delta}{clamped}, now {score}."
        )))
    }

    async fn set_relationship(&self, args: &ResolvedArgs, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let user_id = args.int("user_id").unwrap_or_default();
        let note = args.str("note").unwrap_or_default();
        self.store
            .set_relationship(ctx.chat_id, user_id, note)
            .await
            .map_err(|e| format!("could not save relationship: {e}"))?;
        Ok(ToolOutcome::Text(format!("Noted relationship with user {user_id}.")))
    }
}

/// Cap `text` at `max_chars` characters, noting how much was cut.
pub fn cap_result(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}…[truncated {} chars]", total - max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_domain::error::{Error, Result};
    use mm_store::MemoryStore;
    use mm_tools::{ImageHit, SearchHit};

    struct FakeWeb;

    #[async_trait::async_trait]
    impl WebSearch for FakeWeb {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
            if query == "fail" {
                return Err(Error::Http("503".into()));
            }
            Ok((0..limit.min(2))
                .map(|i| SearchHit {
                    title: format!("{query} {i}"),
                    url: format!("https://example.com/{i}"),
                    snippet: "snippet".into(),
                })
                .collect())
        }
    }

    struct FakeImages;

    #[async_trait::async_trait]
    impl ImageSearch for FakeImages {
        async fn find_image(&self, query: &str) -> Result<Option<ImageHit>> {
            Ok((query != "nothing").then(|| ImageHit {
                url: "https://img.example.com/cat.jpg".into(),
                title: "A cat".into(),
                source: None,
            }))
        }
    }

    fn dispatcher() -> (ToolDispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::in_memory());
        let backends = ToolBackends {
            web: Some(Arc::new(FakeWeb)),
            images: Some(Arc::new(FakeImages)),
            reader: None,
        };
        let d = ToolDispatcher::new(store.clone(), backends, ToolsConfig::default());
        (d, store)
    }

    fn ctx() -> ToolContext {
        ToolContext {
            chat_id: 42,
            user_id: Some(7),
            now: Utc::now(),
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new(name, args)
    }

    fn text(outcome: ToolOutcome) -> String {
        match outcome {
            ToolOutcome::Text(t) => t,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn names_normalize() {
        assert_eq!(normalize_name("Search-Web"), "searchweb");
        assert_eq!(normalize_name("set.reminder "), "setreminder");
        assert_eq!(find_spec("SEARCH WEB").map(|s| s.name), Some("search_web"));
        assert!(find_spec("exec").is_none());
    }

    #[test]
    fn definitions_follow_the_table() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), TOOL_SPECS.len());
        let reminder = defs.iter().find(|d| d.name == "set_reminder").unwrap();
        assert_eq!(reminder.parameters["properties"]["delay_minutes"]["type"], "integer");
        assert_eq!(reminder.parameters["required"], json!(["delay_minutes", "text"]));
    }

    #[test]
    fn aliases_and_numeric_strings_resolve() {
        let spec = find_spec("set_reminder").unwrap();
        let args = resolve_args(spec, &json!({"Minutes": " 15 ", "message": "tea"})).unwrap();
        assert_eq!(args.int("delay_minutes"), Some(15));
        assert_eq!(args.str("text"), Some("tea"));

        // Canonical name beats an alias.
        let args = resolve_args(spec, &json!({"delay": 1, "delay_minutes": 2, "text": "x"})).unwrap();
        assert_eq!(args.int("delay_minutes"), Some(2));

        assert_eq!(
            resolve_args(spec, &json!({"text": "x"})).unwrap_err(),
            ArgError::Missing("delay_minutes")
        );
    }

    #[test]
    fn non_numeric_user_id_is_typed_error() {
        let spec = find_spec("change_reputation").unwrap();
        let err = resolve_args(spec, &json!({"user_id": "@bob", "delta": 1})).unwrap_err();
        assert!(matches!(err, ArgError::NotNumeric { param: "user_id", .. }));
    }

    #[test]
    fn cap_marks_truncation() {
        assert_eq!(cap_result("short", 10), "short");
        assert_eq!(cap_result("abcdefghij", 4), "abcd…[truncated 6 chars]");
    }

    #[tokio::test]
    async fn unknown_tool_lists_available() {
        let (d, _) = dispatcher();
        let out = text(d.dispatch(&call("exec", json!({})), &ctx()).await);
        assert!(out.starts_with("error: unknown tool 'exec'"));
        assert!(out.contains("search_web"));
    }

    #[tokio::test]
    async fn search_results_are_listed_and_failures_degrade() {
        let (d, _) = dispatcher();
        let out = text(d.dispatch(&call("search_web", json!({"q": "rust"})), &ctx()).await);
        assert!(out.starts_with("1. rust 0\n   https://example.com/0"));

        let out = text(d.dispatch(&call("search_web", json!({"query": "fail"})), &ctx()).await);
        assert!(out.starts_with("error: search failed"));

        let out = text(d.dispatch(&call("read_url", json!({"url": "https://a.b"})), &ctx()).await);
        assert_eq!(out, "error: URL reading is not configured");
    }

    #[tokio::test]
    async fn image_search_returns_attachment() {
        let (d, _) = dispatcher();
        let out = d.dispatch(&call("search_image", json!({"query": "cat"})), &ctx()).await;
        assert_eq!(
            out,
            ToolOutcome::Attachment {
                url: "https://img.example.com/cat.jpg".into(),
                caption: "A cat".into(),
            }
        );
        let out = d
            .dispatch(&call("search_image", json!({"query": "cat", "title": "mine"})), &ctx())
            .await;
        assert!(matches!(out, ToolOutcome::Attachment { caption, .. } if caption == "mine"));

        let out = text(d.dispatch(&call("search_image", json!({"query": "nothing"})), &ctx()).await);
        assert!(out.starts_with("No image found"));
    }

    #[tokio::test]
    async fn reminder_delay_bounds() {
        let (d, store) = dispatcher();
        let c = ctx();

        let out = text(d.dispatch(&call("set_reminder", json!({"delay_minutes": 0, "text": "x"})), &c).await);
        assert!(out.starts_with("error: argument 'delay_minutes' must be at least"));

        let too_far = MAX_REMINDER_DELAY_MINUTES + 1;
        let out = text(
            d.dispatch(&call("set_reminder", json!({"delay_minutes": too_far, "text": "x"})), &c)
                .await,
        );
        assert!(out.contains("at most one year"));
        assert!(store.due_reminders(c.now + Duration::days(400)).await.unwrap().is_empty());

        let out = text(d.dispatch(&call("set_reminder", json!({"minutes": "10", "text": "tea"})), &c).await);
        assert!(out.starts_with("Reminder set for"));
        let due = store.due_reminders(c.now + Duration::minutes(10)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "tea");
        assert_eq!(due[0].user_id, Some(7));
    }

    #[tokio::test]
    async fn reputation_delta_is_clamped() {
        let (d, store) = dispatcher();
        let out = text(
            d.dispatch(&call("change_reputation", json!({"user": "9", "amount": 50})), &ctx())
                .await,
        );
        assert!(out.contains("changed by 10 (clamped from 50)"));
        assert_eq!(store.reputation(42, 9).await.unwrap(), 10);

        let out = text(
            d.dispatch(&call("change_reputation", json!({"user_id": "bob", "delta": 1})), &ctx())
                .await,
        );
        assert!(out.starts_with("error: argument 'user_id' must be a whole number"));
    }

    #[tokio::test]
    async fn facts_and_relationships_round_through_store() {
        let (d, store) = dispatcher();
        let c = ctx();
        d.dispatch(&call("remember_fact", json!({"text": "Ann likes tea", "user_id": 3})), &c)
            .await;
        let out = text(d.dispatch(&call("recall_facts", json!({"q": "tea"})), &c).await);
        assert_eq!(out, "- Ann likes tea (about user 3)");
        let out = text(d.dispatch(&call("recall_facts", json!({"query": "coffee"})), &c).await);
        assert_eq!(out, "No matching facts.");

        d.dispatch(&call("set_relationship", json!({"user_id": 3, "note": "old friend"})), &c)
            .await;
        let rels = store.relationships(42).await.unwrap();
        assert_eq!(rels[0].note, "old friend");
    }

    #[tokio::test]
    async fn long_results_are_capped() {
        let store = Arc::new(MemoryStore::in_memory());
        for i in 0..20 {
            store.remember_fact(1, &format!("fact number {i}"), None).await.unwrap();
        }
        let cfg = ToolsConfig {
            max_result_chars: 30,
            ..ToolsConfig::default()
        };
        let d = ToolDispatcher::new(store, ToolBackends::default(), cfg);
        let c = ToolContext { chat_id: 1, ..ctx() };
        let out = text(d.dispatch(&call("recall_facts", json!({})), &c).await);
        assert!(out.contains("…[truncated "));
        assert!(out.chars().count() < 60);
    }
}
