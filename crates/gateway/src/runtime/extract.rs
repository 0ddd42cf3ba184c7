//! Tool-call extraction from raw model output.
//!
//! Structured calls reported by the provider come first. The text body is
//! then run through an ordered list of [`ToolCallDecoder`]s, one per textual
//! encoding that models are known to emit. Every recognized occurrence is
//! removed from the user-visible text, whether or not it parsed.
//!
//! Reasoning blocks and chat-template control tokens are stripped as well,
//! so the returned text is ready to send (empty text means silence).

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use mm_domain::tool::ToolCall;
use regex::Regex;
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoder contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool invocation recovered from text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub arguments: Value,
}

/// One recognized occurrence of tool-call markup.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    /// Byte range of the markup in the decoded text; always removed.
    pub span: Range<usize>,
    /// Calls found inside the markup, or why it could not be parsed.
    pub calls: Result<Vec<ParsedCall>, String>,
}

/// Recognizes one textual tool-call encoding.
pub trait ToolCallDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every occurrence in `text`, in order, with non-overlapping spans.
    fn decode(&self, text: &str) -> Vec<DecodedCall>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cleaned text plus the calls to dispatch, in emitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub calls: Vec<ToolCall>,
}

pub struct ToolCallExtractor {
    decoders: Vec<Box<dyn ToolCallDecoder>>,
}

impl ToolCallExtractor {
    /// Default decoder chain. `known_tools` is the allow-list for bare
    /// `name(...)` calls, each with the parameter a positional argument
    /// binds to.
    pub fn new<'a>(known_tools: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        Self::with_decoders(vec![
            Box::new(FunctionTagDecoder),
            Box::new(TaggedJsonDecoder),
            Box::new(CallListDecoder),
            Box::new(BareCallDecoder::new(known_tools)),
        ])
    }

    pub fn with_decoders(decoders: Vec<Box<dyn ToolCallDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn extract(&self, content: &str, structured: Vec<ToolCall>) -> Extraction {
        let mut text = strip_reasoning(content);
        let mut decoded = Vec::new();

        for decoder in &self.decoders {
            let found = decoder.decode(&text);
            if found.is_empty() {
                continue;
            }
            let mut spans = Vec::with_capacity(found.len());
            for occurrence in found {
                match occurrence.calls {
                    Ok(calls) => decoded.extend(calls),
                    Err(reason) => {
                        tracing::warn!(decoder = decoder.name(), %reason, "skipping malformed tool call");
                    }
                }
                spans.push(occurrence.span);
            }
            text = remove_spans(&text, spans);
        }

        let text = tidy(&strip_control_tokens(&text));

        let calls = if structured.is_empty() {
            decoded
                .into_iter()
                .map(|c| ToolCall::new(c.name, c.arguments))
                .collect()
        } else {
            if !decoded.is_empty() {
                tracing::debug!(
                    ignored = decoded.len(),
                    "text tool calls ignored alongside structured calls"
                );
            }
            structured
                .into_iter()
                .map(|c| {
                    if c.call_id.trim().is_empty() {
                        ToolCall::new(c.tool_name, c.arguments)
                    } else {
                        c
                    }
                })
                .collect()
        };

        Extraction { text, calls }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<function=([^>\s]+)>(.*?)</function>").expect("valid function-tag regex")
});

static PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parameter=([^>\s]+)>(.*?)</parameter>").expect("valid parameter regex")
});

/// `<function=NAME>{json}</function>` and
/// `<function=NAME><parameter=KEY>VALUE</parameter></function>`.
pub struct FunctionTagDecoder;

impl ToolCallDecoder for FunctionTagDecoder {
    fn name(&self) -> &'static str {
        "function_tag"
    }

    fn decode(&self, text: &str) -> Vec<DecodedCall> {
        FUNCTION_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps[1].trim_matches(|c| c == '"' || c == '\'').to_string();
                let body = caps[2].trim();
                let calls = function_arguments(body).map(|arguments| vec![ParsedCall { name, arguments }]);
                Some(DecodedCall {
                    span: whole.range(),
                    calls,
                })
            })
            .collect()
    }
}

fn function_arguments(body: &str) -> Result<Value, String> {
    if body.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if body.starts_with('{') {
        return match extract_json_values(body).into_iter().next() {
            Some(Value::Object(map)) => Ok(Value::Object(map)),
            _ => Err("function body is not a JSON object".into()),
        };
    }
    let mut args = Map::new();
    for caps in PARAMETER_RE.captures_iter(body) {
        args.insert(caps[1].to_string(), Value::String(caps[2].trim().to_string()));
    }
    if args.is_empty() {
        return Err("function body has neither JSON nor parameter tags".into());
    }
    Ok(Value::Object(args))
}

const TOOL_CALL_OPEN_TAGS: [&str; 3] = ["<tool_call>", "<toolcall>", "<tool-call>"];

fn find_first_tag<'a>(haystack: &str, tags: &'a [&'a str]) -> Option<(usize, &'a str)> {
    tags.iter()
        .filter_map(|tag| haystack.find(tag).map(|idx| (idx, *tag)))
        .min_by_key(|(idx, _)| *idx)
}

fn matching_tool_call_close_tag(open_tag: &str) -> Option<&'static str> {
    match open_tag {
        "<tool_call>" => Some("</tool_call>"),
        "<toolcall>" => Some("</toolcall>"),
        "<tool-call>" => Some("</tool-call>"),
        _ => None,
    }
}

/// `<tool_call>{"name": …, "arguments": …}</tool_call>` (and the
/// `<toolcall>` / `<tool-call>` spellings). The body may hold one call, a
/// list, or an object with a `tool_calls` array.
pub struct TaggedJsonDecoder;

impl ToolCallDecoder for TaggedJsonDecoder {
    fn name(&self) -> &'static str {
        "tagged_json"
    }

    fn decode(&self, text: &str) -> Vec<DecodedCall> {
        let mut out = Vec::new();
        let mut cursor = 0;

        while let Some((rel, open)) = find_first_tag(&text[cursor..], &TOOL_CALL_OPEN_TAGS) {
            let start = cursor + rel;
            let body_start = start + open.len();
            let close = matching_tool_call_close_tag(open).unwrap_or("</tool_call>");

            let (end, calls) = match text[body_start..].find(close) {
                Some(rel_end) => {
                    let body = &text[body_start..body_start + rel_end];
                    (body_start + rel_end + close.len(), tagged_body_calls(body))
                }
                // Unterminated: take the JSON value right after the tag.
                None => match json_value_end(&text[body_start..]) {
                    Some(len) => {
                        let body = &text[body_start..body_start + len];
                        (body_start + len, tagged_body_calls(body))
                    }
                    None => (text.len(), Err("unterminated tool call tag".to_string())),
                },
            };

            out.push(DecodedCall {
                span: start..end,
                calls,
            });
            cursor = end;
        }
        out
    }
}

fn tagged_body_calls(body: &str) -> Result<Vec<ParsedCall>, String> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let calls: Vec<ParsedCall> = extract_json_values(body)
        .iter()
        .flat_map(parse_tool_calls_from_json_value)
        .collect();
    if calls.is_empty() {
        return Err("tool call tag holds no parsable call".into());
    }
    Ok(calls)
}

const CALL_LIST_MARKER: &str = "[TOOL_CALLS]";

static CALL_LIST_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_\-]+)\s*(?:\[ARGS\])?").expect("valid call-list name regex")
});

/// `[TOOL_CALLS] [{"name": …, "arguments": …}, …]`, plus the
/// `[TOOL_CALLS]name[ARGS]{…}` variant.
pub struct CallListDecoder;

impl ToolCallDecoder for CallListDecoder {
    fn name(&self) -> &'static str {
        "call_list"
    }

    fn decode(&self, text: &str) -> Vec<DecodedCall> {
        let mut out = Vec::new();
        let mut cursor = 0;

        while let Some(rel) = text[cursor..].find(CALL_LIST_MARKER) {
            let start = cursor + rel;
            let after = start + CALL_LIST_MARKER.len();
            let rest = &text[after..];

            let decoded = if let Some(len) = json_value_end(rest) {
                let calls: Vec<ParsedCall> = extract_json_values(&rest[..len])
                    .iter()
                    .flat_map(parse_tool_calls_from_json_value)
                    .collect();
                let calls = if calls.is_empty() {
                    Err("call list holds no parsable call".to_string())
                } else {
                    Ok(calls)
                };
                DecodedCall {
                    span: start..after + len,
                    calls,
                }
            } else if let Some(caps) = CALL_LIST_NAME_RE.captures(rest) {
                let name_end = caps.get(0).map_or(0, |m| m.end());
                match json_value_end(&rest[name_end..]) {
                    Some(len) => DecodedCall {
                        span: start..after + name_end + len,
                        calls: Ok(vec![ParsedCall {
                            name: caps[1].to_string(),
                            arguments: parse_arguments_value(
                                extract_json_values(&rest[name_end..name_end + len]).first(),
                            ),
                        }]),
                    },
                    None => malformed_to_line_end(text, start, "call list marker without arguments"),
                }
            } else {
                malformed_to_line_end(text, start, "call list marker without a list")
            };

            cursor = decoded.span.end.max(after);
            out.push(decoded);
        }
        out
    }
}

fn malformed_to_line_end(text: &str, start: usize, reason: &str) -> DecodedCall {
    let end = text[start..].find('\n').map_or(text.len(), |i| start + i);
    DecodedCall {
        span: start..end,
        calls: Err(reason.to_string()),
    }
}

static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*([=:])\s*").expect("valid bare-argument key regex")
});

static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$").expect("valid bare-url regex")
});

/// `name(key="value", key2=3)` or `name("positional")`, only for names on
/// the allow-list.
pub struct BareCallDecoder {
    pattern: Option<Regex>,
    positional: HashMap<String, Option<String>>,
}

impl BareCallDecoder {
    pub fn new<'a>(known_tools: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let positional: HashMap<String, Option<String>> = known_tools
            .into_iter()
            .map(|(name, param)| (name.to_string(), param.map(str::to_string)))
            .collect();

        let pattern = if positional.is_empty() {
            None
        } else {
            let mut names: Vec<&str> = positional.keys().map(String::as_str).collect();
            // Longest first so `recall_facts_all` never matches as `recall_facts`.
            names.sort_by_key(|n| std::cmp::Reverse(n.len()));
            let alternation = names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
            match Regex::new(&format!(r"\b({alternation})\s*\(")) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(error = %e, "bare tool-call pattern disabled");
                    None
                }
            }
        };

        Self { pattern, positional }
    }
}

impl ToolCallDecoder for BareCallDecoder {
    fn name(&self) -> &'static str {
        "bare_call"
    }

    fn decode(&self, text: &str) -> Vec<DecodedCall> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut last_end = 0;

        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() < last_end {
                continue;
            }
            let name = caps[1].to_string();
            let args_start = whole.end();
            // Without a closing paren this is prose, not a call.
            let Some(close) = find_call_close(&text[args_start..]) else {
                continue;
            };
            let mut span = whole.start()..args_start + close + 1;
            if text[..span.start].ends_with('`') && text[span.end..].starts_with('`') {
                span = span.start - 1..span.end + 1;
            }

            let positional = self.positional.get(&name).and_then(|p| p.as_deref());
            let calls = match parse_bare_args(&text[args_start..args_start + close], positional) {
                Ok(Some(args)) => Ok(vec![ParsedCall { name, arguments: Value::Object(args) }]),
                Ok(None) => continue,
                Err(reason) => Err(reason),
            };

            last_end = span.end;
            out.push(DecodedCall { span, calls });
        }
        out
    }
}

/// Byte index of the `)` closing a call whose `(` precedes `s`.
fn find_call_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match (quote, ch) {
            (Some(_), '\\') => escape_next = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') if depth == 0 => return Some(i),
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    None
}

/// One bare argument value. Unquoted words only count as arguments after
/// `key=` or when they are URLs; anywhere else they mark the parentheses as
/// prose.
enum BareValue {
    Literal(Value),
    Word(String),
}

/// `Ok(None)` means the parenthesized text reads as prose, not a call.
fn parse_bare_args(
    src: &str,
    positional: Option<&str>,
) -> Result<Option<Map<String, Value>>, String> {
    let mut args = Map::new();
    let mut rest = src.trim();
    let mut positional_used = false;

    while !rest.is_empty() {
        let (key, after) = match BARE_KEY_RE.captures(rest) {
            // `https://…` is a value, not the key `https`.
            Some(caps) if &caps[2] == ":" && rest[caps[0].len()..].starts_with("//") => (None, rest),
            Some(caps) => {
                let end = caps.get(0).map_or(0, |m| m.end());
                (Some((caps[1].to_string(), &caps[2] == "=")), &rest[end..])
            }
            None => (None, rest),
        };

        let (value, after) = parse_bare_value(after)?;

        let value = match (&key, value) {
            (_, BareValue::Literal(v)) => v,
            (Some((_, true)), BareValue::Word(w)) => Value::String(w),
            (_, BareValue::Word(w)) if BARE_URL_RE.is_match(&w) => Value::String(w),
            (_, BareValue::Word(_)) => return Ok(None),
        };

        match (key, value) {
            (Some((k, _)), v) => {
                args.insert(k, v);
            }
            (None, Value::Object(map)) => args.extend(map),
            (None, v) => {
                let param = positional
                    .filter(|_| !positional_used)
                    .ok_or_else(|| "unexpected positional argument".to_string())?;
                positional_used = true;
                args.insert(param.to_string(), v);
            }
        }

        rest = after.trim_start();
        if let Some(next) = rest.strip_prefix(',') {
            rest = next.trim_start();
        } else if !rest.is_empty() {
            return Err(format!("expected ',' before {rest:?}"));
        }
    }
    Ok(Some(args))
}

/// Parse one value; returns it and the unparsed remainder.
fn parse_bare_value(s: &str) -> Result<(BareValue, &str), String> {
    let s = s.trim_start();
    let Some(first) = s.chars().next() else {
        return Err("missing argument value".into());
    };

    if first == '"' || first == '\'' {
        let mut out = String::new();
        let mut escape_next = false;
        for (i, ch) in s.char_indices().skip(1) {
            if escape_next {
                out.push(match ch {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == first {
                return Ok((BareValue::Literal(Value::String(out)), &s[i + ch.len_utf8()..]));
            } else {
                out.push(ch);
            }
        }
        return Err("unterminated string argument".into());
    }

    if first == '{' || first == '[' {
        let len = json_value_end(s).ok_or_else(|| "invalid JSON argument".to_string())?;
        let value = serde_json::from_str(&s[..len]).map_err(|e| e.to_string())?;
        return Ok((BareValue::Literal(value), &s[len..]));
    }

    let end = s.find(',').unwrap_or(s.len());
    let token = s[..end].trim();
    if token.is_empty() {
        return Err("missing argument value".into());
    }
    let value = if let Ok(n) = token.parse::<i64>() {
        BareValue::Literal(Value::from(n))
    } else if let Ok(f) = token.parse::<f64>() {
        BareValue::Literal(Value::from(f))
    } else {
        match token {
            "true" | "True" => BareValue::Literal(Value::Bool(true)),
            "false" | "False" => BareValue::Literal(Value::Bool(false)),
            "null" | "None" => BareValue::Literal(Value::Null),
            other => BareValue::Word(other.to_string()),
        }
    };
    Ok((value, &s[end..]))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Arguments as a JSON object. Strings are parsed as JSON; anything that is
/// not an object becomes `{}`.
fn parse_arguments_value(raw: Option<&Value>) -> Value {
    let parsed = match raw {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).ok(),
        Some(value) => Some(value.clone()),
        None => None,
    };
    match parsed {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    }
}

fn parse_tool_call_value(value: &Value) -> Option<ParsedCall> {
    if let Some(function) = value.get("function") {
        let name = function.get("name").and_then(Value::as_str).unwrap_or("").trim();
        if !name.is_empty() {
            return Some(ParsedCall {
                name: name.to_string(),
                arguments: parse_arguments_value(function.get("arguments")),
            });
        }
    }

    let name = value.get("name").and_then(Value::as_str).unwrap_or("").trim();
    if name.is_empty() {
        return None;
    }
    let raw = value.get("arguments").or_else(|| value.get("parameters"));
    Some(ParsedCall {
        name: name.to_string(),
        arguments: parse_arguments_value(raw),
    })
}

fn parse_tool_calls_from_json_value(value: &Value) -> Vec<ParsedCall> {
    if let Some(tool_calls) = value.get("tool_calls").and_then(Value::as_array) {
        let calls: Vec<ParsedCall> = tool_calls.iter().filter_map(parse_tool_call_value).collect();
        if !calls.is_empty() {
            return calls;
        }
    }
    if let Some(array) = value.as_array() {
        return array.iter().filter_map(parse_tool_call_value).collect();
    }
    parse_tool_call_value(value).into_iter().collect()
}

/// Every JSON object or array embedded in `input`, in order.
fn extract_json_values(input: &str) -> Vec<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return vec![value];
    }

    let mut values = Vec::new();
    let mut idx = 0;
    while idx < trimmed.len() {
        let Some(rel) = trimmed[idx..].find(['{', '[']) else {
            break;
        };
        let start = idx + rel;
        let mut stream = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if stream.byte_offset() > 0 => {
                values.push(value);
                idx = start + stream.byte_offset();
            }
            _ => idx = start + 1,
        }
    }
    values
}

/// Length of the JSON object or array at the start of `input` (leading
/// whitespace included), if it parses.
fn json_value_end(input: &str) -> Option<usize> {
    let trimmed = input.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let mut stream = serde_json::Deserializer::from_str(input).into_iter::<Value>();
    match stream.next() {
        Some(Ok(_)) => Some(stream.byte_offset()),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text cleanup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

static REASONING_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:think|thinking|reasoning)>.*?</(?:think|thinking|reasoning)>")
        .expect("valid reasoning-block regex")
});

static REASONING_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:think|thinking|reasoning)>").expect("valid reasoning-close regex")
});

static REASONING_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:think|thinking|reasoning)>.*\z").expect("valid reasoning-open regex")
});

static CONTROL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\|[^|<>\n]{0,64}\|>|</s>|\[/?INST\]").expect("valid control-token regex")
});

/// Remove reasoning blocks, including an unterminated trailing block and
/// text before a dangling close tag.
pub fn strip_reasoning(content: &str) -> String {
    let text = REASONING_BLOCK_RE.replace_all(content, "");
    let text = match REASONING_CLOSE_RE.find_iter(&text).last() {
        Some(m) => text[m.end()..].to_string(),
        None => text.into_owned(),
    };
    REASONING_OPEN_RE.replace(&text, "").into_owned()
}

fn strip_control_tokens(text: &str) -> String {
    CONTROL_TOKEN_RE.replace_all(text, "").into_owned()
}

/// Trim trailing spaces per line, collapse blank-line runs, trim the whole.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_blank = false;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !prev_blank && !out.is_empty() {
                out.push('\n');
            }
            prev_blank = true;
        } else {
            out.push_str(line);
            out.push('\n');
            prev_blank = false;
        }
    }
    out.trim().to_string()
}

fn remove_spans(text: &str, mut spans: Vec<Range<usize>>) -> String {
    spans.sort_by_key(|s| s.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        let start = span.start.max(cursor).min(text.len());
        let end = span.end.min(text.len());
        if start >= end {
            continue;
        }
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}
