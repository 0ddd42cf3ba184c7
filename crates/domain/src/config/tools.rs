use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Limits and backends for the built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Max characters of a single tool result appended to the conversation.
    #[serde(default = "d_10000")]
    pub max_result_chars: usize,
    /// Reminders closer than this are rejected.
    #[serde(default = "d_1")]
    pub min_reminder_delay_minutes: i64,
    /// Reputation changes are clamped to ±this value per call.
    #[serde(default = "d_10")]
    pub max_reputation_delta: i64,
    /// Number of search hits rendered for the model.
    #[serde(default = "d_5")]
    pub search_results: usize,
    /// SearXNG instance used for web and image search. `None` disables both.
    #[serde(default)]
    pub searx_url: Option<String>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_result_chars: 10_000,
            min_reminder_delay_minutes: 1,
            max_reputation_delta: 10,
            search_results: 5,
            searx_url: None,
            fetch: FetchConfig::default(),
        }
    }
}

/// Limits for the URL reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "d_20")]
    pub timeout_secs: u64,
    /// Max response body size in bytes.
    #[serde(default = "d_max_bytes")]
    pub max_bytes: usize,
    /// Max extracted text characters.
    #[serde(default = "d_50000")]
    pub max_text_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_bytes: d_max_bytes(),
            max_text_chars: 50_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_10000() -> usize {
    10_000
}
fn d_1() -> i64 {
    1
}
fn d_10() -> i64 {
    10
}
fn d_5() -> usize {
    5
}
fn d_20() -> u64 {
    20
}
fn d_max_bytes() -> usize {
    2 * 1024 * 1024
}
fn d_50000() -> usize {
    50_000
}
