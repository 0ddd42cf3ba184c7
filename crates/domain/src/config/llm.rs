use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Per-request timeout for provider HTTP calls.
    #[serde(default = "d_120000")]
    pub request_timeout_ms: u64,
    /// Sampling temperature for conversation turns.
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Maximum LLM rounds within one reply before the fallback answer.
    #[serde(default = "d_5")]
    pub max_depth: usize,
    /// Model roles: `executor` (conversation) and `summarizer` (compaction).
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 120_000,
            temperature: d_temperature(),
            max_depth: 5,
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name" (model part optional).
    pub model: String,
}

impl RoleConfig {
    /// Split the role spec into `(provider_id, model)`.
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.model.split_once('/') {
            Some((provider, model)) if !model.is_empty() => (provider, Some(model)),
            Some((provider, _)) => (provider, None),
            None => (self.model.as_str(), None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_120000() -> u64 {
    120_000
}
fn d_temperature() -> f32 {
    0.8
}
fn d_5() -> usize {
    5
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_split_with_model() {
        let role = RoleConfig {
            model: "openrouter/meta-llama/llama-3.3-70b".into(),
        };
        assert_eq!(role.split(), ("openrouter", Some("meta-llama/llama-3.3-70b")));
    }

    #[test]
    fn role_split_provider_only() {
        let role = RoleConfig {
            model: "local".into(),
        };
        assert_eq!(role.split(), ("local", None));
    }

    #[test]
    fn provider_kind_defaults_to_openai_compat() {
        let json = r#"{ "id": "local", "base_url": "http://localhost:11434/v1" }"#;
        let cfg: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.kind, ProviderKind::OpenaiCompat);
        assert!(cfg.auth.env.is_none());
    }

    #[test]
    fn llm_config_defaults() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.max_depth, 5);
        assert!(cfg.providers.is_empty());
    }
}
