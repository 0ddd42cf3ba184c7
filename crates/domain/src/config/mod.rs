mod compaction;
mod llm;
mod observability;
mod persona;
mod scheduling;
mod server;
mod store;
mod telegram;
mod tools;

pub use compaction::*;
pub use llm::*;
pub use observability::*;
pub use persona::*;
pub use scheduling::*;
pub use server::*;
pub use store::*;
pub use telegram::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    /// Empty when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        // ── llm ──────────────────────────────────────────────────────
        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning(
                "llm.providers",
                "no LLM providers configured",
            ));
        }
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }
        for (role, rc) in &self.llm.roles {
            let (provider_id, _) = rc.split();
            if !self.llm.providers.iter().any(|p| p.id == provider_id) {
                errors.push(ConfigError::error(
                    format!("llm.roles.{role}.model"),
                    format!("unknown provider \"{provider_id}\""),
                ));
            }
        }
        if self.llm.max_depth == 0 {
            errors.push(ConfigError::error(
                "llm.max_depth",
                "max_depth must be at least 1",
            ));
        }

        // ── compaction ───────────────────────────────────────────────
        if self.compaction.hard_char_ceiling == 0 {
            errors.push(ConfigError::error(
                "compaction.hard_char_ceiling",
                "ceiling must be greater than 0",
            ));
        }
        if self.compaction.summarize
            && self.compaction.soft_summarize_threshold < self.compaction.hard_char_ceiling
        {
            errors.push(ConfigError::warning(
                "compaction.soft_summarize_threshold",
                "threshold is below hard_char_ceiling; every truncation will summarize first",
            ));
        }

        // ── scheduling ───────────────────────────────────────────────
        let p = self.scheduling.reply_probability;
        if !(0.0..=1.0).contains(&p) {
            errors.push(ConfigError::error(
                "scheduling.reply_probability",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.scheduling.batch_window_secs == 0 {
            errors.push(ConfigError::error(
                "scheduling.batch_window_secs",
                "batch window must be greater than 0",
            ));
        }
        if self.scheduling.reminder_poll_secs == 0 {
            errors.push(ConfigError::error(
                "scheduling.reminder_poll_secs",
                "poll interval must be greater than 0",
            ));
        }
        if self.scheduling.idle_min_minutes > self.scheduling.idle_max_minutes {
            errors.push(ConfigError::error(
                "scheduling.idle_min_minutes",
                "idle_min_minutes must not exceed idle_max_minutes",
            ));
        }

        // ── tools ────────────────────────────────────────────────────
        if self.tools.max_result_chars == 0 {
            errors.push(ConfigError::error(
                "tools.max_result_chars",
                "must be greater than 0",
            ));
        }
        if self.tools.min_reminder_delay_minutes < 0 {
            errors.push(ConfigError::error(
                "tools.min_reminder_delay_minutes",
                "must not be negative",
            ));
        }
        if self.tools.searx_url.is_none() {
            errors.push(ConfigError::warning(
                "tools.searx_url",
                "search_web and search_image will report that search is unavailable",
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_provider() -> Config {
        let mut cfg = Config::default();
        cfg.llm.providers.push(ProviderConfig {
            id: "local".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "http://localhost:11434/v1".into(),
            auth: AuthConfig::default(),
            default_model: Some("qwen2.5".into()),
        });
        cfg.tools.searx_url = Some("http://localhost:8888".into());
        cfg
    }

    #[test]
    fn configured_defaults_are_clean() {
        let issues = with_provider().validate();
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn role_pointing_at_unknown_provider_is_an_error() {
        let mut cfg = with_provider();
        cfg.llm.roles.insert(
            "executor".into(),
            RoleConfig {
                model: "missing/model".into(),
            },
        );
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "llm.roles.executor.model" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn soft_below_hard_warns() {
        let mut cfg = with_provider();
        cfg.compaction.soft_summarize_threshold = 1_000;
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn probability_out_of_range_is_an_error() {
        let mut cfg = with_provider();
        cfg.scheduling.reply_probability = 1.5;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "scheduling.reply_probability"));
    }

    #[test]
    fn display_tags_severity() {
        let e = ConfigError::warning("a.b", "c");
        assert_eq!(e.to_string(), "[WARN] a.b: c");
    }
}
