use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduling (batching, idle wake, reminders)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timers that feed the orchestrator outside of direct address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Quiet period after the first unaddressed message before one passive
    /// decision is made for the whole batch.
    #[serde(default = "d_30")]
    pub batch_window_secs: u64,
    /// Fraction of passive messages that should lead to a reply (0.0–1.0).
    /// Chats may override it with the `reply_probability` setting.
    #[serde(default = "d_reply_probability")]
    pub reply_probability: f64,
    /// Spontaneously speak up in chats that have gone quiet.
    #[serde(default)]
    pub idle_enabled: bool,
    /// Lower bound of the randomized idle delay.
    #[serde(default = "d_120")]
    pub idle_min_minutes: u64,
    /// Upper bound of the randomized idle delay.
    #[serde(default = "d_360")]
    pub idle_max_minutes: u64,
    /// Interval of the reminder sweep.
    #[serde(default = "d_30")]
    pub reminder_poll_secs: u64,
    /// Sessions untouched for this long are dropped from the registry.
    #[serde(default = "d_720")]
    pub session_ttl_minutes: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            batch_window_secs: 30,
            reply_probability: d_reply_probability(),
            idle_enabled: false,
            idle_min_minutes: 120,
            idle_max_minutes: 360,
            reminder_poll_secs: 30,
            session_ttl_minutes: 720,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30() -> u64 {
    30
}
fn d_120() -> u64 {
    120
}
fn d_360() -> u64 {
    360
}
fn d_720() -> u64 {
    720
}
fn d_reply_probability() -> f64 {
    0.2
}
