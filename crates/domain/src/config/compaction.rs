use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction keeps the conversation buffer under a character budget by
/// summarizing old history and truncating the oldest messages.
///
/// Sizes are measured on the compact JSON serialization of the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Summarize when the buffer exceeds `soft_summarize_threshold`.
    #[serde(default = "d_true")]
    pub summarize: bool,
    /// Exclusive hard ceiling: a buffer of this size or larger loses its
    /// oldest non-system messages until it is strictly smaller.
    #[serde(default = "d_60000")]
    pub hard_char_ceiling: usize,
    /// Size above which a summary of older history is generated.
    #[serde(default = "d_90000")]
    pub soft_summarize_threshold: usize,
    /// Raw messages kept verbatim after a summary.
    #[serde(default = "d_10")]
    pub keep_last_messages: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            summarize: true,
            hard_char_ceiling: 60_000,
            soft_summarize_threshold: 90_000,
            keep_last_messages: 10,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_60000() -> usize {
    60_000
}
fn d_90000() -> usize {
    90_000
}
fn d_10() -> usize {
    10
}
