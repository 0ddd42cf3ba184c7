use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file. Loaded at startup, rewritten when dirty.
    #[serde(default = "d_path")]
    pub path: PathBuf,
    #[serde(default = "d_15")]
    pub flush_secs: u64,
    /// History entries retained per chat.
    #[serde(default = "d_500")]
    pub history_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            flush_secs: 15,
            history_cap: 500,
        }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("./data/murmur.json")
}
fn d_15() -> u64 {
    15
}
fn d_500() -> usize {
    500
}
