use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Telegram connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Long-polling Telegram connector. Disabled when the token env var is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable holding the bot token.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    #[serde(default = "d_api_base")]
    pub api_base: String,
    /// Chats the bot answers in. Empty = every chat.
    #[serde(default)]
    pub allowed_chats: Vec<i64>,
    /// `getUpdates` long-poll timeout.
    #[serde(default = "d_25")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            api_base: d_api_base(),
            allowed_chats: Vec::new(),
            poll_timeout_secs: 25,
        }
    }
}

impl TelegramConfig {
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }
}

fn d_token_env() -> String {
    "MURMUR_TELEGRAM_TOKEN".into()
}
fn d_api_base() -> String {
    "https://api.telegram.org".into()
}
fn d_25() -> u64 {
    25
}
