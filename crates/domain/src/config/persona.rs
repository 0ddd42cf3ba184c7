use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persona
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name used in the system prompt and history.
    #[serde(default = "d_name")]
    pub name: String,
    /// Extra names that count as addressing the agent in group chats
    /// (matched case-insensitively as whole words).
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Recent history entries replayed into each run.
    #[serde(default = "d_30")]
    pub history_limit: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: d_name(),
            aliases: Vec::new(),
            system_prompt: d_system_prompt(),
            history_limit: 30,
        }
    }
}

fn d_name() -> String {
    "Murmur".into()
}

fn d_system_prompt() -> String {
    "You are a member of a group chat. Keep replies short and natural. \
     Use tools when they help; never invent search results."
        .into()
}

fn d_30() -> usize {
    30
}
