use mm_domain::config::Config;

#[test]
fn empty_file_yields_full_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
    assert_eq!(config.llm.max_depth, 5);
    assert_eq!(config.compaction.hard_char_ceiling, 60_000);
    assert_eq!(config.compaction.soft_summarize_threshold, 90_000);
    assert_eq!(config.compaction.keep_last_messages, 10);
    assert_eq!(config.scheduling.batch_window_secs, 30);
    assert_eq!(config.scheduling.reminder_poll_secs, 30);
    assert_eq!(config.tools.max_result_chars, 10_000);
    assert_eq!(config.tools.min_reminder_delay_minutes, 1);
    assert_eq!(config.telegram.token_env, "MURMUR_TELEGRAM_TOKEN");
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml_str = r#"
[scheduling]
batch_window_secs = 5
idle_enabled = true

[persona]
name = "Wren"
aliases = ["wren", "birb"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.scheduling.batch_window_secs, 5);
    assert!(config.scheduling.idle_enabled);
    assert_eq!(config.scheduling.idle_min_minutes, 120);
    assert_eq!(config.persona.name, "Wren");
    assert_eq!(config.persona.aliases.len(), 2);
    assert_eq!(config.persona.history_limit, 30);
}

#[test]
fn providers_and_roles_parse() {
    let toml_str = r#"
[[llm.providers]]
id = "openrouter"
base_url = "https://openrouter.ai/api/v1"
default_model = "meta-llama/llama-3.3-70b-instruct"

[llm.providers.auth]
env = "OPENROUTER_API_KEY"

[llm.roles.executor]
model = "openrouter/meta-llama/llama-3.3-70b-instruct"

[llm.roles.summarizer]
model = "openrouter"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.providers.len(), 1);
    assert_eq!(
        config.llm.providers[0].auth.env.as_deref(),
        Some("OPENROUTER_API_KEY")
    );
    assert_eq!(config.llm.roles["summarizer"].split(), ("openrouter", None));
    assert!(config
        .validate()
        .iter()
        .all(|e| e.field != "llm.roles.executor.model"));
}

#[test]
fn telegram_allow_list() {
    let toml_str = r#"
[telegram]
allowed_chats = [-100123, 42]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.telegram.is_chat_allowed(42));
    assert!(!config.telegram.is_chat_allowed(7));
    assert!(Config::default().telegram.is_chat_allowed(7));
}
