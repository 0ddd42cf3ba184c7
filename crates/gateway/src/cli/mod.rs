pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mm_domain::config::Config;

/// Murmur: a chat agent that knows when to speak.
#[derive(Debug, Parser)]
#[command(name = "murmur", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the agent: Telegram polling, timers and the HTTP API
    /// (default when no subcommand is given).
    Serve,
    /// Send a single message to the agent and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Chat id to run in; history and memory are shared with the
        /// real chat of the same id.
        #[arg(long, default_value_t = run::DEFAULT_CHAT_ID)]
        chat: i64,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `MURMUR_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(Config, PathBuf)> {
    let config_path =
        PathBuf::from(std::env::var("MURMUR_CONFIG").unwrap_or_else(|_| "config.toml".into()));

    let config = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", config_path.display()))?;
        parse_config(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", config_path.display()))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

pub fn parse_config(raw: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = parse_config(
            r#"
            [persona]
            name = "Pip"
            aliases = ["pipster"]

            [scheduling]
            reply_probability = 0.5
            idle_enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.persona.name, "Pip");
        assert_eq!(cfg.scheduling.reply_probability, 0.5);
        assert!(cfg.scheduling.idle_enabled);
        assert_eq!(cfg.scheduling.batch_window_secs, 30);
        assert_eq!(cfg.compaction.hard_char_ceiling, 60_000);
        assert_eq!(cfg.server.port, 3210);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(parse_config("[scheduling]\nbatch_window_secs = \"soon\"").is_err());
    }

    #[test]
    fn cli_parses_run_with_chat() {
        let cli = Cli::try_parse_from(["murmur", "run", "hello there", "--chat", "42"]).unwrap();
        match cli.command {
            Some(Command::Run { message, chat }) => {
                assert_eq!(message, "hello there");
                assert_eq!(chat, 42);
            }
            other => panic!("unexpected command {other:?}"),
        }
        let bare = Cli::try_parse_from(["murmur"]).unwrap();
        assert!(bare.command.is_none());
    }
}
