pub mod config;
pub mod error;
pub mod tool;

pub use error::{Error, Result};

/// Platform chat identifier (Telegram chat ids are signed 64-bit).
pub type ChatId = i64;

/// Platform user identifier.
pub type UserId = i64;
