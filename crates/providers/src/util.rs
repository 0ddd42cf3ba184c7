//! Shared utility functions for provider adapters.

use mm_domain::config::AuthConfig;
use mm_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// `Ok(None)` means the provider is unauthenticated (local Ollama, vLLM).
/// Precedence: `key` (plaintext, warns), then `env`.
pub(crate) fn resolve_api_key(auth: &AuthConfig) -> Result<Option<String>> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key'; prefer 'env'");
        return Ok(Some(key.clone()));
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map(Some).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{env_var}' not set or not valid UTF-8"
            ))
        });
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_key_wins() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            env: Some("MM_TEST_SHOULD_NOT_BE_READ".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap().as_deref(), Some("sk-test-123"));
    }

    #[test]
    fn env_var_is_read() {
        let var_name = "MM_TEST_RESOLVE_ENV_KEY_4411";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig {
            env: Some(var_name.into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_api_key(&auth).unwrap().as_deref(),
            Some("env-secret-value")
        );
        std::env::remove_var(var_name);
    }

    #[test]
    fn missing_env_var_names_the_variable() {
        let auth = AuthConfig {
            env: Some("MM_TEST_NONEXISTENT_VAR_9090".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("MM_TEST_NONEXISTENT_VAR_9090"));
    }

    #[test]
    fn no_auth_means_anonymous() {
        assert!(resolve_api_key(&AuthConfig::default()).unwrap().is_none());
    }
}
