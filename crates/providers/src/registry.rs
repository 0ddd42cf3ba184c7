//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars, direct
//! keys), and instantiates the adapter for each configured provider.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use mm_domain::config::{LlmConfig, ProviderKind, RoleConfig};
use mm_domain::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Role used for conversation turns.
pub const ROLE_EXECUTOR: &str = "executor";
/// Role used for compaction summaries. Falls back to the executor.
pub const ROLE_SUMMARIZER: &str = "summarizer";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers and role assignments.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    roles: HashMap<String, RoleConfig>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize are logged and skipped rather than
    /// aborting the entire startup.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() {
            tracing::warn!("no LLM providers initialized; every turn will fail until one is configured");
        }

        Ok(Self {
            providers,
            roles: config.roles.clone(),
        })
    }

    /// Build a registry from already-constructed providers (tests, embedding).
    pub fn from_providers(
        providers: Vec<Arc<dyn LlmProvider>>,
        roles: HashMap<String, RoleConfig>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.provider_id().to_string(), p))
            .collect();
        Self { providers, roles }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Get the provider assigned to a given role.
    ///
    /// Resolution: the role's configured provider, then the executor role
    /// (for any other role), then the only registered provider when exactly
    /// one exists.
    pub fn for_role(&self, role: &str) -> Option<Arc<dyn LlmProvider>> {
        if let Some(rc) = self.roles.get(role) {
            let (provider_id, _) = rc.split();
            return self.providers.get(provider_id).cloned();
        }
        if role != ROLE_EXECUTOR {
            return self.for_role(ROLE_EXECUTOR);
        }
        if self.providers.len() == 1 {
            return self.providers.values().next().cloned();
        }
        None
    }

    /// Model override configured for a role (`None` = provider default).
    pub fn model_for_role(&self, role: &str) -> Option<String> {
        match self.roles.get(role) {
            Some(rc) => rc.split().1.map(String::from),
            None if role != ROLE_EXECUTOR => self.model_for_role(ROLE_EXECUTOR),
            None => None,
        }
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
