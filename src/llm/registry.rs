use std::collections::HashMap;
use std::sync::Arc;

use crate::config::OracleConfig;
use crate::errors::{PilotError, PilotResult};
use crate::llm::offline::{OfflineOracle, OFFLINE_PROVIDER};
use crate::llm::provider::Oracle;
use crate::llm::providers::anthropic::AnthropicProvider;

/// Registry of all available oracles, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Oracle>>,
    active: String,
    offline_fallback: bool,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active,
            offline_fallback: false,
        };
        registry.register(Arc::new(OfflineOracle));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Oracle>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// The configured oracle, or the offline planner when the configured one
    /// was skipped for lack of a credential and fallback is enabled.
    pub fn get_active(&self) -> PilotResult<Arc<dyn Oracle>> {
        if let Some(provider) = self.providers.get(&self.active) {
            return Ok(provider.clone());
        }
        if self.offline_fallback {
            tracing::warn!(active = %self.active, "active provider unavailable, using offline planner");
            if let Some(offline) = self.providers.get(OFFLINE_PROVIDER) {
                return Ok(offline.clone());
            }
        }
        Err(PilotError::Config(format!(
            "Active provider '{}' not found in registry",
            self.active
        )))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry from the `[oracle]` config section.
    /// API keys are read from environment variables named `TABPILOT_<ID>_API_KEY`,
    /// falling back to `api_key` in the provider entry.
    pub fn from_config(config: &OracleConfig) -> Self {
        let mut registry = Self::new(config.active_provider.clone());
        registry.offline_fallback = config.offline_fallback;

        for (id, entry) in &config.providers {
            if id == OFFLINE_PROVIDER {
                tracing::warn!(provider = %id, "provider id is reserved for the offline planner, entry ignored");
                continue;
            }
            if entry.adapter != "anthropic" {
                tracing::warn!(provider = %id, adapter = %entry.adapter, "unsupported adapter, provider skipped");
                continue;
            }
            let api_key = std::env::var(format!("TABPILOT_{}_API_KEY", id.to_uppercase()))
                .ok()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| entry.api_key.clone())
                .unwrap_or_default();
            if api_key.trim().is_empty() && config.offline_fallback {
                tracing::info!(provider = %id, "no API key configured, provider skipped");
                continue;
            }
            registry.register(Arc::new(AnthropicProvider::new(id.clone(), entry, api_key)));
        }
        registry
    }
}
