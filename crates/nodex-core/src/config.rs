use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::provider::{ProviderId, ProviderRegistry};
use crate::store::KeyValueStore;

/// Storage key for user preferences
pub const CONFIG_KEY: &str = "config";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(ProviderId::OpenAI.as_str().to_string()),
            default_model: None,
        }
    }

    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        match store.get(CONFIG_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Self::new()),
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        store.set(CONFIG_KEY, &raw)
    }

    /// Remember the provider and model the user picked
    pub fn save_selection(store: &dyn KeyValueStore, provider: ProviderId, model: &str) -> Result<()> {
        let mut config = Self::load(store).unwrap_or_else(|_| Self::new());
        config.provider = Some(provider.as_str().to_string());
        config.default_model = Some(model.to_string());
        config.save(store)
    }

    /// Provider and model to start with. Unknown providers fall back to
    /// OpenAI; models the provider doesn't offer fall back to its default.
    pub fn resolve(&self, registry: &ProviderRegistry) -> (ProviderId, String) {
        let provider = self
            .provider
            .as_deref()
            .and_then(|p| p.parse::<ProviderId>().ok())
            .unwrap_or(ProviderId::OpenAI);

        let config = registry.get(provider);
        let model = self
            .default_model
            .as_deref()
            .filter(|m| config.has_model(m))
            .unwrap_or_else(|| config.default_model())
            .to_string();

        (provider, model)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_defaults_when_missing() {
        let store = MemoryStore::new();
        let config = Config::load(&store).unwrap();
        assert_eq!(config, Config::new());

        let (provider, model) = config.resolve(&ProviderRegistry::builtin());
        assert_eq!(provider, ProviderId::OpenAI);
        assert_eq!(model, "gpt-4");
    }

    #[test]
    fn test_save_selection_round_trip() {
        let store = MemoryStore::new();
        Config::save_selection(&store, ProviderId::Groq, "llama2-70b-4096").unwrap();

        let config = Config::load(&store).unwrap();
        let (provider, model) = config.resolve(&ProviderRegistry::builtin());
        assert_eq!(provider, ProviderId::Groq);
        assert_eq!(model, "llama2-70b-4096");
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let config = Config {
            provider: Some("ollama".to_string()),
            default_model: Some("gemma3:latest".to_string()),
        };
        let (provider, model) = config.resolve(&ProviderRegistry::builtin());
        assert_eq!(provider, ProviderId::OpenAI);
        assert_eq!(model, "gpt-4");
    }

    #[test]
    fn test_model_from_other_provider_falls_back() {
        let config = Config {
            provider: Some("anthropic".to_string()),
            default_model: Some("gpt-4".to_string()),
        };
        let (provider, model) = config.resolve(&ProviderRegistry::builtin());
        assert_eq!(provider, ProviderId::Anthropic);
        assert_eq!(model, "claude-3-opus-20240229");
    }
}
