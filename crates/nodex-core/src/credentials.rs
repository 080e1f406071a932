//! Provider id to API key map.
//!
//! Loaded once from the key-value store and written back after every change.
//! Keys only ever leave this process in requests to the provider they belong to.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::provider::ProviderId;
use crate::store::KeyValueStore;

/// Storage key the map is persisted under
pub const CREDENTIALS_KEY: &str = "ai-api-keys";

/// Where the key used for a dispatch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Env,
    Stored,
}

impl KeySource {
    pub fn label(&self) -> &'static str {
        match self {
            KeySource::Env => "env var",
            KeySource::Stored => "configured",
        }
    }
}

pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    keys: BTreeMap<String, String>,
    env_overrides: bool,
}

impl CredentialStore {
    /// Read the persisted map. Missing or corrupt entries start empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let keys = match store.get(CREDENTIALS_KEY)? {
            Some(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable saved API keys");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };
        debug!(providers = keys.len(), "Loaded API keys");
        Ok(Self {
            store,
            keys,
            env_overrides: false,
        })
    }

    /// Let `OPENAI_API_KEY` and friends take precedence over stored keys.
    /// Env keys are never written back.
    pub fn with_env_overrides(mut self) -> Self {
        self.env_overrides = true;
        self
    }

    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        self.keys
            .get(provider.as_str())
            .map(|k| k.as_str())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn has_key(&self, provider: ProviderId) -> bool {
        self.get(provider).is_some()
    }

    /// Store a key and persist. A blank key removes the entry.
    pub fn set(&mut self, provider: ProviderId, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return self.clear(provider);
        }
        self.keys.insert(provider.as_str().to_string(), key.to_string());
        self.persist()
    }

    pub fn clear(&mut self, provider: ProviderId) -> Result<()> {
        self.keys.remove(provider.as_str());
        self.persist()
    }

    /// Key to dispatch with, env override first
    pub fn lookup(&self, provider: ProviderId) -> Option<(String, KeySource)> {
        if self.env_overrides {
            if let Ok(key) = std::env::var(provider.env_var()) {
                if !key.trim().is_empty() {
                    return Some((key.trim().to_string(), KeySource::Env));
                }
            }
        }
        self.get(provider).map(|k| (k.to_string(), KeySource::Stored))
    }

    pub fn require(&self, provider: ProviderId) -> Result<String, DispatchError> {
        self.lookup(provider)
            .map(|(key, _)| key)
            .ok_or(DispatchError::MissingCredential(provider))
    }

    /// Raw persisted entries, including ids this build doesn't know about
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.keys)?;
        self.store.set(CREDENTIALS_KEY, &raw)
    }
}
