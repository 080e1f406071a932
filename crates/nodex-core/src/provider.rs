use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    Groq,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Groq => "groq",
        }
    }

    pub fn all() -> Vec<ProviderId> {
        vec![ProviderId::OpenAI, ProviderId::Anthropic, ProviderId::Groq]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Groq => "Groq",
        }
    }

    /// Environment variable that overrides the stored key
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OPENAI_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Groq => "GROQ_API_KEY",
        }
    }
}

impl FromStr for ProviderId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "anthropic" => Ok(ProviderId::Anthropic),
            "groq" => Ok(ProviderId::Groq),
            _ => Err(DispatchError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Request/response shape a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `/chat/completions` with bearer auth (OpenAI, Groq)
    OpenAiCompatible,
    /// `/v1/messages` with `x-api-key` auth
    Anthropic,
}

/// Result of checking a key against the provider's expected format.
/// Advisory only: a key that doesn't match is still used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Valid,
    UnexpectedFormat,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub description: &'static str,
    pub available_models: Vec<String>,
    pub endpoint_url: String,
    pub requires_api_key: bool,
    pub help_url: &'static str,
    pub wire_format: WireFormat,
    key_pattern: Regex,
}

impl ProviderConfig {
    pub fn default_model(&self) -> &str {
        self.available_models
            .first()
            .map(|m| m.as_str())
            .unwrap_or_default()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.available_models.iter().any(|m| m == model)
    }

    pub fn validate_key(&self, key: &str) -> KeyStatus {
        let key = key.trim();
        if key.is_empty() {
            KeyStatus::Missing
        } else if self.key_pattern.is_match(key) {
            KeyStatus::Valid
        } else {
            KeyStatus::UnexpectedFormat
        }
    }
}

fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|m| m.to_string()).collect()
}

fn pattern(re: &str) -> Regex {
    // Patterns are compile-time constants; a failure here is a typo caught by tests.
    Regex::new(re).unwrap_or_else(|e| panic!("invalid key pattern {re}: {e}"))
}

fn builtin_config(id: ProviderId) -> ProviderConfig {
    match id {
        ProviderId::OpenAI => ProviderConfig {
            id,
            display_name: id.display_name(),
            description: "GPT-4, GPT-3.5-turbo models",
            available_models: models(&["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"]),
            endpoint_url: "https://api.openai.com/v1/chat/completions".to_string(),
            requires_api_key: true,
            help_url: "https://platform.openai.com/api-keys",
            wire_format: WireFormat::OpenAiCompatible,
            key_pattern: pattern(r"^sk-[a-zA-Z0-9]{48}$"),
        },
        ProviderId::Anthropic => ProviderConfig {
            id,
            display_name: id.display_name(),
            description: "Claude 3 models",
            available_models: models(&[
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ]),
            endpoint_url: "https://api.anthropic.com/v1/messages".to_string(),
            requires_api_key: true,
            help_url: "https://console.anthropic.com/account/keys",
            wire_format: WireFormat::Anthropic,
            key_pattern: pattern(r"^sk-ant-[a-zA-Z0-9\-_]{95}$"),
        },
        ProviderId::Groq => ProviderConfig {
            id,
            display_name: id.display_name(),
            description: "Fast inference models",
            available_models: models(&["mixtral-8x7b-32768", "llama2-70b-4096"]),
            endpoint_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            requires_api_key: true,
            help_url: "https://console.groq.com/keys",
            wire_format: WireFormat::OpenAiCompatible,
            key_pattern: pattern(r"^gsk_[a-zA-Z0-9]{52}$"),
        },
    }
}

/// The fixed provider table, keyed by provider id
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn builtin() -> Self {
        Self {
            providers: ProviderId::all().into_iter().map(builtin_config).collect(),
        }
    }

    /// Point a provider at a different endpoint (mock servers, compatible proxies)
    pub fn with_endpoint(mut self, id: ProviderId, url: &str) -> Self {
        if let Some(config) = self.providers.iter_mut().find(|p| p.id == id) {
            config.endpoint_url = url.to_string();
        }
        self
    }

    pub fn get(&self, id: ProviderId) -> &ProviderConfig {
        // Every ProviderId has an entry: the table is built from ProviderId::all().
        self.providers
            .iter()
            .find(|p| p.id == id)
            .unwrap_or_else(|| unreachable!("provider table is missing {id:?}"))
    }

    pub fn all(&self) -> &[ProviderConfig] {
        &self.providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_providers() {
        assert_eq!("openai".parse::<ProviderId>().unwrap(), ProviderId::OpenAI);
        assert_eq!("Anthropic".parse::<ProviderId>().unwrap(), ProviderId::Anthropic);
        assert_eq!(" groq ".parse::<ProviderId>().unwrap(), ProviderId::Groq);
    }

    #[test]
    fn test_parse_unknown_provider() {
        let err = "gemini".parse::<ProviderId>().unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedProvider(ref id) if id == "gemini"));
    }

    #[test]
    fn test_round_trip_ids() {
        for id in ProviderId::all() {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
    }

    #[test]
    fn test_first_model_is_default() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.get(ProviderId::OpenAI).default_model(), "gpt-4");
        assert_eq!(
            registry.get(ProviderId::Anthropic).default_model(),
            "claude-3-opus-20240229"
        );
        assert_eq!(registry.get(ProviderId::Groq).default_model(), "mixtral-8x7b-32768");
    }

    #[test]
    fn test_groq_speaks_openai_format() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.get(ProviderId::Groq).wire_format, WireFormat::OpenAiCompatible);
        assert_eq!(registry.get(ProviderId::Anthropic).wire_format, WireFormat::Anthropic);
    }

    #[test]
    fn test_with_endpoint_overrides_one_provider() {
        let registry = ProviderRegistry::builtin().with_endpoint(ProviderId::Groq, "http://localhost:1234");
        assert_eq!(registry.get(ProviderId::Groq).endpoint_url, "http://localhost:1234");
        assert_eq!(
            registry.get(ProviderId::OpenAI).endpoint_url,
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_validate_key_formats() {
        let registry = ProviderRegistry::builtin();
        let openai = registry.get(ProviderId::OpenAI);
        let good = format!("sk-{}", "a".repeat(48));
        assert_eq!(openai.validate_key(&good), KeyStatus::Valid);
        assert_eq!(openai.validate_key("sk-short"), KeyStatus::UnexpectedFormat);
        assert_eq!(openai.validate_key("   "), KeyStatus::Missing);

        let anthropic = registry.get(ProviderId::Anthropic);
        let good = format!("sk-ant-{}", "a-_".repeat(31) + "ab");
        assert_eq!(anthropic.validate_key(&good), KeyStatus::Valid);

        let groq = registry.get(ProviderId::Groq);
        let good = format!("gsk_{}", "Z9".repeat(26));
        assert_eq!(groq.validate_key(&good), KeyStatus::Valid);
        assert_eq!(groq.validate_key(&format!("sk-{}", "a".repeat(48))), KeyStatus::UnexpectedFormat);
    }

    #[test]
    fn test_has_model() {
        let registry = ProviderRegistry::builtin();
        assert!(registry.get(ProviderId::Groq).has_model("llama2-70b-4096"));
        assert!(!registry.get(ProviderId::Groq).has_model("gpt-4"));
    }
}
