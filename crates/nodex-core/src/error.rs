use thiserror::Error;

use crate::provider::ProviderId;

/// Everything that can go wrong while dispatching a conversation.
///
/// None of these are fatal; the shell turns each one into a chat message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No API key configured for {0}")]
    MissingCredential(ProviderId),

    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("Conversation is empty")]
    EmptyTranscript,

    #[error("{} API error: {}", .provider.display_name(), describe_status(.status, .status_text, .message.as_deref()))]
    ProviderRequest {
        provider: ProviderId,
        status: u16,
        status_text: String,
        message: Option<String>,
    },

    #[error("{} returned an unexpected response: {reason}", .provider.display_name())]
    MalformedResponse { provider: ProviderId, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl DispatchError {
    /// Short category used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::UnsupportedProvider(_) => "unsupported_provider",
            Self::EmptyTranscript => "empty_transcript",
            Self::ProviderRequest { .. } => "provider_request",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Network(_) => "network",
        }
    }
}

fn describe_status(status: &u16, status_text: &str, message: Option<&str>) -> String {
    let mut text = status.to_string();
    if !status_text.is_empty() {
        text.push(' ');
        text.push_str(status_text);
    }
    if let Some(message) = message {
        text.push_str(": ");
        text.push_str(message);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_request_message_includes_status() {
        let err = DispatchError::ProviderRequest {
            provider: ProviderId::OpenAI,
            status: 401,
            status_text: "Unauthorized".to_string(),
            message: Some("Incorrect API key provided".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "OpenAI API error: 401 Unauthorized: Incorrect API key provided"
        );
    }

    #[test]
    fn test_provider_request_without_body_message() {
        let err = DispatchError::ProviderRequest {
            provider: ProviderId::Anthropic,
            status: 529,
            status_text: String::new(),
            message: None,
        };
        assert_eq!(err.to_string(), "Anthropic API error: 529");
    }

    #[test]
    fn test_missing_credential_names_provider() {
        let err = DispatchError::MissingCredential(ProviderId::Groq);
        assert_eq!(err.to_string(), "No API key configured for Groq");
        assert_eq!(err.kind(), "missing_credential");
    }
}
