//! AI dispatch gateway.
//!
//! Maps a provider-independent transcript onto each provider's wire format,
//! performs exactly one HTTP call, and hands back the reply text. The
//! provider table decides which format module handles a request.

pub mod anthropic;
pub mod openai;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::provider::{ProviderConfig, ProviderId, ProviderRegistry, WireFormat};
use crate::state::{ChatMessage, ChatRole};

/// Reply length cap sent with every request
pub(crate) const MAX_TOKENS: u32 = 1000;

#[derive(Serialize)]
pub(crate) struct OutboundMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Transcript as `{role, content}` pairs, without system messages
pub(crate) fn outbound_messages(transcript: &[ChatMessage]) -> Vec<OutboundMessage<'_>> {
    transcript
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| OutboundMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .collect()
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Both OpenAI and Anthropic wrap failures as `{"error": {"message": ...}}`
fn embedded_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
}

/// Non-2xx responses become `ProviderRequest`. `status_text` is the canonical
/// reason phrase for the status code, not the server's own wording.
pub(crate) async fn check_status(
    config: &ProviderConfig,
    response: Response,
) -> Result<Response, DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::ProviderRequest {
        provider: config.id,
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        message: embedded_error_message(&body),
    })
}

/// Stateless dispatcher; the caller owns the transcript and passes all of it
/// on every call.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    registry: ProviderRegistry,
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_registry(ProviderRegistry::builtin())
    }

    pub fn with_registry(registry: ProviderRegistry) -> Self {
        Self {
            client: Client::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Send `transcript` to the provider named by `provider` and return the reply.
    ///
    /// Unknown provider ids are rejected before any request is made.
    pub async fn send_conversation(
        &self,
        transcript: &[ChatMessage],
        provider: &str,
        model: &str,
        api_key: &str,
    ) -> Result<String, DispatchError> {
        let provider: ProviderId = provider.parse()?;
        self.send(transcript, provider, model, api_key).await
    }

    pub async fn send(
        &self,
        transcript: &[ChatMessage],
        provider: ProviderId,
        model: &str,
        api_key: &str,
    ) -> Result<String, DispatchError> {
        // System messages are never sent, so they don't count
        if outbound_messages(transcript).is_empty() {
            return Err(DispatchError::EmptyTranscript);
        }
        if api_key.trim().is_empty() {
            return Err(DispatchError::MissingCredential(provider));
        }

        let config = self.registry.get(provider);
        info!(
            provider = provider.as_str(),
            model,
            messages = transcript.len(),
            "Dispatching conversation"
        );

        let result = match config.wire_format {
            WireFormat::OpenAiCompatible => {
                openai::send(&self.client, config, transcript, model, api_key).await
            }
            WireFormat::Anthropic => {
                anthropic::send(&self.client, config, transcript, model, api_key).await
            }
        };

        match &result {
            Ok(reply) => debug!(provider = provider.as_str(), chars = reply.len(), "Reply received"),
            Err(e) => warn!(provider = provider.as_str(), kind = e.kind(), error = %e, "Dispatch failed"),
        }
        result
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
