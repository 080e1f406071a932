use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, outbound_messages, OutboundMessage, MAX_TOKENS};
use crate::error::DispatchError;
use crate::provider::ProviderConfig;
use crate::state::ChatMessage;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
pub(crate) struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OutboundMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContent>,
}

pub(crate) fn build_request<'a>(model: &'a str, transcript: &'a [ChatMessage]) -> ClaudeRequest<'a> {
    ClaudeRequest {
        model,
        max_tokens: MAX_TOKENS,
        messages: outbound_messages(transcript),
    }
}

pub(crate) fn extract_reply(
    config: &ProviderConfig,
    response: ClaudeResponse,
) -> Result<String, DispatchError> {
    response
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| DispatchError::MalformedResponse {
            provider: config.id,
            reason: "no text in content[0]".to_string(),
        })
}

pub(crate) async fn send(
    client: &Client,
    config: &ProviderConfig,
    transcript: &[ChatMessage],
    model: &str,
    api_key: &str,
) -> Result<String, DispatchError> {
    let request = build_request(model, transcript);

    let response = client
        .post(&config.endpoint_url)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&request)
        .send()
        .await?;

    let response = check_status(config, response).await?;
    let body: ClaudeResponse = response.json().await.map_err(|e| DispatchError::MalformedResponse {
        provider: config.id,
        reason: e.to_string(),
    })?;
    extract_reply(config, body)
}
