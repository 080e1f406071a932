//! OpenAI-compatible chat completions. Groq exposes the same API, so both
//! providers go through here.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, outbound_messages, OutboundMessage, MAX_TOKENS};
use crate::error::DispatchError;
use crate::provider::ProviderConfig;
use crate::state::ChatMessage;

const TEMPERATURE: f32 = 0.7;

#[derive(Serialize)]
pub(crate) struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OutboundMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

pub(crate) fn build_request<'a>(model: &'a str, transcript: &'a [ChatMessage]) -> OpenAIRequest<'a> {
    OpenAIRequest {
        model,
        messages: outbound_messages(transcript),
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

pub(crate) fn extract_reply(
    config: &ProviderConfig,
    response: OpenAIResponse,
) -> Result<String, DispatchError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| DispatchError::MalformedResponse {
            provider: config.id,
            reason: "no message content in choices[0]".to_string(),
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
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await?;

    let response = check_status(config, response).await?;
    let body: OpenAIResponse = response.json().await.map_err(|e| DispatchError::MalformedResponse {
        provider: config.id,
        reason: e.to_string(),
    })?;
    extract_reply(config, body)
}
