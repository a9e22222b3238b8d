use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, Provider, UpstreamFailure};

const APP_TITLE: &str = "Prompt Master Pro";

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Sends a non-streaming chat completion and returns the first choice's
/// content, or an empty string when the upstream returned none.
pub async fn chat(
    client: &Client,
    base_url: &str,
    api_key: &str,
    referer: &str,
    req: ChatRequest<'_>,
) -> Result<String, GatewayError> {
    let url = format!("{}/api/v1/chat/completions", base_url.trim_end_matches('/'));
    let body = ChatCompletionRequest {
        model: req.model,
        messages: req.messages,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
        stream: false,
    };

    tracing::debug!("OpenRouter request: model={}", req.model);
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .header("HTTP-Referer", referer)
        .header("X-Title", APP_TITLE)
        .json(&body)
        .send()
        .await
        .map_err(|source| GatewayError::Transport {
            provider: Provider::OpenRouter,
            source,
        })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|source| GatewayError::Transport {
        provider: Provider::OpenRouter,
        source,
    })?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorResponse>(&bytes)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        return Err(UpstreamFailure {
            status: Some(status.as_u16()),
            message,
        }
        .into_error(Provider::OpenRouter, req.model));
    }

    let parsed: ChatCompletionResponse =
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Upstream {
            provider: Provider::OpenRouter,
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {e}"),
        })?;

    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default())
}
