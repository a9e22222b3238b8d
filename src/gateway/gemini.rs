//! Google Gemini `generateContent` client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, Provider, UpstreamFailure};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Upstream model names to try, in order, for a `google/` model id.
pub fn fallback_models(model_id: &str) -> &'static [&'static str] {
    match model_id {
        "google/gemini-2.5-flash" => &["gemini-2.5-flash"],
        "google/gemini-2.5-flash-lite" => &["gemini-2.5-flash-lite"],
        "google/gemini-2.0-flash" => &["gemini-2.0-flash", "gemini-2.5-flash"],
        "google/gemini-2.5-pro" => &["gemini-2.5-pro", "gemini-2.5-flash"],
        "google/gemini-3-pro-preview" => &["gemini-3-pro-preview", "gemini-2.5-flash"],
        // 旧模型自动升级
        "google/gemini-1.5-flash" => &["gemini-2.5-flash"],
        "google/gemini-1.5-pro" => &["gemini-2.5-pro", "gemini-2.5-flash"],
        "google/gemini-2.0-flash-exp" => &["gemini-2.0-flash", "gemini-2.5-flash"],
        _ => &[DEFAULT_MODEL],
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiTextPart<'a>>,
}

#[derive(Serialize)]
struct GeminiTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

pub struct GenerationSettings {
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// Single `generateContent` call against one upstream model name.
///
/// Returns the concatenated text of the first candidate, which may be empty.
pub async fn generate_content(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model_name: &str,
    prompt: &str,
    settings: &GenerationSettings,
) -> Result<String, GatewayError> {
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model_name
    );
    let body = GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts: vec![GeminiTextPart { text: prompt }],
        }],
        generation_config: GeminiGenerationConfig {
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        },
    };

    tracing::debug!("Gemini request: model={}", model_name);
    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&body)
        .send()
        .await
        .map_err(|source| GatewayError::Transport {
            provider: Provider::Gemini,
            source,
        })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|source| GatewayError::Transport {
        provider: Provider::Gemini,
        source,
    })?;

    if !status.is_success() {
        // 保留状态码（如 RESOURCE_EXHAUSTED）以便分类
        let message = match serde_json::from_slice::<GeminiErrorResponse>(&bytes) {
            Ok(e) => match e.error.status {
                Some(code) => format!("[{}] {}", code, e.error.message),
                None => e.error.message,
            },
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        };
        return Err(UpstreamFailure {
            status: Some(status.as_u16()),
            message: format!("models/{model_name}: {message}"),
        }
        .into_error(Provider::Gemini, model_name));
    }

    let parsed: GeminiResponse = serde_json::from_slice(&bytes).map_err(|e| {
        GatewayError::Upstream {
            provider: Provider::Gemini,
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {e}"),
        }
    })?;

    let text = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}
