//! Upstream LLM providers.
//!
//! Model ids under the `google/` namespace go straight to Gemini; everything
//! else goes through OpenRouter.

mod gemini;
mod openrouter;
pub mod prompts;

use std::fmt;

use axum::http::StatusCode;
use reqwest::Client;
use thiserror::Error;

use crate::config::Config;
use crate::credentials::StoredCredentials;
use crate::utils::truncate_utf8;

pub use gemini::fallback_models;
use gemini::GenerationSettings;
use openrouter::{ChatRequest, Message};

const GEMINI_KEY_PREFIX: &str = "AIza";
const GEMINI_NAMESPACE: &str = "google/";

const IMPROVE_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite"];
const IMPROVE_OPENROUTER_MODEL: &str = "google/gemini-2.5-flash";
const IMPROVE_TEMPERATURE: f64 = 0.3;
const IMPROVE_MAX_TOKENS: u32 = 1024;

// 上游错误页可能很大，只保留前 1 KiB
const MAX_UPSTREAM_MESSAGE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenRouter,
}

impl Provider {
    pub fn for_model(model_id: &str) -> Self {
        if model_id.starts_with(GEMINI_NAMESPACE) {
            Provider::Gemini
        } else {
            Provider::OpenRouter
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("Google Gemini"),
            Provider::OpenRouter => f.write_str("OpenRouter"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} API key not found. Please add your key on the Settings page.")]
    MissingKey(Provider),

    #[error("Invalid {provider} API key format. The key must start with \"{prefix}\".")]
    InvalidKeyFormat {
        provider: Provider,
        prefix: &'static str,
    },

    #[error("{provider} quota exhausted. {retry_hint}")]
    Quota {
        provider: Provider,
        retry_hint: String,
        message: String,
    },

    #[error(
        "{provider} model \"{model}\" was not found or is not supported. Check that your API key is active or choose another model."
    )]
    NotFound {
        provider: Provider,
        model: String,
        message: String,
    },

    #[error("{provider} API error: {message}")]
    Upstream {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    #[error("The model returned an empty response. Please try again.")]
    EmptyResponse,

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
}

impl GatewayError {
    /// Quota and not-found failures move on to the next fallback model.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Quota { .. } | GatewayError::NotFound { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidKeyFormat { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Quota { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A non-success upstream reply before classification.
pub(crate) struct UpstreamFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamFailure {
    fn is_quota(&self) -> bool {
        self.status == Some(429)
            || ["quota", "Quota exceeded", "free_tier", "RESOURCE_EXHAUSTED"]
                .iter()
                .any(|p| self.message.contains(p))
    }

    fn is_not_found(&self) -> bool {
        self.status == Some(404)
            || ["not found", "NOT_FOUND", "404"]
                .iter()
                .any(|p| self.message.contains(p))
    }

    pub(crate) fn into_error(mut self, provider: Provider, model: &str) -> GatewayError {
        let kept = truncate_utf8(&self.message, MAX_UPSTREAM_MESSAGE).len();
        self.message.truncate(kept);

        if self.is_quota() {
            GatewayError::Quota {
                provider,
                retry_hint: retry_hint(provider, &self.message),
                message: self.message,
            }
        } else if self.is_not_found() {
            GatewayError::NotFound {
                provider,
                model: model.to_string(),
                message: self.message,
            }
        } else {
            GatewayError::Upstream {
                provider,
                status: self.status,
                message: self.message,
            }
        }
    }
}

// 从 "retry in 12.3s" 中提取等待秒数
fn retry_hint(provider: Provider, message: &str) -> String {
    let seconds = message.find("retry in ").and_then(|start| {
        let rest = &message[start + "retry in ".len()..];
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let follows_s = rest[number.len()..].starts_with('s');
        number
            .parse::<f64>()
            .ok()
            .filter(|_| follows_s)
            .map(|s| s.ceil() as u64)
    });

    let wait = match seconds {
        Some(s) => format!("Retry in {s} seconds"),
        None => "Retry in a few seconds".to_string(),
    };
    match provider {
        Provider::Gemini => format!(
            "{wait}, switch to a free-tier model, or enable billing at https://ai.google.dev/pricing."
        ),
        Provider::OpenRouter => {
            format!("{wait} or check your credits at https://openrouter.ai/settings/credits.")
        }
    }
}

/// Provider keys for one request: the cookie value wins, the server
/// environment is the fallback.
#[derive(Clone, Default)]
pub struct ProviderKeys {
    pub open_router: Option<String>,
    pub google_gemini: Option<String>,
}

impl ProviderKeys {
    pub fn resolve(stored: &StoredCredentials, config: &Config) -> Self {
        let pick = |cookie: &Option<String>, env: &Option<String>| {
            cookie
                .iter()
                .chain(env.iter())
                .map(|k| k.trim())
                .find(|k| !k.is_empty())
                .map(str::to_string)
        };
        Self {
            open_router: pick(&stored.open_router_key, &config.openrouter_api_key),
            google_gemini: pick(&stored.google_gemini_key, &config.google_gemini_api_key),
        }
    }

    fn gemini(&self) -> Result<&str, GatewayError> {
        self.google_gemini
            .as_deref()
            .ok_or(GatewayError::MissingKey(Provider::Gemini))
    }

    fn open_router(&self) -> Result<&str, GatewayError> {
        self.open_router
            .as_deref()
            .ok_or(GatewayError::MissingKey(Provider::OpenRouter))
    }
}

pub struct GenerateParams {
    pub input: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub language: String,
}

pub struct TestPromptParams {
    pub prompt: String,
    pub input: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct ProviderGateway {
    client: Client,
    gemini_base_url: String,
    openrouter_base_url: String,
    app_url: String,
}

impl ProviderGateway {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.upstream_timeout()).build()?;
        Ok(Self {
            client,
            gemini_base_url: config.gemini_base_url.clone(),
            openrouter_base_url: config.openrouter_base_url.clone(),
            app_url: config.app_url.clone(),
        })
    }

    /// Turns a rough task description into an expert prompt.
    pub async fn generate(
        &self,
        keys: &ProviderKeys,
        params: GenerateParams,
    ) -> Result<String, GatewayError> {
        match Provider::for_model(&params.model) {
            Provider::Gemini => {
                let key = keys.gemini()?;
                if !key.starts_with(GEMINI_KEY_PREFIX) {
                    return Err(GatewayError::InvalidKeyFormat {
                        provider: Provider::Gemini,
                        prefix: GEMINI_KEY_PREFIX,
                    });
                }
                let prompt = prompts::generate_prompt(&params.language, &params.input);
                let settings = GenerationSettings {
                    temperature: params.temperature.clamp(0.0, 2.0),
                    max_output_tokens: params.max_tokens.clamp(1, 8192),
                };
                self.gemini_with_fallback(key, fallback_models(&params.model), &prompt, &settings)
                    .await
            }
            Provider::OpenRouter => {
                let key = keys.open_router()?;
                let messages = [
                    Message::system(prompts::prompt_system(&params.language)),
                    Message::user(params.input),
                ];
                self.openrouter_chat(
                    key,
                    ChatRequest {
                        model: &params.model,
                        messages: &messages,
                        temperature: params.temperature,
                        max_tokens: params.max_tokens,
                    },
                )
                .await
            }
        }
    }

    /// Cleans up messy text. Gemini is tried first when a usable key is
    /// present; any Gemini failure falls back to OpenRouter.
    pub async fn improve_text(
        &self,
        keys: &ProviderKeys,
        text: &str,
        language: &str,
    ) -> Result<String, GatewayError> {
        let language_name = prompts::language_name(language);
        let prompt = prompts::improve_prompt(text, language_name);

        if let Some(key) = keys
            .google_gemini
            .as_deref()
            .filter(|k| k.starts_with(GEMINI_KEY_PREFIX))
        {
            let settings = GenerationSettings {
                temperature: IMPROVE_TEMPERATURE,
                max_output_tokens: IMPROVE_MAX_TOKENS,
            };
            match self
                .gemini_with_fallback(key, IMPROVE_MODELS, &prompt, &settings)
                .await
            {
                Ok(output) => return Ok(output.trim().to_string()),
                Err(e) => tracing::warn!("Gemini improve failed, trying OpenRouter: {}", e),
            }
        }

        let key = keys.open_router()?;
        let messages = [Message::system(prompt), Message::user("Improve the text.")];
        let output = self
            .openrouter_chat(
                key,
                ChatRequest {
                    model: IMPROVE_OPENROUTER_MODEL,
                    messages: &messages,
                    temperature: IMPROVE_TEMPERATURE,
                    max_tokens: IMPROVE_MAX_TOKENS,
                },
            )
            .await?;
        Ok(output.trim().to_string())
    }

    /// Runs a user-authored prompt against a sample input, without fallbacks.
    pub async fn test_prompt(
        &self,
        keys: &ProviderKeys,
        params: TestPromptParams,
    ) -> Result<String, GatewayError> {
        let output = match Provider::for_model(&params.model) {
            Provider::Gemini => {
                let key = keys.gemini()?;
                let model_name = params
                    .model
                    .strip_prefix(GEMINI_NAMESPACE)
                    .unwrap_or(params.model.as_str());
                let settings = GenerationSettings {
                    temperature: params.temperature,
                    max_output_tokens: params.max_tokens,
                };
                gemini::generate_content(
                    &self.client,
                    &self.gemini_base_url,
                    key,
                    model_name,
                    &prompts::test_prompt(&params.prompt, &params.input),
                    &settings,
                )
                .await?
            }
            Provider::OpenRouter => {
                let key = keys.open_router()?;
                let messages = [Message::system(params.prompt), Message::user(params.input)];
                self.openrouter_chat(
                    key,
                    ChatRequest {
                        model: &params.model,
                        messages: &messages,
                        temperature: params.temperature,
                        max_tokens: params.max_tokens,
                    },
                )
                .await?
            }
        };

        if output.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(output)
    }

    async fn gemini_with_fallback(
        &self,
        key: &str,
        models: &[&str],
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<String, GatewayError> {
        let mut last_error = None;

        for model_name in models {
            tracing::info!("Attempting Gemini model: {}", model_name);
            match gemini::generate_content(
                &self.client,
                &self.gemini_base_url,
                key,
                model_name,
                prompt,
                settings,
            )
            .await
            {
                Ok(text) if text.trim().is_empty() => return Err(GatewayError::EmptyResponse),
                Ok(text) => {
                    tracing::info!("Gemini model {} succeeded", model_name);
                    return Ok(text);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Gemini model {} unavailable: {}", model_name, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::Upstream {
            provider: Provider::Gemini,
            status: None,
            message: "all models failed".to_string(),
        }))
    }

    async fn openrouter_chat(&self, key: &str, req: ChatRequest<'_>) -> Result<String, GatewayError> {
        openrouter::chat(&self.client, &self.openrouter_base_url, key, &self.app_url, req).await
    }
}
