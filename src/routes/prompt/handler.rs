use axum::{Json, body::Bytes, extract::State};
use axum_extra::extract::cookie::CookieJar;

use super::model::{GenerateRequest, ImproveTextRequest, OutputResponse, TestPromptRequest};
use crate::{
    AppState,
    credentials::read_credentials,
    error::AppError,
    gateway::{GenerateParams, ProviderKeys, TestPromptParams},
    routes::parse_json,
    utils::{clamp_max_tokens, clamp_temperature},
};

const GENERATE_DEFAULT_MAX_TOKENS: u32 = 2000;
const TEST_DEFAULT_MAX_TOKENS: u32 = 512;
const TEST_MAX_CHARS: usize = 8000;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn provider_keys(state: &AppState, jar: &CookieJar) -> ProviderKeys {
    let stored = read_credentials(jar, &state.codec);
    ProviderKeys::resolve(&stored, &state.config)
}

#[axum::debug_handler]
pub async fn generate(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Json<OutputResponse>, AppError> {
    let req: GenerateRequest = parse_json(&body)?;
    let (Some(input), Some(model)) = (non_empty(req.input), non_empty(req.model)) else {
        return Err(AppError::BadRequest("input and model are required".into()));
    };

    let params = GenerateParams {
        input,
        model,
        temperature: clamp_temperature(req.temperature.as_ref()),
        max_tokens: clamp_max_tokens(req.max_tokens.as_ref(), GENERATE_DEFAULT_MAX_TOKENS),
        language: req.language.unwrap_or_default(),
    };
    tracing::info!(
        "Generating prompt: model={}, language={}, input_len={}",
        params.model,
        params.language,
        params.input.chars().count()
    );

    let keys = provider_keys(&state, &jar);
    let output = state.gateway.generate(&keys, params).await?;
    Ok(Json(OutputResponse { output }))
}

#[axum::debug_handler]
pub async fn improve_text(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Json<OutputResponse>, AppError> {
    let req: ImproveTextRequest = parse_json(&body)?;
    let (Some(text), Some(language)) = (non_empty(req.text), non_empty(req.language)) else {
        return Err(AppError::BadRequest("text and language are required".into()));
    };

    let keys = provider_keys(&state, &jar);
    let output = state.gateway.improve_text(&keys, &text, &language).await?;
    Ok(Json(OutputResponse { output }))
}

#[axum::debug_handler]
pub async fn test_prompt(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Json<OutputResponse>, AppError> {
    let req: TestPromptRequest = parse_json(&body)?;
    let (Some(prompt), Some(input), Some(model)) = (
        non_empty(req.prompt),
        non_empty(req.input),
        non_empty(req.model),
    ) else {
        return Err(AppError::BadRequest("prompt, input and model are required".into()));
    };

    if prompt.trim().is_empty() || input.trim().is_empty() {
        return Err(AppError::BadRequest("prompt and input must not be blank".into()));
    }
    if prompt.chars().count() > TEST_MAX_CHARS || input.chars().count() > TEST_MAX_CHARS {
        return Err(AppError::BadRequest(format!(
            "prompt or input is too long (>{TEST_MAX_CHARS} characters). Please shorten it."
        )));
    }

    let params = TestPromptParams {
        prompt,
        input,
        model,
        temperature: clamp_temperature(req.temperature.as_ref()),
        max_tokens: clamp_max_tokens(req.max_tokens.as_ref(), TEST_DEFAULT_MAX_TOKENS),
    };

    let keys = provider_keys(&state, &jar);
    let output = state.gateway.test_prompt(&keys, params).await?;
    Ok(Json(OutputResponse { output }))
}
