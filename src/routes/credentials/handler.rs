use axum::{Json, body::Bytes, extract::State};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Map, Value};

use super::model::{
    CredentialSources, CredentialsStatusResponse, KeyUpdate, SaveCredentialsResponse,
};
use crate::{
    AppState,
    credentials::{StoredCredentials, credential_source, read_credentials, write_credentials},
    error::AppError,
};

const MIN_KEY_LEN: usize = 20;
const OPENROUTER_PREFIX: &str = "sk-or-v1-";
const GEMINI_PREFIX: &str = "AIza";

fn validate_key(key: &str, provider: &str, prefix: &str) -> Result<(), AppError> {
    if !key.starts_with(prefix) {
        return Err(AppError::BadRequest(format!(
            "Invalid {provider} API key format. The key must start with \"{prefix}\"."
        )));
    }
    if key.chars().count() < MIN_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "{provider} API key is too short. Please enter a valid key."
        )));
    }
    Ok(())
}

// 字段不存在则保留；空字符串或非字符串则清除
fn key_update(
    body: &Map<String, Value>,
    field: &str,
    provider: &str,
    prefix: &str,
) -> Result<KeyUpdate, AppError> {
    let Some(value) = body.get(field) else {
        return Ok(KeyUpdate::Keep);
    };
    let raw = value.as_str().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(KeyUpdate::Clear);
    }
    validate_key(raw, provider, prefix)?;
    Ok(KeyUpdate::Set(raw.to_string()))
}

fn has_key(stored: Option<&str>, env: Option<&str>) -> bool {
    stored.is_some_and(|k| !k.is_empty()) || env.is_some_and(|k| !k.is_empty())
}

#[axum::debug_handler]
pub async fn get_credentials(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Json<CredentialsStatusResponse> {
    let creds = read_credentials(&jar, &state.codec);
    let env_open_router = state.config.openrouter_api_key.as_deref();
    let env_gemini = state.config.google_gemini_api_key.as_deref();

    Json(CredentialsStatusResponse {
        has_open_router_key: has_key(creds.open_router_key.as_deref(), env_open_router),
        has_google_gemini_key: has_key(creds.google_gemini_key.as_deref(), env_gemini),
        sources: CredentialSources {
            open_router: credential_source(creds.open_router_key.as_deref(), env_open_router),
            google_gemini: credential_source(creds.google_gemini_key.as_deref(), env_gemini),
        },
    })
}

#[axum::debug_handler]
pub async fn save_credentials(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<SaveCredentialsResponse>), AppError> {
    // 无法解析的请求体按空对象处理
    let body = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let open_router = key_update(&body, "openRouterKey", "OpenRouter", OPENROUTER_PREFIX)?;
    let google_gemini = key_update(&body, "googleGeminiKey", "Google Gemini", GEMINI_PREFIX)?;

    let existing = read_credentials(&jar, &state.codec);
    let next = StoredCredentials {
        open_router_key: open_router.apply(existing.open_router_key),
        google_gemini_key: google_gemini.apply(existing.google_gemini_key),
    };

    let response = SaveCredentialsResponse {
        ok: true,
        has_open_router_key: has_key(
            next.open_router_key.as_deref(),
            state.config.openrouter_api_key.as_deref(),
        ),
        has_google_gemini_key: has_key(
            next.google_gemini_key.as_deref(),
            state.config.google_gemini_api_key.as_deref(),
        ),
    };
    tracing::info!(
        "Saving credentials: openrouter={}, gemini={}",
        next.open_router_key.is_some(),
        next.google_gemini_key.is_some()
    );

    let jar = write_credentials(jar, &state.codec, &next, state.config.secure_cookies);
    Ok((jar, Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn absent_field_keeps_existing_key() {
        let update = key_update(&body(json!({})), "openRouterKey", "OpenRouter", OPENROUTER_PREFIX);
        assert_eq!(update.unwrap(), KeyUpdate::Keep);
    }

    #[test]
    fn blank_or_non_string_field_clears_key() {
        for value in [json!({"googleGeminiKey": "  "}), json!({"googleGeminiKey": null})] {
            let update = key_update(&body(value), "googleGeminiKey", "Google Gemini", GEMINI_PREFIX);
            assert_eq!(update.unwrap(), KeyUpdate::Clear);
        }
    }

    #[test]
    fn keys_are_validated_and_trimmed() {
        let ok = key_update(
            &body(json!({"openRouterKey": " sk-or-v1-0123456789abcdef "})),
            "openRouterKey",
            "OpenRouter",
            OPENROUTER_PREFIX,
        );
        assert_eq!(ok.unwrap(), KeyUpdate::Set("sk-or-v1-0123456789abcdef".into()));

        let wrong_prefix = key_update(
            &body(json!({"openRouterKey": "sk-0123456789abcdefghij"})),
            "openRouterKey",
            "OpenRouter",
            OPENROUTER_PREFIX,
        );
        assert!(matches!(wrong_prefix, Err(AppError::BadRequest(_))));

        let too_short = key_update(
            &body(json!({"googleGeminiKey": "AIza123"})),
            "googleGeminiKey",
            "Google Gemini",
            GEMINI_PREFIX,
        );
        assert!(matches!(too_short, Err(AppError::BadRequest(m)) if m.contains("too short")));
    }
}
