use serde::Serialize;

use crate::credentials::CredentialSource;

#[derive(Debug, Serialize)]
pub struct CredentialSources {
    #[serde(rename = "openRouter")]
    pub open_router: CredentialSource,
    #[serde(rename = "googleGemini")]
    pub google_gemini: CredentialSource,
}

#[derive(Debug, Serialize)]
pub struct CredentialsStatusResponse {
    #[serde(rename = "hasOpenRouterKey")]
    pub has_open_router_key: bool,
    #[serde(rename = "hasGoogleGeminiKey")]
    pub has_google_gemini_key: bool,
    pub sources: CredentialSources,
}

#[derive(Debug, Serialize)]
pub struct SaveCredentialsResponse {
    pub ok: bool,
    #[serde(rename = "hasOpenRouterKey")]
    pub has_open_router_key: bool,
    #[serde(rename = "hasGoogleGeminiKey")]
    pub has_google_gemini_key: bool,
}

/// What a save request asks for one key.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyUpdate {
    Keep,
    Clear,
    Set(String),
}

impl KeyUpdate {
    pub fn apply(self, current: Option<String>) -> Option<String> {
        match self {
            KeyUpdate::Keep => current,
            KeyUpdate::Clear => None,
            KeyUpdate::Set(key) => Some(key),
        }
    }
}
