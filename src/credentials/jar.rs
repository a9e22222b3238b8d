use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;

use super::codec::{CredentialCodec, StoredCredentials};

pub const CREDENTIALS_COOKIE_NAME: &str = "pmpro_creds";

const COOKIE_MAX_AGE_DAYS: i64 = 30;

/// Where a provider key comes from for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Cookie,
    Env,
    None,
}

pub fn credential_source(stored: Option<&str>, env_key: Option<&str>) -> CredentialSource {
    if stored.is_some_and(|k| !k.is_empty()) {
        CredentialSource::Cookie
    } else if env_key.is_some_and(|k| !k.is_empty()) {
        CredentialSource::Env
    } else {
        CredentialSource::None
    }
}

pub fn read_credentials(jar: &CookieJar, codec: &CredentialCodec) -> StoredCredentials {
    match jar.get(CREDENTIALS_COOKIE_NAME) {
        Some(cookie) if !cookie.value().is_empty() => codec.decode(cookie.value()),
        _ => StoredCredentials::default(),
    }
}

/// Stores the credentials, or removes the cookie when nothing is left to store.
pub fn write_credentials(
    jar: CookieJar,
    codec: &CredentialCodec,
    creds: &StoredCredentials,
    secure: bool,
) -> CookieJar {
    match codec.encode(creds) {
        Some(token) => jar.add(
            Cookie::build((CREDENTIALS_COOKIE_NAME, token))
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(secure)
                .path("/")
                .max_age(cookie::time::Duration::days(COOKIE_MAX_AGE_DAYS)),
        ),
        None => jar.remove(Cookie::build(CREDENTIALS_COOKIE_NAME).path("/")),
    }
}
