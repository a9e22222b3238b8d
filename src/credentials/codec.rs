//! 凭据令牌编解码
//!
//! 令牌格式为 `<mode>.<base64url-payload>`：
//! - `enc.`：`nonce(12) || tag(16) || ciphertext`，AES-256-GCM，密钥为服务端密钥的 SHA-256
//! - `plain.`：JSON 直接 base64url 编码，无机密性

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce, Tag,
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
};
use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

const ENC_PREFIX: &str = "enc";
const PLAIN_PREFIX: &str = "plain";

// 编码不带填充，解码兼容带填充和不带填充
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// User-supplied provider API keys, as held in the credentials cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "openRouterKey", skip_serializing_if = "Option::is_none")]
    pub open_router_key: Option<String>,
    #[serde(rename = "googleGeminiKey", skip_serializing_if = "Option::is_none")]
    pub google_gemini_key: Option<String>,
}

impl StoredCredentials {
    /// Trims both keys and drops the blank ones.
    pub fn normalized(&self) -> Self {
        let clean = |key: &Option<String>| {
            key.as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        };
        Self {
            open_router_key: clean(&self.open_router_key),
            google_gemini_key: clean(&self.google_gemini_key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open_router_key.is_none() && self.google_gemini_key.is_none()
    }

    // 非字符串字段单独丢弃，不影响另一个字段
    fn from_json(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(Self {
            open_router_key: field("openRouterKey"),
            google_gemini_key: field("googleGeminiKey"),
        })
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed token")]
    MalformedToken,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("encrypted payload too short ({0} bytes)")]
    TooShort(usize),

    #[error("no credentials secret configured for encrypted token")]
    MissingSecret,

    #[error("authentication failed")]
    Authentication,

    #[error("invalid credentials json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    Encrypted,
    Plain,
}

/// A parsed token, dispatched on its mode tag. Payloads stay base64url text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialToken {
    Plain(String),
    Encrypted(String),
}

impl CredentialToken {
    pub fn parse(raw: &str) -> Option<Self> {
        let (mode, payload) = raw.split_once('.')?;
        if payload.is_empty() {
            return None;
        }
        match mode {
            ENC_PREFIX => Some(Self::Encrypted(payload.to_string())),
            PLAIN_PREFIX => Some(Self::Plain(payload.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypted(payload) => write!(f, "{ENC_PREFIX}.{payload}"),
            Self::Plain(payload) => write!(f, "{PLAIN_PREFIX}.{payload}"),
        }
    }
}

#[derive(Clone)]
pub struct CredentialCodec {
    cipher: Option<Aes256Gcm>,
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("mode", &self.mode())
            .finish()
    }
}

impl CredentialCodec {
    /// A blank secret counts as no secret, which selects plain mode.
    pub fn new(secret: Option<&str>) -> Self {
        let cipher = secret
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                let digest = Sha256::digest(s.as_bytes());
                Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(digest.as_slice()))
            });
        Self { cipher }
    }

    pub fn mode(&self) -> CodecMode {
        if self.cipher.is_some() {
            CodecMode::Encrypted
        } else {
            CodecMode::Plain
        }
    }

    /// Returns `None` when nothing is left after normalization, meaning the
    /// stored value should be deleted.
    pub fn encode(&self, creds: &StoredCredentials) -> Option<String> {
        let normalized = creds.normalized();
        if normalized.is_empty() {
            return None;
        }
        // 仅含字符串字段的结构体序列化不会失败
        let json = serde_json::to_vec(&normalized).ok()?;

        let token = match &self.cipher {
            Some(cipher) => CredentialToken::Encrypted(seal(cipher, json)?),
            None => CredentialToken::Plain(BASE64_URL.encode(json)),
        };
        Some(token.to_string())
    }

    /// Never fails: any malformed, tampered or undecryptable token yields
    /// empty credentials.
    pub fn decode(&self, raw: &str) -> StoredCredentials {
        match self.try_decode(raw) {
            Ok(creds) => creds,
            Err(e) => {
                tracing::warn!("Discarding stored credentials: {}", e);
                StoredCredentials::default()
            }
        }
    }

    pub fn try_decode(&self, raw: &str) -> Result<StoredCredentials, CodecError> {
        match CredentialToken::parse(raw).ok_or(CodecError::MalformedToken)? {
            CredentialToken::Plain(payload) => {
                let json = BASE64_URL.decode(payload)?;
                StoredCredentials::from_json(&json)
            }
            CredentialToken::Encrypted(payload) => {
                let cipher = self.cipher.as_ref().ok_or(CodecError::MissingSecret)?;
                let json = open(cipher, &BASE64_URL.decode(payload)?)?;
                StoredCredentials::from_json(&json)
            }
        }
    }
}

fn seal(cipher: &Aes256Gcm, mut buffer: Vec<u8>) -> Option<String> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .ok()?;

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(tag.as_slice());
    out.extend_from_slice(&buffer);
    Some(BASE64_URL.encode(out))
}

fn open(cipher: &Aes256Gcm, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CodecError::TooShort(bytes.len()));
    }
    let (nonce, rest) = bytes.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CodecError::Authentication)?;
    Ok(buffer)
}
