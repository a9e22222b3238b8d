use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric fields stay raw JSON so that numeric strings are accepted too.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub input: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<Value>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<Value>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImproveTextRequest {
    pub text: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestPromptRequest {
    pub prompt: Option<String>,
    pub input: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<Value>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputResponse {
    pub output: String,
}
