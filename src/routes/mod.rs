pub mod credentials;
pub mod prompt;

use serde::de::DeserializeOwned;

use crate::error::AppError;

pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        AppError::BadRequest("Invalid JSON request body".into())
    })
}
