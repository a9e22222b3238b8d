use axum::Json;
use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::middleware::RateDecision;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests. Please try again shortly.")]
    RateLimited { limit: u32, decision: RateDecision },

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(e) => e.status(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();

        if let AppError::RateLimited { limit, decision } = &self {
            let pairs = [
                (RETRY_AFTER, decision.retry_after_secs.to_string()),
                (HeaderName::from_static("x-ratelimit-limit"), limit.to_string()),
                (HeaderName::from_static("x-ratelimit-remaining"), "0".to_string()),
                (
                    HeaderName::from_static("x-ratelimit-reset"),
                    decision.reset_at_ms.div_euclid(1000).to_string(),
                ),
            ];
            for (name, value) in pairs {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    headers.insert(name, value);
                }
            }
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, headers, body).into_response()
    }
}
