use axum::{
    body::Body,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::error::AppError;

/// Rejects cross-site submissions to state-mutating endpoints.
pub async fn same_origin(req: Request<Body>, next: Next) -> Response {
    if !req.method().is_safe() && !is_same_origin(req.headers()) {
        tracing::warn!(
            "Rejected cross-origin {} {} from {:?}",
            req.method(),
            req.uri().path(),
            req.headers().get(header::ORIGIN)
        );
        return AppError::Forbidden.into_response();
    }
    next.run(req).await
}

/// Missing `Origin` or `Host` is allowed; an unparsable origin is not.
pub fn is_same_origin(headers: &HeaderMap) -> bool {
    let value_of = |name: header::HeaderName| headers.get(name).and_then(|h| h.to_str().ok());
    let (Some(origin), Some(host)) = (value_of(header::ORIGIN), value_of(header::HOST)) else {
        return true;
    };

    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    match (url.host_str(), url.port()) {
        (Some(h), Some(port)) => format!("{h}:{port}") == host,
        (Some(h), None) => h == host,
        (None, _) => false,
    }
}
