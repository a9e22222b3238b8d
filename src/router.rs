use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::{RateLimitPolicy, log_errors, rate_limit, same_origin},
    routes,
};

fn policy(state: &AppState, endpoint: &'static str) -> RateLimitPolicy {
    RateLimitPolicy {
        limiter: Arc::clone(&state.limiter),
        endpoint,
        limit: state.config.rate_limit_requests,
        window: state.config.rate_limit_window(),
    }
}

// 调用上游付费接口的路由，各自独立计数
fn prompt_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/generate",
            post(routes::prompt::generate)
                .layer(from_fn_with_state(policy(state, "generate"), rate_limit)),
        )
        .route(
            "/improve-text",
            post(routes::prompt::improve_text)
                .layer(from_fn_with_state(policy(state, "improve"), rate_limit)),
        )
        .route(
            "/test-prompt",
            post(routes::prompt::test_prompt)
                .layer(from_fn_with_state(policy(state, "test"), rate_limit)),
        )
}

fn credential_routes() -> Router<AppState> {
    Router::new().route(
        "/credentials",
        get(routes::credentials::get_credentials).post(routes::credentials::save_credentials),
    )
}

/// Builds the full application router, nested under the configured API base.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(prompt_routes(&state))
        .merge(credential_routes())
        .layer(from_fn(same_origin));

    // nest 不接受根路径
    let base = state.config.api_base_uri.trim_matches('/').to_string();
    let router = if base.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&format!("/{base}"), api)
    };

    router.layer(from_fn(log_errors)).with_state(state)
}
