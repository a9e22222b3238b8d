use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, utils::client_ip};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_at_ms: i64,
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct RateBucket {
    count: u32,
    reset_at_ms: i64,
}

/// In-process fixed-window counter, keyed by `<endpoint>:<client>`.
///
/// Every check is one read-modify-write under the map lock, so concurrent
/// callers on the same key can never both pass the last free slot.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, chrono::Utc::now().timestamp_millis())
    }

    pub fn check_at(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> RateDecision {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        match buckets.get_mut(key) {
            Some(bucket) if now_ms < bucket.reset_at_ms => {
                if bucket.count < limit {
                    bucket.count += 1;
                    RateDecision {
                        allowed: true,
                        remaining: limit - bucket.count,
                        reset_at_ms: bucket.reset_at_ms,
                        retry_after_secs: 0,
                    }
                } else {
                    let wait_ms = (bucket.reset_at_ms - now_ms) as u64;
                    RateDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at_ms: bucket.reset_at_ms,
                        retry_after_secs: wait_ms.div_ceil(1000).max(1),
                    }
                }
            }
            // 无记录或窗口已过期：整体替换为新窗口
            _ => {
                let reset_at_ms = now_ms.saturating_add(window_ms);
                buckets.insert(
                    key.to_string(),
                    RateBucket {
                        count: 1,
                        reset_at_ms,
                    },
                );
                RateDecision {
                    allowed: true,
                    remaining: limit.saturating_sub(1),
                    reset_at_ms,
                    retry_after_secs: 0,
                }
            }
        }
    }

    /// Drops every bucket whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn purge_expired_at(&self, now_ms: i64) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| now_ms < bucket.reset_at_ms);
        before - buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-endpoint limit applied by the [`rate_limit`] middleware.
#[derive(Clone)]
pub struct RateLimitPolicy {
    pub limiter: Arc<RateLimiter>,
    pub endpoint: &'static str,
    pub limit: u32,
    pub window: Duration,
}

pub async fn rate_limit(
    State(policy): State<RateLimitPolicy>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let ip = client_ip(req.headers(), remote_ip);

    let key = format!("{}:{}", policy.endpoint, ip);
    let decision = policy.limiter.check(&key, policy.limit, policy.window);

    if !decision.allowed {
        tracing::warn!(
            "Rate limit exceeded for {} (retry after {}s)",
            key,
            decision.retry_after_secs
        );
        return AppError::RateLimited {
            limit: policy.limit,
            decision,
        }
        .into_response();
    }

    next.run(req).await
}
