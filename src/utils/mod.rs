use std::net::IpAddr;

use axum::http::HeaderMap;
use serde_json::Value;

pub const UNKNOWN_CLIENT: &str = "unknown";

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const MAX_TEMPERATURE: f64 = 2.0;
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

/// 客户端标识：X-Forwarded-For 第一项 → X-Real-IP → 连接地址 → "unknown"
pub fn client_ip(headers: &HeaderMap, remote_ip: Option<IpAddr>) -> String {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    if let Some(forwarded) = header("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        return if first.is_empty() {
            UNKNOWN_CLIENT.to_string()
        } else {
            first.to_string()
        };
    }

    if let Some(real_ip) = header("x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    remote_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Accepts JSON numbers and numeric strings; anything else, or a non-finite
/// result, is treated as missing.
pub fn parse_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

pub fn clamp_temperature(value: Option<&Value>) -> f64 {
    parse_number(value)
        .map(|t| t.clamp(0.0, MAX_TEMPERATURE))
        .unwrap_or(DEFAULT_TEMPERATURE)
}

pub fn clamp_max_tokens(value: Option<&Value>, default: u32) -> u32 {
    parse_number(value)
        .map(|t| t.floor().clamp(1.0, MAX_OUTPUT_TOKENS as f64) as u32)
        .unwrap_or(default)
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
