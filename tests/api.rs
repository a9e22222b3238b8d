use std::collections::HashMap;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use pmpro::{AppState, config::Config, router::create_router};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

const GEMINI_KEY: &str = "AIzaSyTest-0123456789abcdef";
const OPENROUTER_KEY: &str = "sk-or-v1-test-0123456789abcdef";

fn app(server: &MockServer, overrides: &[(&str, &str)]) -> Router {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("GEMINI_BASE_URL".to_string(), server.uri()),
        ("OPENROUTER_BASE_URL".to_string(), server.uri()),
        ("PMPRO_CREDENTIALS_SECRET".to_string(), "test-secret".to_string()),
    ]);
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    let config = Config::from_lookup(|name| vars.get(name).cloned());
    create_router(AppState::new(config).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn gemini_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    }))
}

fn openrouter_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "gen-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    }))
}

#[tokio::test]
async fn generate_falls_back_to_next_gemini_model_on_quota() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "Quota exceeded for metric free_tier_requests",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", GEMINI_KEY))
        .respond_with(gemini_text("Role: senior analyst"))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY)]);
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "write a report", "model": "google/gemini-2.5-pro", "temperature": "0.4" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["output"], "Role: senior analyst");
}

#[tokio::test]
async fn generate_reports_quota_when_all_models_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Please retry in 7.2s", "status": "RESOURCE_EXHAUSTED" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY)]);
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "x", "model": "google/gemini-2.0-flash" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Retry in 8 seconds"));
}

#[tokio::test]
async fn generate_does_not_retry_other_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY)]);
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "x", "model": "google/gemini-2.5-pro" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("API key not valid"));
}

#[tokio::test]
async fn generate_skips_gemini_models_that_are_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "models/gemini-2.0-flash is not found for API version v1beta",
                "status": "NOT_FOUND"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(gemini_text("Role: travel planner"))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY)]);
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "plan a trip", "model": "google/gemini-2.0-flash" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["output"], "Role: travel planner");
}

#[tokio::test]
async fn large_upstream_error_page_still_yields_json_error() {
    let server = MockServer::start().await;
    let page = "<html><body>Bad gateway</body></html>".repeat(600);
    assert!(page.len() > 20_000);
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("OPENROUTER_API_KEY", OPENROUTER_KEY)]);
    let response = app
        .oneshot(post_json("/api/generate", json!({ "input": "x", "model": "openai/gpt-4o" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("OpenRouter API error: <html>"));
    assert!(error.len() < 2048);
}

#[tokio::test]
async fn generate_routes_other_models_through_openrouter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {OPENROUTER_KEY}").as_str()))
        .and(header("x-title", "Prompt Master Pro"))
        .respond_with(openrouter_text("Expert prompt"))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("OPENROUTER_API_KEY", OPENROUTER_KEY)]);
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "plan a trip", "model": "anthropic/claude-3.5-sonnet", "language": "en" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["output"], "Expert prompt");
}

#[tokio::test]
async fn generate_validates_input_and_keys() {
    let server = MockServer::start().await;
    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", "not-a-gemini-key-000000")]);

    let missing = app
        .clone()
        .oneshot(post_json("/api/generate", json!({ "model": "google/gemini-2.5-flash" })))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let bad_key = app
        .clone()
        .oneshot(post_json(
            "/api/generate",
            json!({ "input": "x", "model": "google/gemini-2.5-flash" }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_key.status(), StatusCode::BAD_REQUEST);

    let no_openrouter_key = app
        .oneshot(post_json("/api/generate", json!({ "input": "x", "model": "openai/gpt-4o" })))
        .await
        .unwrap();
    assert_eq!(no_openrouter_key.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(no_openrouter_key).await;
    assert!(body["error"].as_str().unwrap().contains("OpenRouter API key not found"));
}

#[tokio::test]
async fn rate_limit_rejects_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openrouter_text("ok"))
        .mount(&server)
        .await;

    let app = app(
        &server,
        &[("OPENROUTER_API_KEY", OPENROUTER_KEY), ("PMPRO_RATE_LIMIT_MAX", "2")],
    );
    let request = || {
        let mut req = post_json("/api/generate", json!({ "input": "x", "model": "openai/gpt-4o" }));
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        req
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers();
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert!(headers.contains_key("x-ratelimit-reset"));

    // 其他端点和其他客户端互不影响
    let improve = app
        .clone()
        .oneshot(post_json("/api/improve-text", json!({ "text": "hi", "language": "en" })))
        .await
        .unwrap();
    assert_eq!(improve.status(), StatusCode::OK);

    let mut other_client = post_json("/api/generate", json!({ "input": "x", "model": "openai/gpt-4o" }));
    other_client
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.1".parse().unwrap());
    assert_eq!(app.oneshot(other_client).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn cross_origin_posts_are_forbidden() {
    let server = MockServer::start().await;
    let app = app(&server, &[]);

    let mut req = post_json("/api/credentials", json!({ "openRouterKey": OPENROUTER_KEY }));
    req.headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    req.headers_mut().insert("host", "localhost:3000".parse().unwrap());

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "Forbidden");
}

#[tokio::test]
async fn saved_credentials_round_trip_through_cookie() {
    let server = MockServer::start().await;
    let app = app(&server, &[]);

    let mut req = post_json(
        "/api/credentials",
        json!({ "googleGeminiKey": format!("  {GEMINI_KEY}  ") }),
    );
    req.headers_mut()
        .insert("origin", "http://localhost:3000".parse().unwrap());
    req.headers_mut().insert("host", "localhost:3000".parse().unwrap());

    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("pmpro_creds=enc."));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains(GEMINI_KEY));

    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["hasGoogleGeminiKey"], true);
    assert_eq!(body["hasOpenRouterKey"], false);

    let cookie = set_cookie.split(';').next().unwrap().to_string();
    let status = app
        .oneshot(
            Request::builder()
                .uri("/api/credentials")
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(status).await;
    assert_eq!(body["hasGoogleGeminiKey"], true);
    assert_eq!(body["sources"]["googleGemini"], "cookie");
    assert_eq!(body["sources"]["openRouter"], "none");
}

#[tokio::test]
async fn invalid_credentials_are_rejected_and_blank_clears() {
    let server = MockServer::start().await;
    let app = app(&server, &[]);

    let invalid = app
        .clone()
        .oneshot(post_json("/api/credentials", json!({ "openRouterKey": "sk-wrong" })))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let mut clear = post_json("/api/credentials", json!({ "openRouterKey": "" }));
    clear
        .headers_mut()
        .insert("cookie", "pmpro_creds=plain.e30".parse().unwrap());
    let cleared = app.oneshot(clear).await.unwrap();
    assert_eq!(cleared.status(), StatusCode::OK);
    let set_cookie = cleared.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("pmpro_creds=;"));
}

#[tokio::test]
async fn tampered_cookie_reads_as_no_credentials() {
    let server = MockServer::start().await;
    let app = app(&server, &[]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/credentials")
                .header("cookie", "pmpro_creds=enc.AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["hasGoogleGeminiKey"], false);
    assert_eq!(body["sources"]["googleGemini"], "none");
}

#[tokio::test]
async fn improve_text_falls_back_to_openrouter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(openrouter_text("  Clean text.  "))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(
        &server,
        &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY), ("OPENROUTER_API_KEY", OPENROUTER_KEY)],
    );
    let response = app
        .oneshot(post_json("/api/improve-text", json!({ "text": "messy txt", "language": "ru" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["output"], "Clean text.");
}

#[tokio::test]
async fn test_prompt_checks_lengths_and_empty_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
        .respond_with(gemini_text("   "))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, &[("GOOGLE_GEMINI_API_KEY", GEMINI_KEY)]);

    let too_long = app
        .clone()
        .oneshot(post_json(
            "/api/test-prompt",
            json!({ "prompt": "p".repeat(8001), "input": "i", "model": "google/gemini-2.5-flash-lite" }),
        ))
        .await
        .unwrap();
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

    let blank = app
        .clone()
        .oneshot(post_json(
            "/api/test-prompt",
            json!({ "prompt": "  ", "input": "i", "model": "google/gemini-2.5-flash-lite" }),
        ))
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let empty_output = app
        .oneshot(post_json(
            "/api/test-prompt",
            json!({ "prompt": "Summarize", "input": "text", "model": "google/gemini-2.5-flash-lite" }),
        ))
        .await
        .unwrap();
    assert_eq!(empty_output.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        json_body(empty_output).await["error"]
            .as_str()
            .unwrap()
            .contains("empty response")
    );
}
