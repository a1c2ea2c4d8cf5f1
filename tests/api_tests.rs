mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::{pipeline, ScriptedProvider, API_KEY, PRIMARY_MODEL};
use summarizer::create_app;
use summarizer::handlers::AppState;
use summarizer::health::HealthAggregator;
use summarizer::rate_limiter::{RateLimiter, StoreOutagePolicy};
use summarizer::store::MemoryStore;
use summarizer::SummarizeResponse;

const TEXT: &str = "Researchers found that regular walking improves sleep quality in older adults. \
    The study followed two thousand participants for three years.";

fn app_with(provider: Arc<ScriptedProvider>, store: Arc<MemoryStore>, limit: u64) -> Router {
    let orchestrator = pipeline(provider.clone(), store.clone()).with_rate_limiter(
        RateLimiter::new(store.clone(), limit, 3600, StoreOutagePolicy::FailOpen),
    );
    let health = HealthAggregator::new(provider, store, None, Duration::from_millis(500));

    create_app(AppState {
        orchestrator: Arc::new(orchestrator),
        health: Arc::new(health),
    })
}

fn app() -> Router {
    app_with(
        Arc::new(ScriptedProvider::succeeding()),
        Arc::new(MemoryStore::new()),
        100,
    )
}

fn summarize_request(key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/summarize")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_summarize_success() {
    let response = app()
        .oneshot(summarize_request(
            Some(API_KEY),
            serde_json::json!({"text": TEXT, "lang": "EN", "max_tokens": 50}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");

    let body = json_body(response).await;
    let parsed: SummarizeResponse = serde_json::from_value(body.clone()).unwrap();
    assert_eq!(parsed.model, PRIMARY_MODEL);
    assert!(!parsed.cached);
    assert_eq!(body["usage"]["total_tokens"], 25);
}

#[tokio::test]
async fn test_x_api_key_header_is_accepted() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/summarize")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(serde_json::json!({"text": TEXT}).to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_key_is_unauthorized() {
    let response = app()
        .oneshot(summarize_request(None, serde_json::json!({"text": TEXT})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["code"], 401);
    assert_eq!(body["correlation_id"], request_id.as_str());
}

#[tokio::test]
async fn test_validation_failures_are_bad_requests() {
    let cases = [
        serde_json::json!({"text": "short"}),
        serde_json::json!({"text": TEXT, "max_tokens": 1000}),
        serde_json::json!({"text": TEXT, "tone": "sarcastic"}),
        serde_json::json!({"text": "A".repeat(20)}),
        serde_json::json!({"lang": "en"}),
    ];

    for case in cases {
        let response = app()
            .oneshot(summarize_request(Some(API_KEY), case.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "case {}", case);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation_failed");
    }
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_failure() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/summarize")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .body(Body::from("{\"text\": "))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation_failed");
}

#[tokio::test]
async fn test_rate_limited_response() {
    let app = app_with(
        Arc::new(ScriptedProvider::succeeding()),
        Arc::new(MemoryStore::new()),
        1,
    );

    let first = app
        .clone()
        .oneshot(summarize_request(Some(API_KEY), serde_json::json!({"text": TEXT})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(summarize_request(Some(API_KEY), serde_json::json!({"text": TEXT})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let body = json_body(second).await;
    assert_eq!(body["error"], "rate_limited");
    let retry_after = body["retry_after"].as_u64().unwrap();
    assert!((1..=3600).contains(&retry_after));
}

#[tokio::test]
async fn test_healthz_reports_degraded_store() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let app = app_with(Arc::new(ScriptedProvider::succeeding()), store, 10);

    let response = app
        .oneshot(Request::builder().uri("/v1/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["dependencies"]["llm_provider"]["status"], "healthy");
    assert_eq!(body["dependencies"]["cache_store"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_healthz_is_unavailable_when_provider_is_down() {
    let app = app_with(
        Arc::new(ScriptedProvider::always_failing()),
        Arc::new(MemoryStore::new()),
        10,
    );

    let response = app
        .oneshot(Request::builder().uri("/v1/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert!(body["dependencies"]["llm_provider"]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_metrics_endpoint_counts_requests() {
    let app = app();

    app.clone()
        .oneshot(summarize_request(Some(API_KEY), serde_json::json!({"text": TEXT})))
        .await
        .unwrap();
    app.clone()
        .oneshot(summarize_request(Some("wrong-key-999"), serde_json::json!({"text": TEXT})))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_requests"], 2);
    assert_eq!(body["primary_generations"], 1);
    assert_eq!(body["unauthorized"], 1);
}
