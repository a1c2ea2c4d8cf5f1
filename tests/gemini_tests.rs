//! Wiremock tests for the Gemini client and the HTTP embedding backend.

use std::time::Duration;

use summarizer::evaluation::{EmbeddingProvider, EvaluationError, HttpEmbedder};
use summarizer::model::{Language, Tone};
use summarizer::provider::{GeminiProvider, GenerationProvider, GenerationRequest, ProviderError};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-1.5-flash";

fn request() -> GenerationRequest {
    GenerationRequest {
        text: "The harbour reopened after the storm. Ferries resumed their schedule.".to_string(),
        lang: Language::Fr,
        max_tokens: 60,
        tone: Tone::Concise,
    }
}

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new("test_key", MODEL, server.uri(), Duration::from_secs(2))
        .expect("client should build")
}

fn generate_path() -> String {
    format!("/v1beta/models/{}:generateContent", MODEL)
}

#[tokio::test]
async fn test_generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .and(header("x-goog-api-key", "test_key"))
        .and(body_string_contains("in fr"))
        .and(body_string_contains("under 60 tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "  Le port a rouvert.  "}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 31, "candidatesTokenCount": 6},
            "modelVersion": "gemini-1.5-flash-002"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generation = provider(&server).generate(&request()).await.expect("generate should succeed");

    assert_eq!(generation.summary, "Le port a rouvert.");
    assert_eq!(generation.model, "gemini-1.5-flash-002");
    assert_eq!(generation.usage.prompt_tokens, 31);
    assert_eq!(generation.usage.completion_tokens, 6);
    assert_eq!(generation.usage.total_tokens, 37);
}

#[tokio::test]
async fn test_generate_estimates_usage_when_missing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "abcdefgh"}]}}]
        })))
        .mount(&server)
        .await;

    let generation = provider(&server).generate(&request()).await.unwrap();

    assert_eq!(generation.model, MODEL);
    assert_eq!(generation.usage.completion_tokens, 2);
    assert!(generation.usage.prompt_tokens > 0);
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::Api {
            status: 503,
            message: "The model is overloaded.".to_string()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_hint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
}

#[tokio::test]
async fn test_invalid_key_is_not_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert_eq!(err, ProviderError::Unauthorized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_blocked_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert_eq!(err, ProviderError::Blocked("SAFETY".to_string()));
}

#[tokio::test]
async fn test_empty_candidate_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert_eq!(err, ProviderError::EmptyResponse);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client =
        GeminiProvider::new("test_key", MODEL, server.uri(), Duration::from_millis(100)).unwrap();
    let err = client.generate(&request()).await.unwrap_err();

    assert_eq!(err, ProviderError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v1beta/models/{}", MODEL)))
        .and(header("x-goog-api-key", "test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": format!("models/{}", MODEL)
        })))
        .mount(&server)
        .await;

    assert!(provider(&server).health_check().await.is_ok());
}

#[tokio::test]
async fn test_http_embedder_success() {
    let server = MockServer::start().await;
    let model = "sentence-transformers/all-MiniLM-L6-v2";

    Mock::given(method("POST"))
        .and(path(format!("/pipeline/feature-extraction/{}", model)))
        .and(header("Authorization", "Bearer hf_key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]])),
        )
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(server.uri(), model, "hf_key", Duration::from_secs(2)).unwrap();
    let vectors = embedder.embed(&["first", "second"]).await.unwrap();

    assert_eq!(vectors.len(), 2);
    assert!((vectors[1][0] - 0.4).abs() < 0.001);
}

#[tokio::test]
async fn test_http_embedder_rejects_wrong_vector_count() {
    let server = MockServer::start().await;
    let model = "sentence-transformers/all-MiniLM-L6-v2";

    Mock::given(method("POST"))
        .and(path(format!("/pipeline/feature-extraction/{}", model)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.1, 0.2]])))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(server.uri(), model, "", Duration::from_secs(2)).unwrap();
    let err = embedder.embed(&["first", "second"]).await.unwrap_err();

    assert!(matches!(err, EvaluationError::Embedding(_)));
}
