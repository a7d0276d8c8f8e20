//! Provider backends against a mock HTTP server

mod common;

use std::time::Duration;

use common::{chat_completion_body, gemini_body};
use email_summarizer::backend::retry::RetryPolicy;
use email_summarizer::backend::{GeminiBackend, ModelBackend, OpenAiBackend, OpenRouterBackend};
use email_summarizer::error::SummaryError;
use email_summarizer::models::{ModelConfig, ModelInfo};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUMMARY_JSON: &str = r#"{"summary": "Quarterly numbers are due Friday.", "keywords": ["finance", "deadline"]}"#;

fn fast_retry(policy: RetryPolicy) -> RetryPolicy {
    policy.with_waits(Duration::ZERO, Duration::ZERO)
}

fn openai(server: &MockServer) -> OpenAiBackend {
    OpenAiBackend::new("test-key".to_string(), "gpt-4o-mini".to_string())
        .with_base_url(server.uri())
        .with_retry_policy(fast_retry(RetryPolicy::standard()))
}

fn gemini(server: &MockServer) -> GeminiBackend {
    GeminiBackend::new("test-key".to_string(), "gemini-1.5-flash".to_string())
        .with_base_url(server.uri())
        .with_retry_policy(fast_retry(RetryPolicy::broad()))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

// ============================================================================
// OpenAI
// ============================================================================

#[tokio::test]
async fn test_openai_parses_structured_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_schema"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(SUMMARY_JSON)))
        .expect(1)
        .mount(&server)
        .await;

    let (summary, keywords) = openai(&server)
        .generate_summary("From: a@example.com\n\nNumbers due Friday", None)
        .await
        .unwrap();

    assert_eq!(summary, "Quarterly numbers are due Friday.");
    assert_eq!(keywords, vec!["finance", "deadline"]);
}

#[tokio::test]
async fn test_openai_unparseable_response_falls_back_to_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("  not json  ")))
        .mount(&server)
        .await;

    let (summary, keywords) = openai(&server).generate_summary("email", None).await.unwrap();

    assert_eq!(summary, "not json");
    assert!(keywords.is_empty());
}

#[tokio::test]
async fn test_openai_fenced_json_is_extracted() {
    let server = MockServer::start().await;
    let fenced = format!("Here you go:\n```json\n{}\n```", SUMMARY_JSON);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(&fenced)))
        .mount(&server)
        .await;

    let (summary, keywords) = openai(&server).generate_summary("email", None).await.unwrap();
    assert_eq!(summary, "Quarterly numbers are due Friday.");
    assert_eq!(keywords.len(), 2);
}

#[tokio::test]
async fn test_openai_retries_rate_limits_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(SUMMARY_JSON)))
        .mount(&server)
        .await;

    let (summary, _) = openai(&server).generate_summary("email", None).await.unwrap();

    assert_eq!(summary, "Quarterly numbers are due Friday.");
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_openai_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = openai(&server).generate_summary("email", None).await.unwrap_err();

    assert!(matches!(err, SummaryError::ServerError { status: 503, .. }));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_openai_does_not_retry_authentication_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = openai(&server).generate_summary("email", None).await.unwrap_err();

    assert!(matches!(err, SummaryError::Authentication(_)));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_openai_batch_preserves_input_order() {
    let server = MockServer::start().await;
    for name in ["alpha", "beta", "gamma"] {
        let body = format!(r#"{{"summary": "about {}", "keywords": ["{}"]}}"#, name, name);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(format!("Subject: {}", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_completion_body(&body))
                    .set_delay(Duration::from_millis(match name {
                        "alpha" => 60,
                        "beta" => 30,
                        _ => 0,
                    })),
            )
            .mount(&server)
            .await;
    }

    let contents: Vec<String> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|name| format!("From: x@example.com\nSubject: {}\n\nbody", name))
        .collect();

    let results = openai(&server)
        .with_max_concurrent(2)
        .batch_generate_summaries(&contents, None)
        .await
        .unwrap();

    let summaries: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(summaries, vec!["about alpha", "about beta", "about gamma"]);
}

#[tokio::test]
async fn test_openai_override_config_reaches_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 128})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(SUMMARY_JSON)))
        .expect(1)
        .mount(&server)
        .await;

    let overrides = ModelConfig {
        model: Some("gpt-4o".to_string()),
        temperature: None,
        max_tokens: Some(128),
    };
    openai(&server)
        .generate_summary("email", Some(&overrides))
        .await
        .unwrap();
}

// ============================================================================
// OpenRouter
// ============================================================================

#[tokio::test]
async fn test_openrouter_sends_fallback_models() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("X-Title", "email-summarizer"))
        .and(body_partial_json(json!({
            "model": "anthropic/claude-3.5-haiku",
            "models": ["anthropic/claude-3.5-haiku", "openai/gpt-4o-mini"],
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body(SUMMARY_JSON)))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenRouterBackend::new(
        "test-key".to_string(),
        vec![
            "anthropic/claude-3.5-haiku".to_string(),
            "openai/gpt-4o-mini".to_string(),
        ],
    )
    .unwrap()
    .with_base_url(server.uri())
    .with_retry_policy(fast_retry(RetryPolicy::standard()));

    let (summary, _) = backend.generate_summary("email", None).await.unwrap();
    assert_eq!(summary, "Quarterly numbers are due Friday.");
    assert_eq!(
        backend.model_info(),
        ModelInfo::new("openrouter", "anthropic/claude-3.5-haiku")
    );
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn test_gemini_generate_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(SUMMARY_JSON)))
        .expect(1)
        .mount(&server)
        .await;

    let (summary, keywords) = gemini(&server).generate_summary("email", None).await.unwrap();
    assert_eq!(summary, "Quarterly numbers are due Friday.");
    assert_eq!(keywords, vec!["finance", "deadline"]);
}

#[tokio::test]
async fn test_gemini_retries_any_error_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(SUMMARY_JSON)))
        .mount(&server)
        .await;

    let result = gemini(&server).generate_summary("email", None).await;

    assert!(result.is_ok());
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_gemini_stops_after_two_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let err = gemini(&server).generate_summary("email", None).await.unwrap_err();

    assert!(matches!(err, SummaryError::ApiError(_)));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_gemini_non_json_text_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("Just a plain sentence.")))
        .mount(&server)
        .await;

    let (summary, keywords) = gemini(&server).generate_summary("email", None).await.unwrap();
    assert_eq!(summary, "Just a plain sentence.");
    assert!(keywords.is_empty());
}
