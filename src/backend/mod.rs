//! LLM provider backends
//!
//! Every provider implements [`ModelBackend`]: single and batch summary
//! generation plus the model metadata attached to produced summaries.
//! Provider responses are normalized into `(summary, keywords)` here, so the
//! summarizer never sees provider-specific shapes.

mod chat;
pub mod gemini;
pub mod openai;
pub mod openrouter;
pub mod retry;

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use openrouter::OpenRouterBackend;
pub use retry::{with_retry, RetryOn, RetryPolicy};

use async_trait::async_trait;
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::{BackendConfig, Provider};
use crate::error::{Result, SummaryError};
use crate::models::{ModelConfig, ModelInfo};

/// Default bound on in-flight provider calls within one batch
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// A summary plus its keywords, as produced by a provider
pub type GeneratedSummary = (String, Vec<String>);

/// Uniform interface to one LLM provider
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a summary for one rendered email, applying the backend's
    /// retry policy. Unparseable responses fall back to `(raw_text, [])`.
    async fn generate_summary(
        &self,
        content: &str,
        config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary>;

    /// Generate summaries for many rendered emails. Output order matches
    /// input order; concurrent provider calls are bounded.
    async fn batch_generate_summaries(
        &self,
        contents: &[String],
        config: Option<&ModelConfig>,
    ) -> Result<Vec<GeneratedSummary>>;

    /// Provider name and configured default model id
    ///
    /// Per-call `ModelConfig.model` overrides are not reflected here.
    fn model_info(&self) -> ModelInfo;
}

#[async_trait]
impl<B: ModelBackend + ?Sized> ModelBackend for Arc<B> {
    async fn generate_summary(
        &self,
        content: &str,
        config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary> {
        self.as_ref().generate_summary(content, config).await
    }

    async fn batch_generate_summaries(
        &self,
        contents: &[String],
        config: Option<&ModelConfig>,
    ) -> Result<Vec<GeneratedSummary>> {
        self.as_ref().batch_generate_summaries(contents, config).await
    }

    fn model_info(&self) -> ModelInfo {
        self.as_ref().model_info()
    }
}

/// Run `generate` for every content with at most `limiter`'s permits in
/// flight. Results come back in input order.
pub async fn generate_bounded<'a, F, Fut>(
    limiter: &Semaphore,
    contents: &'a [String],
    generate: F,
) -> Result<Vec<GeneratedSummary>>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = Result<GeneratedSummary>>,
{
    let calls = contents.iter().map(|content| {
        let call = generate(content.as_str());
        async move {
            let _permit = limiter.acquire().await.map_err(|e| {
                SummaryError::ApiError(format!("Failed to acquire concurrency permit: {}", e))
            })?;
            call.await
        }
    });

    try_join_all(calls).await
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    keywords: Vec<String>,
}

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("fenced JSON pattern is valid")
});

/// Normalize a raw provider response into `(summary, keywords)`
///
/// Accepts a bare JSON object or one wrapped in a Markdown code fence. Any
/// other text becomes the summary with no keywords.
pub fn parse_summary_response(raw: &str) -> GeneratedSummary {
    let trimmed = raw.trim();

    if let Ok(payload) = serde_json::from_str::<SummaryPayload>(trimmed) {
        return (payload.summary, payload.keywords);
    }

    if let Some(inner) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(payload) = serde_json::from_str::<SummaryPayload>(inner.as_str()) {
            return (payload.summary, payload.keywords);
        }
    }

    debug!("Provider response is not summary JSON, using raw text");
    (trimmed.to_string(), Vec::new())
}

/// Build the backend selected in configuration
///
/// The API key is read from the environment variable named in the config.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn ModelBackend>> {
    let api_key_env = config.api_key_env();
    let api_key = std::env::var(api_key_env).map_err(|_| {
        SummaryError::ConfigError(format!("Environment variable {} is not set", api_key_env))
    })?;
    let prompt_version = config.prompt_version()?;
    let defaults = ModelConfig {
        model: None,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let backend: Arc<dyn ModelBackend> = match config.provider {
        Provider::OpenAi => {
            let mut backend = OpenAiBackend::new(api_key, config.model().to_string())
                .with_defaults(defaults)
                .with_prompt_version(prompt_version)
                .with_max_concurrent(config.max_concurrent);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url.clone());
            }
            Arc::new(backend)
        }
        Provider::OpenRouter => {
            let mut models = vec![config.model().to_string()];
            models.extend(config.fallback_models.iter().cloned());
            let mut backend = OpenRouterBackend::new(api_key, models)?
                .with_defaults(defaults)
                .with_prompt_version(prompt_version)
                .with_max_concurrent(config.max_concurrent);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url.clone());
            }
            Arc::new(backend)
        }
        Provider::Gemini => {
            let mut backend = GeminiBackend::new(api_key, config.model().to_string())
                .with_defaults(defaults)
                .with_prompt_version(prompt_version)
                .with_max_concurrent(config.max_concurrent);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url.clone());
            }
            Arc::new(backend)
        }
    };

    let info = backend.model_info();
    tracing::info!("Using {} backend with model {}", info.provider, info.model);
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_parse_plain_json() {
        let (summary, keywords) =
            parse_summary_response(r#"{"summary": "Invoice due Friday.", "keywords": ["invoice", "payment", "deadline"]}"#);
        assert_eq!(summary, "Invoice due Friday.");
        assert_eq!(keywords, vec!["invoice", "payment", "deadline"]);
    }

    #[test]
    fn test_parse_not_json_falls_back_to_raw_text() {
        let (summary, keywords) = parse_summary_response("not json");
        assert_eq!(summary, "not json");
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_parse_trims_fallback_text() {
        let (summary, keywords) = parse_summary_response("  Meeting moved to 3pm.\n");
        assert_eq!(summary, "Meeting moved to 3pm.");
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_parse_missing_keywords_falls_back() {
        let raw = r#"{"summary": "only a summary"}"#;
        let (summary, keywords) = parse_summary_response(raw);
        assert_eq!(summary, raw);
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"summary\": \"Flight confirmed.\", \"keywords\": [\"travel\", \"flight\"]}\n```";
        let (summary, keywords) = parse_summary_response(raw);
        assert_eq!(summary, "Flight confirmed.");
        assert_eq!(keywords, vec!["travel", "flight"]);
    }

    #[test]
    fn test_parse_preserves_keyword_order() {
        let (_, keywords) =
            parse_summary_response(r#"{"summary": "s", "keywords": ["zeta", "alpha", "mu"]}"#);
        assert_eq!(keywords, vec!["zeta", "alpha", "mu"]);
    }

    #[tokio::test]
    async fn test_generate_bounded_limits_in_flight_calls() {
        let limiter = Semaphore::new(2);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let contents: Vec<String> = (0..8).map(|i| format!("email {}", i)).collect();

        let results = generate_bounded(&limiter, &contents, |content| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok((content.to_uppercase(), vec![]))
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 8);
        assert_eq!(results[0].0, "EMAIL 0");
        assert_eq!(results[7].0, "EMAIL 7");
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn prop_generate_bounded_keeps_input_order(
            items in proptest::collection::vec(
                (proptest::prop_oneof![proptest::strategy::Just(String::new()), ".{0,60}"], 0u64..50),
                0..30,
            ),
            max_concurrent in 1usize..6,
        ) {
            let (contents, delays): (Vec<String>, Vec<u64>) = items.into_iter().unzip();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let limiter = Semaphore::new(max_concurrent);
            let next = AtomicUsize::new(0);
            let in_flight = AtomicUsize::new(0);
            let peak = AtomicUsize::new(0);

            let results = runtime
                .block_on(generate_bounded(&limiter, &contents, |content| {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let delay = Duration::from_millis(delays[index]);
                    let in_flight = &in_flight;
                    let peak = &peak;
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok((format!("{}:{}", index, content), vec![content.len().to_string()]))
                    }
                }))
                .unwrap();

            proptest::prop_assert_eq!(results.len(), contents.len());
            for (i, (summary, keywords)) in results.iter().enumerate() {
                proptest::prop_assert_eq!(summary, &format!("{}:{}", i, contents[i]));
                proptest::prop_assert_eq!(keywords, &vec![contents[i].len().to_string()]);
            }
            proptest::prop_assert!(peak.load(Ordering::SeqCst) <= max_concurrent);
        }
    }

    #[tokio::test]
    async fn test_generate_bounded_propagates_first_error() {
        let limiter = Semaphore::new(DEFAULT_MAX_CONCURRENT);
        let contents = vec!["ok".to_string(), "fail".to_string()];

        let result = generate_bounded(&limiter, &contents, |content| async move {
            if content == "fail" {
                Err(SummaryError::ApiError("boom".to_string()))
            } else {
                Ok((content.to_string(), vec![]))
            }
        })
        .await;

        assert!(matches!(result, Err(SummaryError::ApiError(_))));
    }
}
