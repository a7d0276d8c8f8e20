//! Google Gemini backend using the native `generateContent` API
//!
//! Gemini's structured output is less reliable than OpenAI's, so this backend
//! pairs a JSON-only prompt with `responseMimeType: application/json` and a
//! broad retry (any failure, 2 attempts total).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::chat::REQUEST_TIMEOUT;
use super::retry::{with_retry, RetryPolicy};
use super::{generate_bounded, parse_summary_response, GeneratedSummary, ModelBackend, DEFAULT_MAX_CONCURRENT};
use crate::error::{Result, SummaryError};
use crate::models::{ModelConfig, ModelInfo};
use crate::prompts::{PromptManager, PromptVersion, TemplatePromptManager};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Gemini's schema dialect rejects `additionalProperties`
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "additionalProperties")
                .map(|(key, value)| (key.clone(), gemini_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

pub struct GeminiBackend {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    defaults: ModelConfig,
    prompts: Arc<dyn PromptManager>,
    prompt_version: PromptVersion,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            defaults: ModelConfig::default(),
            prompts: Arc::new(TemplatePromptManager::gemini()),
            prompt_version: PromptVersion::Latest,
            retry: RetryPolicy::broad(),
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_defaults(mut self, defaults: ModelConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_prompt_manager(mut self, prompts: Arc<dyn PromptManager>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_prompt_version(mut self, version: PromptVersion) -> Self {
        self.prompt_version = version;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    fn build_request(&self, content: &str, effective: &ModelConfig) -> Result<GeminiRequest> {
        let version = Some(self.prompt_version);
        let format = self.prompts.response_format(version)?;

        Ok(GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: self.prompts.user_prompt(content, version)?,
                }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: self.prompts.system_prompt(version)?,
                }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: effective.temperature,
                max_output_tokens: effective.max_tokens,
                response_mime_type: "application/json",
                response_schema: format.schema().map(gemini_schema),
            },
        })
    }

    async fn call(&self, model: &str, request: &GeminiRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::from_status(status.as_u16(), &body));
        }

        let parsed: GeminiResponse = response.json().await?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| SummaryError::ApiError("Gemini returned no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(SummaryError::ApiError(format!(
                "Gemini returned empty content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate_summary(
        &self,
        content: &str,
        config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary> {
        let effective = self.defaults.merged_with(config);
        let model = effective.model.clone().unwrap_or_else(|| self.model.clone());
        let request = self.build_request(content, &effective)?;
        debug!("Requesting Gemini summary with model {}", model);

        let raw = with_retry("gemini.generate_summary", &self.retry, || {
            self.call(&model, &request)
        })
        .await?;

        Ok(parse_summary_response(&raw))
    }

    async fn batch_generate_summaries(
        &self,
        contents: &[String],
        config: Option<&ModelConfig>,
    ) -> Result<Vec<GeneratedSummary>> {
        debug!("Generating {} Gemini summaries", contents.len());
        generate_bounded(&self.limiter, contents, |content| {
            self.generate_summary(content, config)
        })
        .await
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("gemini", &self.model)
    }
}
