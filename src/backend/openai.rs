//! OpenAI chat-completions backend

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::chat::{ChatCompletionClient, ChatRequest};
use super::retry::{with_retry, RetryPolicy};
use super::{generate_bounded, parse_summary_response, GeneratedSummary, ModelBackend, DEFAULT_MAX_CONCURRENT};
use crate::error::Result;
use crate::models::{ModelConfig, ModelInfo};
use crate::prompts::{PromptManager, PromptVersion, TemplatePromptManager};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI backend using strict JSON-schema structured output
///
/// Retries rate limits, timeouts and API errors up to 3 attempts.
pub struct OpenAiBackend {
    client: ChatCompletionClient,
    model: String,
    defaults: ModelConfig,
    prompts: Arc<dyn PromptManager>,
    prompt_version: PromptVersion,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: ChatCompletionClient::new(api_key, OPENAI_BASE_URL.to_string()),
            model,
            defaults: ModelConfig::default(),
            prompts: Arc::new(TemplatePromptManager::openai()),
            prompt_version: PromptVersion::Latest,
            retry: RetryPolicy::standard(),
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.client.set_base_url(base_url);
        self
    }

    /// Defaults applied under any per-call overrides
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

    fn build_request(&self, content: &str, config: Option<&ModelConfig>) -> Result<ChatRequest> {
        let effective = self.defaults.merged_with(config);
        let model = effective.model.unwrap_or_else(|| self.model.clone());
        let mut request =
            ChatRequest::build(self.prompts.as_ref(), self.prompt_version, model, content)?;
        request.temperature = effective.temperature;
        request.max_tokens = effective.max_tokens;
        Ok(request)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn generate_summary(
        &self,
        content: &str,
        config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary> {
        let request = self.build_request(content, config)?;
        debug!("Requesting OpenAI summary with model {}", request.model);

        let raw = with_retry("openai.generate_summary", &self.retry, || {
            self.client.complete(&request)
        })
        .await?;

        Ok(parse_summary_response(&raw))
    }

    async fn batch_generate_summaries(
        &self,
        contents: &[String],
        config: Option<&ModelConfig>,
    ) -> Result<Vec<GeneratedSummary>> {
        debug!("Generating {} OpenAI summaries", contents.len());
        generate_bounded(&self.limiter, contents, |content| {
            self.generate_summary(content, config)
        })
        .await
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("openai", &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_defaults_and_overrides() {
        let backend = OpenAiBackend::new("key".to_string(), DEFAULT_OPENAI_MODEL.to_string())
            .with_defaults(ModelConfig {
                model: None,
                temperature: Some(0.3),
                max_tokens: Some(200),
            });

        let request = backend.build_request("hello", None).unwrap();
        assert_eq!(request.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[1].content.contains("hello"));
        assert_eq!(request.response_format["type"], "json_schema");

        let overrides = ModelConfig {
            model: Some("gpt-4o".to_string()),
            temperature: None,
            max_tokens: Some(50),
        };
        let request = backend.build_request("hello", Some(&overrides)).unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(50));
    }

    #[test]
    fn test_model_info() {
        let backend = OpenAiBackend::new("key".to_string(), "gpt-4o".to_string());
        assert_eq!(backend.model_info(), ModelInfo::new("openai", "gpt-4o"));
    }
}
