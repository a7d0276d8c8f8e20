//! OpenRouter backend with provider-side model fallback
//!
//! Instead of retrying one model, the ordered candidate list is sent as
//! `models` and OpenRouter walks it when a model is unavailable.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::chat::{ChatCompletionClient, ChatRequest};
use super::retry::{with_retry, RetryPolicy};
use super::{generate_bounded, parse_summary_response, GeneratedSummary, ModelBackend, DEFAULT_MAX_CONCURRENT};
use crate::error::{Result, SummaryError};
use crate::models::{ModelConfig, ModelInfo};
use crate::prompts::{PromptManager, PromptVersion, TemplatePromptManager};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterBackend {
    client: ChatCompletionClient,
    /// Candidate models, highest priority first. Never empty.
    models: Vec<String>,
    defaults: ModelConfig,
    prompts: Arc<dyn PromptManager>,
    prompt_version: PromptVersion,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl OpenRouterBackend {
    pub fn new(api_key: String, models: Vec<String>) -> Result<Self> {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(SummaryError::ConfigError(
                "OpenRouter backend needs at least one model".to_string(),
            ));
        }

        let mut client = ChatCompletionClient::new(api_key, OPENROUTER_BASE_URL.to_string());
        client.add_header("X-Title", "email-summarizer".to_string());

        Ok(Self {
            client,
            models,
            defaults: ModelConfig::default(),
            prompts: Arc::new(TemplatePromptManager::openrouter()),
            prompt_version: PromptVersion::Latest,
            retry: RetryPolicy::standard(),
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.client.set_base_url(base_url);
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

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Candidate list for one call. An overridden model goes first.
    fn candidates(&self, preferred: Option<String>) -> Vec<String> {
        match preferred {
            None => self.models.clone(),
            Some(model) => {
                let mut list = vec![model.clone()];
                list.extend(self.models.iter().filter(|m| **m != model).cloned());
                list
            }
        }
    }

    fn build_request(&self, content: &str, config: Option<&ModelConfig>) -> Result<ChatRequest> {
        let effective = self.defaults.merged_with(config);
        let models = self.candidates(effective.model);
        let mut request = ChatRequest::build(
            self.prompts.as_ref(),
            self.prompt_version,
            models[0].clone(),
            content,
        )?;
        request.models = Some(models);
        request.temperature = effective.temperature;
        request.max_tokens = effective.max_tokens;
        Ok(request)
    }
}

#[async_trait]
impl ModelBackend for OpenRouterBackend {
    async fn generate_summary(
        &self,
        content: &str,
        config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary> {
        let request = self.build_request(content, config)?;
        debug!("Requesting OpenRouter summary with models {:?}", request.models);

        let raw = with_retry("openrouter.generate_summary", &self.retry, || {
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
        debug!("Generating {} OpenRouter summaries", contents.len());
        generate_bounded(&self.limiter, contents, |content| {
            self.generate_summary(content, config)
        })
        .await
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("openrouter", &self.models[0])
    }
}
