//! Chat-completion wire types shared by OpenAI-compatible providers

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SummaryError};
use crate::prompts::{PromptManager, PromptVersion};

/// HTTP-level timeout for a single provider request
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    /// Ordered fallback models, for providers that route across models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub response_format: Value,
}

impl ChatRequest {
    /// Render the system/user prompts and response format for `content`
    pub fn build(
        prompts: &dyn PromptManager,
        version: PromptVersion,
        model: String,
        content: &str,
    ) -> Result<Self> {
        Ok(Self {
            model,
            models: None,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompts.system_prompt(Some(version))?,
                },
                ChatMessage {
                    role: "user",
                    content: prompts.user_prompt(content, Some(version))?,
                },
            ],
            temperature: None,
            max_tokens: None,
            response_format: prompts.response_format(Some(version))?.to_chat_completion_value(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Minimal client for `POST {base_url}/chat/completions`
#[derive(Debug, Clone)]
pub(crate) struct ChatCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl ChatCompletionClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url,
            api_key,
            extra_headers: Vec::new(),
        }
    }

    pub fn set_base_url(&mut self, base_url: String) {
        self.base_url = base_url;
    }

    pub fn add_header(&mut self, name: &'static str, value: String) {
        self.extra_headers.push((name, value));
    }

    /// Send the request and return the first choice's message text
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request);
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::from_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = response.json().await?;
        debug!(
            "Chat completion returned {} choice(s) from model {:?}",
            parsed.choices.len(),
            parsed.model
        );

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SummaryError::ApiError("Provider returned no message content".to_string()))
    }
}
