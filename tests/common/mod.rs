//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use email_summarizer::backend::{GeneratedSummary, ModelBackend};
use email_summarizer::error::{Result, SummaryError};
use email_summarizer::models::{EmailMessage, ModelConfig, ModelInfo};
use email_summarizer::store::ItemSource;
use mockall::mock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Create a test email with default values
pub fn create_test_email(owner_id: &str, item_id: &str, subject: &str) -> EmailMessage {
    EmailMessage {
        owner_id: owner_id.to_string(),
        item_id: item_id.to_string(),
        sender: "alice@example.com".to_string(),
        recipients: vec!["bob@example.com".to_string()],
        subject: subject.to_string(),
        body: format!("Body of {}: please review the attached numbers.", subject),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
    }
}

/// `count` emails for one owner, ids `msg-0..msg-{count-1}`
pub fn create_test_emails(owner_id: &str, count: usize) -> Vec<EmailMessage> {
    (0..count)
        .map(|i| {
            let mut email = create_test_email(owner_id, &format!("msg-{}", i), &format!("Subject {}", i));
            email.created_at = email.created_at + ChronoDuration::minutes(i as i64);
            email
        })
        .collect()
}

/// Email with a blank identifier
pub fn create_email_without_id(owner_id: &str) -> EmailMessage {
    create_test_email(owner_id, "", "No id")
}

/// Chat completion response body carrying `content`
pub fn chat_completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1714550400,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

/// Gemini generateContent response body carrying `text`
pub fn gemini_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

/// Backend that summarizes by echoing the first content line and counts calls
///
/// Failures and delays can be scripted per call, in call order across both
/// single and batch entry points.
#[derive(Default)]
pub struct CountingBackend {
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    script: Mutex<VecDeque<Step>>,
}

#[derive(Debug)]
pub enum Step {
    Ok,
    Fail(SummaryError),
    Delay(Duration),
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    async fn next_step(&self) -> Result<()> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            None | Some(Step::Ok) => Ok(()),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn summarize(content: &str) -> GeneratedSummary {
        let subject = content
            .lines()
            .find_map(|line| line.strip_prefix("Subject: "))
            .unwrap_or(content)
            .to_string();
        (format!("Summary: {}", subject), vec!["test".to_string()])
    }
}

#[async_trait]
impl ModelBackend for CountingBackend {
    async fn generate_summary(
        &self,
        content: &str,
        _config: Option<&ModelConfig>,
    ) -> Result<GeneratedSummary> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.next_step().await?;
        Ok(Self::summarize(content))
    }

    async fn batch_generate_summaries(
        &self,
        contents: &[String],
        _config: Option<&ModelConfig>,
    ) -> Result<Vec<GeneratedSummary>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(contents.len());
        self.next_step().await?;
        Ok(contents.iter().map(|c| Self::summarize(c)).collect())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("test", "counting-1")
    }
}

mock! {
    pub EmailSource {}

    #[async_trait::async_trait]
    impl ItemSource<EmailMessage> for EmailSource {
        async fn get_item(&self, item_id: &str, owner_id: &str) -> Result<Option<EmailMessage>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_emails() {
        let emails = create_test_emails("u1", 3);
        assert_eq!(emails.len(), 3);
        assert_eq!(emails[2].item_id, "msg-2");
        assert!(emails.iter().all(|e| e.owner_id == "u1"));
    }

    #[tokio::test]
    async fn test_counting_backend_script() {
        let backend = CountingBackend::with_script(vec![Step::Fail(SummaryError::ApiError(
            "boom".to_string(),
        ))]);
        assert!(backend.generate_summary("Subject: a", None).await.is_err());
        let (text, _) = backend.generate_summary("Subject: a", None).await.unwrap();
        assert_eq!(text, "Summary: a");
        assert_eq!(backend.single_calls(), 2);
    }
}
