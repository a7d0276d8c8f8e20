use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SummaryError;

/// Anything the summarizer can turn into a summary
///
/// Implementors expose an identifier, an owner and the fields rendered into
/// the provider prompt. A missing identifier is reported as `None`.
pub trait Summarizable: Send + Sync {
    fn item_id(&self) -> Option<&str>;
    fn owner_id(&self) -> Option<&str>;
    fn sender(&self) -> &str;
    fn recipients(&self) -> &[String];
    fn subject(&self) -> &str;
    fn body(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

/// An already-fetched email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub owner_id: String,
    #[serde(default, alias = "message_id", alias = "id")]
    pub item_id: String,
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl Summarizable for EmailMessage {
    fn item_id(&self) -> Option<&str> {
        non_blank(&self.item_id)
    }

    fn owner_id(&self) -> Option<&str> {
        non_blank(&self.owner_id)
    }

    fn sender(&self) -> &str {
        &self.sender
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Provider and model that produced a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
}

impl ModelInfo {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// A generated summary. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    owner_id: String,
    item_id: String,
    summary_text: String,
    keywords: Vec<String>,
    generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_info: Option<ModelInfo>,
}

impl Summary {
    /// Create a summary stamped with the current time
    pub fn new(
        owner_id: impl Into<String>,
        item_id: impl Into<String>,
        summary_text: impl Into<String>,
        keywords: Vec<String>,
        model_info: Option<ModelInfo>,
    ) -> Self {
        Self::with_timestamp(owner_id, item_id, summary_text, keywords, model_info, Utc::now())
    }

    pub fn with_timestamp(
        owner_id: impl Into<String>,
        item_id: impl Into<String>,
        summary_text: impl Into<String>,
        keywords: Vec<String>,
        model_info: Option<ModelInfo>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            item_id: item_id.into(),
            summary_text: summary_text.into(),
            keywords,
            generated_at,
            model_info,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn summary_text(&self) -> &str {
        &self.summary_text
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.model_info.as_ref()
    }

    /// Storage identity
    pub fn key(&self) -> SummaryKey {
        SummaryKey::new(&self.item_id, &self.owner_id)
    }
}

/// Unique storage key: `(item_id, owner_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryKey {
    pub item_id: String,
    pub owner_id: String,
}

impl SummaryKey {
    pub fn new(item_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.item_id)
    }
}

/// Per-call overrides for a generation request. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    /// Fields set in `overrides` win over fields set in `self`
    pub fn merged_with(&self, overrides: Option<&ModelConfig>) -> ModelConfig {
        match overrides {
            None => self.clone(),
            Some(o) => ModelConfig {
                model: o.model.clone().or_else(|| self.model.clone()),
                temperature: o.temperature.or(self.temperature),
                max_tokens: o.max_tokens.or(self.max_tokens),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.temperature.is_none() && self.max_tokens.is_none()
    }
}

/// One processing outcome (single item or whole batch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    /// Wall-clock seconds spent
    pub processing_time: f64,
    /// Whitespace-token estimate of the input
    pub token_count: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub batch_size: Option<usize>,
    /// 0 on success, 1 on failure
    pub error_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Policy selecting single-item vs. batched provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Single,
    Batch,
    #[default]
    Adaptive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Batch => "batch",
            Strategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Strategy::Single),
            "batch" => Ok(Strategy::Batch),
            "adaptive" => Ok(Strategy::Adaptive),
            other => Err(SummaryError::InvalidInput(format!(
                "Unknown strategy '{}'. Must be 'single', 'batch', or 'adaptive'",
                other
            ))),
        }
    }
}

/// Field to order listings by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    GeneratedAt,
    ItemId,
}

impl FromStr for SortField {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "generated_at" => Ok(SortField::GeneratedAt),
            "item_id" | "email_id" => Ok(SortField::ItemId),
            other => Err(SummaryError::InvalidInput(format!(
                "Unsupported sort field '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(SummaryError::InvalidInput(format!(
                "Sort order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}
