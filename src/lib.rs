//! Email Summarizer
//!
//! Generates concise summaries and keywords for emails using a language
//! model, and stores them keyed by `(item_id, owner_id)`.
//!
//! # Overview
//!
//! - **Model backends**: OpenAI, OpenRouter (with model fallback) and Gemini,
//!   behind one [`backend::ModelBackend`] trait with retry and bounded
//!   concurrency
//! - **Prompts**: versioned system/user templates and response formats
//! - **Adaptive summarization**: single, batch, or threshold-driven
//!   dispatch with per-call timeouts and metrics
//! - **Storage**: owner-scoped summary persistence with get-or-create
//!
//! # Example Usage
//!
//! ```no_run
//! use email_summarizer::{build_backend, AdaptiveSummarizer, Config, EmailMessage, Strategy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let backend = build_backend(&config.backend)?;
//!     let summarizer: AdaptiveSummarizer<EmailMessage> =
//!         AdaptiveSummarizer::new(backend, (&config.summarizer).into());
//!
//!     let emails: Vec<EmailMessage> = Vec::new();
//!     if !emails.is_empty() {
//!         let summaries = summarizer.summarize(&emails, Strategy::Adaptive, None).await?;
//!         println!("{} summaries", summaries.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`backend`] - Provider clients, retry policy, response parsing
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`metrics`] - Processing metrics ledger
//! - [`models`] - Core data structures
//! - [`prompts`] - Prompt templates and response formats
//! - [`store`] - Summary persistence
//! - [`summarizer`] - Strategy dispatch and summary construction

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod prompts;
pub mod store;
pub mod summarizer;

pub use error::{Result, SummaryError};

pub use models::{
    EmailMessage, ModelConfig, ModelInfo, SortField, SortOrder, Strategy, Summarizable, Summary,
    SummaryKey, SummaryMetrics,
};

pub use backend::{build_backend, GeneratedSummary, ModelBackend};
pub use backend::{GeminiBackend, OpenAiBackend, OpenRouterBackend};
pub use backend::retry::RetryPolicy;

pub use prompts::{PromptManager, PromptVersion, ResponseFormat, TemplatePromptManager};

pub use config::{BackendConfig, Config, Provider, StoreConfig, SummarizerConfig};

pub use metrics::{MetricsLedger, MetricsStats};

pub use store::{
    BatchSaveResult, DocumentStore, InMemoryDocumentStore, ItemSource, JsonItemSource,
    SummaryQuery, SummaryStore,
};

pub use summarizer::{AdaptiveSummarizer, ContentPreparer, EmailContentPreparer, SummarizerSettings};
