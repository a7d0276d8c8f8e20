//! Adaptive summarization: strategy selection, timeouts and metrics
//!
//! The summarizer composes a [`ModelBackend`] with a [`ContentPreparer`].
//! Below the batch threshold items are summarized one provider call per
//! email, each under its own timeout; at or above it, one batched backend
//! call covers every item.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::config::SummarizerConfig;
use crate::error::{Result, SummaryError};
use crate::metrics::{estimate_tokens, MetricsLedger, MetricsStats};
use crate::models::{EmailMessage, ModelConfig, Strategy, Summarizable, Summary, SummaryMetrics};

/// Formats an item's fields into a provider-ready text block
pub trait ContentPreparer<I>: Send + Sync {
    fn prepare_content(&self, item: &I) -> String;
}

/// "From/To/Subject/Date/Body" layout for emails
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailContentPreparer;

impl<I: Summarizable> ContentPreparer<I> for EmailContentPreparer {
    fn prepare_content(&self, item: &I) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}",
            item.sender(),
            item.recipients().join(", "),
            item.subject(),
            item.created_at().format("%Y-%m-%d %H:%M:%S UTC"),
            item.body()
        )
    }
}

/// Immutable summarizer settings
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerSettings {
    /// Item count at which `Adaptive` switches to a batched call
    pub batch_threshold: usize,
    /// Upper bound for chunk size under `Batch`
    pub max_batch_size: usize,
    /// Budget for one single-item generation call
    pub timeout: Duration,
    pub model_config: ModelConfig,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            batch_threshold: 10,
            max_batch_size: 50,
            timeout: Duration::from_secs(30),
            model_config: ModelConfig::default(),
        }
    }
}

impl From<&SummarizerConfig> for SummarizerSettings {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            batch_threshold: config.batch_threshold,
            max_batch_size: config.max_batch_size,
            timeout: Duration::try_from_secs_f64(config.timeout_secs)
                .unwrap_or(Duration::from_secs(30)),
            model_config: ModelConfig::default(),
        }
    }
}

/// Orchestrates summary generation for items of type `I`
pub struct AdaptiveSummarizer<I = EmailMessage> {
    backend: Arc<dyn ModelBackend>,
    preparer: Arc<dyn ContentPreparer<I>>,
    settings: SummarizerSettings,
    metrics: MetricsLedger,
    _item: PhantomData<fn(&I)>,
}

impl<I: Summarizable> AdaptiveSummarizer<I> {
    /// Summarizer using the email layout for content preparation
    pub fn new(backend: Arc<dyn ModelBackend>, settings: SummarizerSettings) -> Self {
        Self::with_preparer(backend, Arc::new(EmailContentPreparer), settings)
    }

    pub fn with_preparer(
        backend: Arc<dyn ModelBackend>,
        preparer: Arc<dyn ContentPreparer<I>>,
        settings: SummarizerSettings,
    ) -> Self {
        Self {
            backend,
            preparer,
            settings,
            metrics: MetricsLedger::new(),
            _item: PhantomData,
        }
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    pub fn prepare_content(&self, item: &I) -> String {
        self.preparer.prepare_content(item)
    }

    /// Build a summary carrying the model info and a fresh timestamp
    ///
    /// A model override in the settings replaces the backend's configured model.
    pub fn create_summary(
        &self,
        item_id: &str,
        summary_text: String,
        keywords: Vec<String>,
        owner_id: Option<&str>,
    ) -> Summary {
        let mut model_info = self.backend.model_info();
        if let Some(model) = &self.settings.model_config.model {
            model_info.model = model.clone();
        }
        Summary::new(
            owner_id.unwrap_or_default(),
            item_id,
            summary_text,
            keywords,
            Some(model_info),
        )
    }

    fn model_config(&self) -> Option<&ModelConfig> {
        if self.settings.model_config.is_empty() {
            None
        } else {
            Some(&self.settings.model_config)
        }
    }

    /// Batch size used by the `Batch` strategy
    pub fn effective_batch_size(&self, custom_batch_size: Option<usize>) -> usize {
        custom_batch_size
            .unwrap_or(self.settings.batch_threshold)
            .min(self.settings.max_batch_size)
            .max(1)
    }

    /// Summarize one item. The timeout covers only the generation call.
    ///
    /// A metrics sample is recorded on every exit, validation failures
    /// included.
    pub async fn process_single(&self, item: &I) -> Result<Summary> {
        let mut metrics = self.metrics.start(0, None);
        let item_id = item
            .item_id()
            .ok_or(SummaryError::MissingIdentifier { indices: Vec::new() })?;

        let content = self.prepare_content(item);
        metrics.set_token_count(estimate_tokens(&content));

        let generation = self.backend.generate_summary(&content, self.model_config());
        let (summary_text, keywords) = match tokio::time::timeout(self.settings.timeout, generation).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Summary generation for {} timed out after {:?}",
                    item_id, self.settings.timeout
                );
                return Err(SummaryError::GenerationTimeout {
                    seconds: self.settings.timeout.as_secs_f64(),
                });
            }
        };

        metrics.set_completion_tokens(estimate_tokens(&summary_text));
        let summary = self.create_summary(item_id, summary_text, keywords, item.owner_id());
        metrics.succeed();
        debug!("Generated summary for {}", item_id);
        Ok(summary)
    }

    /// Summarize items with one backend batch call, preserving order
    pub async fn process_batch(&self, items: &[I]) -> Result<Vec<Summary>> {
        let mut metrics = self.metrics.start(0, Some(items.len()));
        if items.is_empty() {
            return Err(SummaryError::EmptyInput);
        }

        let missing: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.item_id().is_none())
            .map(|(index, _)| index)
            .collect();
        if !missing.is_empty() {
            return Err(SummaryError::MissingIdentifier { indices: missing });
        }

        let contents: Vec<String> = items.iter().map(|item| self.prepare_content(item)).collect();
        metrics.set_token_count(contents.iter().map(|c| estimate_tokens(c)).sum());

        let results = self
            .backend
            .batch_generate_summaries(&contents, self.model_config())
            .await?;

        if results.len() != items.len() {
            return Err(SummaryError::ApiError(format!(
                "Backend returned {} summaries for {} items",
                results.len(),
                items.len()
            )));
        }

        let mut completion_tokens = 0;
        let summaries: Vec<Summary> = items
            .iter()
            .zip(results)
            .filter_map(|(item, (summary_text, keywords))| {
                completion_tokens += estimate_tokens(&summary_text);
                item.item_id()
                    .map(|id| self.create_summary(id, summary_text, keywords, item.owner_id()))
            })
            .collect();

        metrics.set_completion_tokens(completion_tokens);
        if !summaries.is_empty() {
            metrics.succeed();
        }
        debug!("Generated {} summaries in one batch", summaries.len());
        Ok(summaries)
    }

    /// Summarize `items` under `strategy`
    ///
    /// `Adaptive` below the threshold behaves like `Single`; at or above it,
    /// the entire input goes through one `process_batch` call without
    /// chunking.
    pub async fn summarize(
        &self,
        items: &[I],
        strategy: Strategy,
        custom_batch_size: Option<usize>,
    ) -> Result<Vec<Summary>> {
        if items.is_empty() {
            return Err(SummaryError::EmptyInput);
        }

        match strategy {
            Strategy::Single => self.summarize_each(items).await,
            Strategy::Batch => {
                let batch_size = self.effective_batch_size(custom_batch_size);
                info!(
                    "Summarizing {} items in batches of {}",
                    items.len(),
                    batch_size
                );
                let mut summaries = Vec::with_capacity(items.len());
                for chunk in items.chunks(batch_size) {
                    summaries.extend(self.process_batch(chunk).await?);
                }
                Ok(summaries)
            }
            Strategy::Adaptive => {
                if items.len() < self.settings.batch_threshold {
                    self.summarize_each(items).await
                } else {
                    info!(
                        "Summarizing {} items in a single batch (threshold {})",
                        items.len(),
                        self.settings.batch_threshold
                    );
                    self.process_batch(items).await
                }
            }
        }
    }

    async fn summarize_each(&self, items: &[I]) -> Result<Vec<Summary>> {
        info!("Summarizing {} items individually", items.len());
        let mut summaries = Vec::with_capacity(items.len());
        for item in items {
            summaries.push(self.process_single(item).await?);
        }
        Ok(summaries)
    }

    /// Copy of the recorded metrics
    pub fn metrics(&self) -> Vec<SummaryMetrics> {
        self.metrics.snapshot()
    }

    pub fn metrics_stats(&self) -> MetricsStats {
        self.metrics.stats()
    }

    pub fn reset_metrics(&self) {
        self.metrics.clear();
    }
}
