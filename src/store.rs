//! Summary persistence
//!
//! [`DocumentStore`] is the persistence seam (a MongoDB collection in
//! production). [`InMemoryDocumentStore`] is the in-process implementation,
//! snapshotted to JSON on disk. [`SummaryStore`] is the owner-scoped facade
//! the rest of the system talks to.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, SummaryError};
use crate::models::{
    EmailMessage, SortField, SortOrder, Strategy, Summarizable, Summary, SummaryKey,
};
use crate::summarizer::AdaptiveSummarizer;

/// Result of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Modified,
    /// Existing document already held identical content
    Unchanged,
}

/// Counts from a bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSaveResult {
    pub inserted: usize,
    pub modified: usize,
}

/// A persisted summary with its document id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub id: String,
    pub summary: Summary,
}

/// Filter, sort and page parameters for `find_many`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryQuery {
    pub owner_id: Option<String>,
    /// Match documents having any of these keywords
    pub keywords_any: Option<Vec<String>>,
    pub generated_after: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl SummaryQuery {
    fn matches(&self, summary: &Summary) -> bool {
        if let Some(owner) = &self.owner_id {
            if summary.owner_id() != owner {
                return false;
            }
        }
        if let Some(keywords) = &self.keywords_any {
            if !summary.keywords().iter().any(|k| keywords.contains(k)) {
                return false;
            }
        }
        if let Some(after) = self.generated_after {
            if summary.generated_at() < after {
                return false;
            }
        }
        true
    }
}

/// Keyed document collection for summaries, unique on `(item_id, owner_id)`
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, key: &SummaryKey) -> Result<Option<StoredSummary>>;

    async fn find_many(&self, query: &SummaryQuery) -> Result<Vec<StoredSummary>>;

    /// Insert or replace the document for `summary.key()`; returns its id
    async fn upsert(&self, summary: &Summary) -> Result<(String, UpsertOutcome)>;

    async fn delete_one(&self, key: &SummaryKey) -> Result<bool>;

    /// Apply all upserts as one operation
    async fn bulk_upsert(&self, summaries: &[Summary]) -> Result<Vec<UpsertOutcome>>;

    async fn count(&self, owner_id: Option<&str>) -> Result<usize>;
}

/// Source of the emails summaries are generated from
#[async_trait]
pub trait ItemSource<I>: Send + Sync {
    async fn get_item(&self, item_id: &str, owner_id: &str) -> Result<Option<I>>;
}

/// Emails loaded from a JSON array on disk
#[derive(Debug, Clone, Default)]
pub struct JsonItemSource {
    emails: Vec<EmailMessage>,
}

impl JsonItemSource {
    pub fn new(emails: Vec<EmailMessage>) -> Self {
        Self { emails }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let emails: Vec<EmailMessage> = serde_json::from_str(&json)?;
        debug!("Loaded {} emails from {:?}", emails.len(), path);
        Ok(Self { emails })
    }

    pub fn emails(&self) -> &[EmailMessage] {
        &self.emails
    }

    /// Emails belonging to `owner_id`, or all of them
    pub fn for_owner(&self, owner_id: Option<&str>) -> Vec<EmailMessage> {
        self.emails
            .iter()
            .filter(|email| owner_id.map_or(true, |owner| email.owner_id == owner))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ItemSource<EmailMessage> for JsonItemSource {
    async fn get_item(&self, item_id: &str, owner_id: &str) -> Result<Option<EmailMessage>> {
        Ok(self
            .emails
            .iter()
            .find(|email| email.item_id() == Some(item_id) && email.owner_id == owner_id)
            .cloned())
    }
}

/// Document store held in memory, optionally snapshotted to a JSON file
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<SummaryKey, StoredSummary>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, or start empty if the file does not exist
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No summary snapshot at {:?}, starting empty", path);
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let documents: Vec<StoredSummary> = serde_json::from_str(&json)?;
        info!("Loaded {} summaries from {:?}", documents.len(), path);

        let map = documents
            .into_iter()
            .map(|doc| (doc.summary.key(), doc))
            .collect();
        Ok(Self {
            documents: RwLock::new(map),
        })
    }

    /// Write every document to `path` as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let documents: Vec<StoredSummary> = self.documents.read().await.values().cloned().collect();
        let json = serde_json::to_string_pretty(&documents)?;
        tokio::fs::write(path, json).await?;
        debug!("Saved {} summaries to {:?}", documents.len(), path);
        Ok(())
    }

    fn upsert_locked(
        documents: &mut BTreeMap<SummaryKey, StoredSummary>,
        summary: &Summary,
    ) -> (String, UpsertOutcome) {
        let key = summary.key();
        match documents.get_mut(&key) {
            Some(existing) if existing.summary == *summary => {
                (existing.id.clone(), UpsertOutcome::Unchanged)
            }
            Some(existing) => {
                existing.summary = summary.clone();
                (existing.id.clone(), UpsertOutcome::Modified)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                documents.insert(
                    key,
                    StoredSummary {
                        id: id.clone(),
                        summary: summary.clone(),
                    },
                );
                (id, UpsertOutcome::Inserted)
            }
        }
    }
}

fn compare(a: &Summary, b: &Summary, field: SortField) -> std::cmp::Ordering {
    match field {
        SortField::GeneratedAt => a
            .generated_at()
            .cmp(&b.generated_at())
            .then_with(|| a.item_id().cmp(b.item_id())),
        SortField::ItemId => a.item_id().cmp(b.item_id()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(&self, key: &SummaryKey) -> Result<Option<StoredSummary>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn find_many(&self, query: &SummaryQuery) -> Result<Vec<StoredSummary>> {
        let documents = self.documents.read().await;
        let mut matches: Vec<StoredSummary> = documents
            .values()
            .filter(|doc| query.matches(&doc.summary))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            let ordering = compare(&a.summary, &b.summary, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches.into_iter().skip(query.skip).take(limit).collect())
    }

    async fn upsert(&self, summary: &Summary) -> Result<(String, UpsertOutcome)> {
        let mut documents = self.documents.write().await;
        Ok(Self::upsert_locked(&mut documents, summary))
    }

    async fn delete_one(&self, key: &SummaryKey) -> Result<bool> {
        Ok(self.documents.write().await.remove(key).is_some())
    }

    async fn bulk_upsert(&self, summaries: &[Summary]) -> Result<Vec<UpsertOutcome>> {
        let mut documents = self.documents.write().await;
        Ok(summaries
            .iter()
            .map(|summary| Self::upsert_locked(&mut documents, summary).1)
            .collect())
    }

    async fn count(&self, owner_id: Option<&str>) -> Result<usize> {
        let documents = self.documents.read().await;
        Ok(match owner_id {
            None => documents.len(),
            Some(owner) => documents.keys().filter(|k| k.owner_id == owner).count(),
        })
    }
}

/// Wrap a persistence failure so callers can tell it apart from provider errors
fn storage_error(operation: &str, error: SummaryError) -> SummaryError {
    match error {
        SummaryError::StorageError(_) => error,
        other => SummaryError::StorageError(format!("{} failed: {}", operation, other)),
    }
}

/// Owner-scoped summary persistence
pub struct SummaryStore<S> {
    documents: S,
}

impl<S: DocumentStore> SummaryStore<S> {
    pub fn new(documents: S) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &S {
        &self.documents
    }

    /// Upsert keyed by `(item_id, owner_id)`; last write wins
    pub async fn save_summary(&self, summary: &Summary) -> Result<String> {
        let (id, outcome) = self
            .documents
            .upsert(summary)
            .await
            .map_err(|e| storage_error("save_summary", e))?;
        debug!("Saved summary {} ({:?})", summary.key(), outcome);
        Ok(id)
    }

    pub async fn get_summary(&self, item_id: &str, owner_id: &str) -> Result<Option<Summary>> {
        let found = self
            .documents
            .find_one(&SummaryKey::new(item_id, owner_id))
            .await
            .map_err(|e| storage_error("get_summary", e))?;
        Ok(found.map(|doc| doc.summary))
    }

    /// Like [`get_summary`](Self::get_summary) but absence is an error
    pub async fn require_summary(&self, item_id: &str, owner_id: &str) -> Result<Summary> {
        self.get_summary(item_id, owner_id)
            .await?
            .ok_or_else(|| SummaryError::SummaryNotFound {
                item_id: item_id.to_string(),
            })
    }

    pub async fn get_summaries(
        &self,
        skip: usize,
        limit: usize,
        sort_by: SortField,
        sort_order: SortOrder,
        owner_id: Option<&str>,
    ) -> Result<Vec<Summary>> {
        let query = SummaryQuery {
            owner_id: owner_id.map(str::to_string),
            sort_by,
            sort_order,
            skip,
            limit: Some(limit),
            ..Default::default()
        };
        self.find(&query, "get_summaries").await
    }

    /// Summaries having any of `keywords`, newest first
    pub async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
        owner_id: Option<&str>,
    ) -> Result<Vec<Summary>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let query = SummaryQuery {
            owner_id: owner_id.map(str::to_string),
            keywords_any: Some(keywords.to_vec()),
            limit: Some(limit),
            ..Default::default()
        };
        self.find(&query, "search_by_keywords").await
    }

    /// Summaries generated within the last `days` days, newest first
    pub async fn get_recent_summaries(
        &self,
        days: u32,
        limit: usize,
        owner_id: Option<&str>,
    ) -> Result<Vec<Summary>> {
        // A window reaching past the earliest representable time has no lower bound
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let query = SummaryQuery {
            owner_id: owner_id.map(str::to_string),
            generated_after: Some(cutoff),
            limit: Some(limit),
            ..Default::default()
        };
        self.find(&query, "get_recent_summaries").await
    }

    pub async fn delete_summary(&self, item_id: &str, owner_id: &str) -> Result<bool> {
        let deleted = self
            .documents
            .delete_one(&SummaryKey::new(item_id, owner_id))
            .await
            .map_err(|e| storage_error("delete_summary", e))?;
        if deleted {
            info!("Deleted summary {}/{}", owner_id, item_id);
        }
        Ok(deleted)
    }

    /// Bulk upsert of one owner's summaries
    ///
    /// Every summary must belong to `owner_id`; a mismatch rejects the whole
    /// batch before anything is written.
    pub async fn save_summaries_batch(
        &self,
        summaries: &[Summary],
        owner_id: &str,
    ) -> Result<BatchSaveResult> {
        if summaries.is_empty() {
            return Ok(BatchSaveResult::default());
        }
        if let Some(stray) = summaries.iter().find(|s| s.owner_id() != owner_id) {
            return Err(SummaryError::InvalidInput(format!(
                "Summary for item {} belongs to owner '{}', not '{}'",
                stray.item_id(),
                stray.owner_id(),
                owner_id
            )));
        }

        let outcomes = self
            .documents
            .bulk_upsert(summaries)
            .await
            .map_err(|e| storage_error("save_summaries_batch", e))?;

        let result = outcomes
            .iter()
            .fold(BatchSaveResult::default(), |mut acc, outcome| {
                match outcome {
                    UpsertOutcome::Inserted => acc.inserted += 1,
                    UpsertOutcome::Modified => acc.modified += 1,
                    UpsertOutcome::Unchanged => {}
                }
                acc
            });
        info!(
            "Saved {} summaries for {}: {} inserted, {} modified",
            summaries.len(),
            owner_id,
            result.inserted,
            result.modified
        );
        Ok(result)
    }

    pub async fn count_summaries(&self, owner_id: Option<&str>) -> Result<usize> {
        self.documents
            .count(owner_id)
            .await
            .map_err(|e| storage_error("count_summaries", e))
    }

    /// Return the stored summary, generating and saving one on a miss
    ///
    /// Concurrent calls for the same key are not de-duplicated: both may
    /// generate, and the later save wins.
    pub async fn get_or_create_summary<I: Summarizable>(
        &self,
        item_id: &str,
        owner_id: &str,
        items: &dyn ItemSource<I>,
        summarizer: &AdaptiveSummarizer<I>,
    ) -> Result<Summary> {
        if let Some(existing) = self.get_summary(item_id, owner_id).await? {
            debug!("Summary cache hit for {}/{}", owner_id, item_id);
            return Ok(existing);
        }

        let item = items
            .get_item(item_id, owner_id)
            .await?
            .ok_or_else(|| SummaryError::ItemNotFound {
                item_id: item_id.to_string(),
                owner_id: owner_id.to_string(),
            })?;

        let summary = summarizer
            .summarize(std::slice::from_ref(&item), Strategy::Single, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SummaryError::ApiError("Summarizer produced no summary".to_string()))?;

        self.save_summary(&summary).await?;
        info!("Generated and stored summary for {}/{}", owner_id, item_id);
        Ok(summary)
    }

    async fn find(&self, query: &SummaryQuery, operation: &str) -> Result<Vec<Summary>> {
        let documents = self
            .documents
            .find_many(query)
            .await
            .map_err(|e| storage_error(operation, e))?;
        Ok(documents.into_iter().map(|doc| doc.summary).collect())
    }
}
