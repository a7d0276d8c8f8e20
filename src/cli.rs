//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::backend::build_backend;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::MetricsStats;
use crate::models::{EmailMessage, SortField, SortOrder, Strategy, Summary};
use crate::store::{InMemoryDocumentStore, JsonItemSource, SummaryStore};
use crate::summarizer::{AdaptiveSummarizer, SummarizerSettings};

#[derive(Parser, Debug)]
#[command(name = "email-summarizer")]
#[command(version)]
#[command(about = "Summarize emails with a language model and store the results", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to the summary snapshot (overrides store.snapshot_path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize every email in a JSON file and store the results
    Summarize {
        /// JSON array of emails
        #[arg(short, long)]
        input: PathBuf,

        /// single, batch or adaptive (defaults to summarizer.default_strategy)
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Chunk size for the batch strategy
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only summarize emails belonging to this owner
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show the stored summary for one email
    Get {
        item_id: String,

        #[arg(long)]
        owner: String,
    },

    /// Return the stored summary, generating it if missing
    Generate {
        item_id: String,

        /// JSON array of emails to look the item up in
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        owner: String,
    },

    /// List stored summaries
    List {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// generated_at or item_id
        #[arg(long, default_value = "generated_at")]
        sort_by: SortField,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,
    },

    /// Find summaries tagged with any of the given keywords
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,

        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Summaries generated in the last N days
    Recent {
        #[arg(long, default_value_t = 7)]
        days: u32,

        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Delete a stored summary
    Delete {
        item_id: String,

        #[arg(long)]
        owner: String,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// Outcome of a `summarize` run
#[derive(Debug, Clone)]
pub struct Report {
    pub strategy: Strategy,
    pub emails: usize,
    pub summaries: Vec<Summary>,
    pub inserted: usize,
    pub modified: usize,
    pub stats: MetricsStats,
}

impl Report {
    pub fn print(&self) {
        println!("\n========================================");
        println!("Summarization Report");
        println!("========================================");
        println!("Strategy: {}", self.strategy);
        println!("Emails: {}", self.emails);
        println!("Summaries: {}", self.summaries.len());
        println!("Stored: {} new, {} updated", self.inserted, self.modified);
        println!("Processing units: {}", self.stats.samples);
        println!("Errors: {}", self.stats.errors);
        println!("Tokens: {}", self.stats.total_tokens);
        println!(
            "Average processing time: {:.2}s",
            self.stats.average_processing_time
        );
        println!("========================================");
        for summary in &self.summaries {
            print_summary_line(summary);
        }
    }
}

pub fn print_summary_line(summary: &Summary) {
    let keywords = if summary.keywords().is_empty() {
        String::new()
    } else {
        format!(" [{}]", summary.keywords().join(", "))
    };
    println!(
        "{} {}: {}{}",
        summary.generated_at().format("%Y-%m-%d %H:%M"),
        summary.key(),
        truncate_string(summary.summary_text(), 100),
        keywords
    );
}

pub fn print_summary_detail(summary: &Summary) {
    println!("Item: {}", summary.item_id());
    println!("Owner: {}", summary.owner_id());
    println!("Generated: {}", summary.generated_at().format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(model) = summary.model_info() {
        println!("Model: {}/{}", model.provider, model.model);
    }
    if !summary.keywords().is_empty() {
        println!("Keywords: {}", summary.keywords().join(", "));
    }
    println!("\n{}", summary.summary_text());
}

/// Resolve the snapshot path from the CLI override or the config
pub fn snapshot_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.store
        .clone()
        .unwrap_or_else(|| config.store.snapshot_path.clone())
}

pub async fn open_store(path: &Path) -> Result<SummaryStore<InMemoryDocumentStore>> {
    Ok(SummaryStore::new(InMemoryDocumentStore::load(path).await?))
}

pub fn build_summarizer(config: &Config) -> Result<AdaptiveSummarizer<EmailMessage>> {
    let backend = build_backend(&config.backend)?;
    Ok(AdaptiveSummarizer::new(
        backend,
        SummarizerSettings::from(&config.summarizer),
    ))
}

/// Summarize an input file and store the results, one batch save per owner
pub async fn run_summarize(
    config: &Config,
    store: &SummaryStore<InMemoryDocumentStore>,
    input: &Path,
    strategy: Strategy,
    batch_size: Option<usize>,
    owner: Option<&str>,
    reporter: &ProgressReporter,
) -> Result<Report> {
    let load_spinner = reporter.add_spinner("Loading emails...");
    let source = JsonItemSource::load(input).await?;
    let emails = source.for_owner(owner);
    reporter.finish_spinner(&load_spinner, &format!("Loaded {} emails", emails.len()));

    let summarizer = build_summarizer(config)?;

    let spinner = reporter.add_spinner(&format!(
        "Summarizing {} emails ({} strategy)...",
        emails.len(),
        strategy
    ));
    let summaries = match summarizer.summarize(&emails, strategy, batch_size).await {
        Ok(summaries) => summaries,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };
    reporter.finish_spinner(&spinner, &format!("Generated {} summaries", summaries.len()));

    let mut by_owner: BTreeMap<&str, Vec<Summary>> = BTreeMap::new();
    for summary in &summaries {
        by_owner
            .entry(summary.owner_id())
            .or_default()
            .push(summary.clone());
    }

    let (mut inserted, mut modified) = (0, 0);
    for (owner_id, owned) in &by_owner {
        let saved = store.save_summaries_batch(owned, owner_id).await?;
        inserted += saved.inserted;
        modified += saved.modified;
    }
    info!(
        "Stored summaries for {} owners ({} inserted, {} modified)",
        by_owner.len(),
        inserted,
        modified
    );

    Ok(Report {
        strategy,
        emails: emails.len(),
        stats: summarizer.metrics_stats(),
        summaries,
        inserted,
        modified,
    })
}

/// Get-or-create for a single email
pub async fn run_generate(
    config: &Config,
    store: &SummaryStore<InMemoryDocumentStore>,
    item_id: &str,
    owner: &str,
    input: &Path,
    reporter: &ProgressReporter,
) -> Result<Summary> {
    let source = JsonItemSource::load(input).await?;
    let summarizer = build_summarizer(config)?;

    let spinner = reporter.add_spinner(&format!("Fetching summary for {}...", item_id));
    let result = store
        .get_or_create_summary(item_id, owner, &source, &summarizer)
        .await;
    spinner.finish_and_clear();
    result
}
