use anyhow::Result;
use clap::Parser;
use email_summarizer::cli::{self, Cli, Commands, ProgressReporter};
use email_summarizer::config::Config;
use email_summarizer::error::SummaryError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            // Remove trailing newline for cleaner output
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: email-summarizer --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("email_summarizer=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs print above progress spinners
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(SummaryError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }

        Config::create_example(output).await?;

        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - backend.provider: 'openai', 'gemini', or 'openrouter'");
        println!("  - backend.api_key_env: environment variable holding the API key");
        println!("  - summarizer.batch_threshold: email count that triggers batching");
        println!("  - store.snapshot_path: where summaries are kept");
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    let snapshot = cli::snapshot_path(&cli, &config);
    let store = cli::open_store(&snapshot).await?;
    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());

    match &cli.command {
        Commands::Summarize {
            input,
            strategy,
            batch_size,
            owner,
        } => {
            let strategy = strategy.unwrap_or(config.summarizer.default_strategy);
            tracing::info!("Summarizing {:?} with {} strategy", input, strategy);

            let report = cli::run_summarize(
                &config,
                &store,
                input,
                strategy,
                *batch_size,
                owner.as_deref(),
                &reporter,
            )
            .await?;
            store.documents().save(&snapshot).await?;
            report.print();
        }

        Commands::Get { item_id, owner } => {
            let summary = store.require_summary(item_id, owner).await?;
            cli::print_summary_detail(&summary);
        }

        Commands::Generate {
            item_id,
            input,
            owner,
        } => {
            let summary =
                cli::run_generate(&config, &store, item_id, owner, input, &reporter).await?;
            store.documents().save(&snapshot).await?;
            cli::print_summary_detail(&summary);
        }

        Commands::List {
            owner,
            skip,
            limit,
            sort_by,
            order,
        } => {
            let summaries = store
                .get_summaries(*skip, *limit, *sort_by, *order, owner.as_deref())
                .await?;
            let total = store.count_summaries(owner.as_deref()).await?;
            println!("Showing {} of {} summaries", summaries.len(), total);
            summaries.iter().for_each(cli::print_summary_line);
        }

        Commands::Search {
            keywords,
            owner,
            limit,
        } => {
            let summaries = store
                .search_by_keywords(keywords, *limit, owner.as_deref())
                .await?;
            println!("Found {} summaries", summaries.len());
            summaries.iter().for_each(cli::print_summary_line);
        }

        Commands::Recent { days, owner, limit } => {
            let summaries = store
                .get_recent_summaries(*days, *limit, owner.as_deref())
                .await?;
            println!(
                "{} summaries generated in the last {} days",
                summaries.len(),
                days
            );
            summaries.iter().for_each(cli::print_summary_line);
        }

        Commands::Delete { item_id, owner } => {
            if store.delete_summary(item_id, owner).await? {
                store.documents().save(&snapshot).await?;
                println!("Deleted summary for {}", item_id);
            } else {
                println!("No summary stored for {} (owner {})", item_id, owner);
            }
        }

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    if let Some(summary_err) = error.downcast_ref::<SummaryError>() {
        match summary_err {
            SummaryError::Authentication(_) => {
                eprintln!("\nHint: Check that backend.api_key_env names a variable holding a valid key.");
            }
            SummaryError::RateLimitExceeded(_) => {
                eprintln!("\nHint: The provider is rate limiting requests.");
                eprintln!("      Consider reducing backend.max_concurrent in config.");
            }
            SummaryError::GenerationTimeout { .. } => {
                eprintln!("\nHint: Raise summarizer.timeout_secs or use a smaller batch size.");
            }
            SummaryError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: email-summarizer init-config --force");
            }
            _ => {}
        }
    }
}
