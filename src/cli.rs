//! Command-line interface

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth;
use crate::batch::{BatchOptions, BatchProcessor};
use crate::classifier::{LlmClassifier, MessageClassifier};
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::handler::{self, BatchRequest, BatchResponse, ErrorPayload};
use crate::label_resolver::{LabelCache, LabelResolver};
use crate::models::{EmailCategory, LabelInfo, Scope};
use crate::orchestrator::{RunEvent, RunOrchestrator, RunReport, RunStatus};

#[derive(Parser, Debug)]
#[command(name = "mail-triage")]
#[command(version = "0.1.0")]
#[command(about = "Sorts unlabeled Gmail messages into triage labels with a language model", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".mail-triage/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Label every unlabeled message in scope, batch by batch
    Run {
        /// Which messages to triage
        #[arg(long, value_enum, default_value_t = Scope::Inbox)]
        scope: Scope,

        /// Classify only; create and apply no labels
        #[arg(long)]
        dry_run: bool,

        /// Write a Markdown report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Process a single batch and print the result as JSON
    Batch {
        #[arg(long, value_enum, default_value_t = Scope::Inbox)]
        scope: Scope,

        /// Cursor returned as nextPageToken by a previous batch
        #[arg(long)]
        page_token: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// List the triage labels present in the account
    Labels,

    /// Generate example configuration file
    InitConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above spinners
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
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an authenticated, rate-limited Gmail client
pub async fn connect(cli: &Cli, config: &Config) -> Result<ProductionGmailClient> {
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    Ok(ProductionGmailClient::new(
        hub,
        config.gmail.max_concurrent_requests,
        config.gmail.request_timeout(),
    ))
}

/// Run the OAuth flow and return the connected account's address
pub async fn authenticate(cli: &Cli, config: &Config, force: bool) -> Result<String> {
    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let client = connect(cli, config).await?;

    // Must specify scope to avoid triggering an additional OAuth flow
    let (_, profile) = client
        .hub()
        .users()
        .get_profile("me")
        .add_scope(auth::REQUIRED_SCOPES[0])
        .doit()
        .await?;

    Ok(profile.email_address.unwrap_or_default())
}

/// Run a full triage pass, updating a spinner after every batch
pub async fn run_triage(
    cli: &Cli,
    config: &Config,
    scope: Scope,
    multi: MultiProgress,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let classifier = Arc::new(LlmClassifier::from_config(&config.classifier)?);
    let client: Arc<dyn GmailClient> = Arc::new(connect(cli, config).await?);

    let processor = BatchProcessor::new(client, classifier, BatchOptions::from_config(config));
    let orchestrator = RunOrchestrator::new(Arc::new(processor), config.run.batch_delay())
        .with_dry_run(config.execution.dry_run);

    let reporter = ProgressReporter::with_multi_progress(multi);
    let spinner = reporter.add_spinner(&format!("Triaging {} messages...", scope));

    let mut events = orchestrator.run(scope, cancel);
    let mut finished = None;
    while let Some(event) = events.next().await {
        match event {
            RunEvent::BatchCompleted(stats) => spinner.set_message(format!(
                "Batch {}: {} labeled, {} skipped, {} errors",
                stats.batches, stats.processed, stats.skipped, stats.errors
            )),
            RunEvent::Finished(report) => finished = Some(report),
        }
    }

    let report = finished.ok_or_else(|| {
        TriageError::ApiError("Run ended without a report".to_string())
    })?;

    let summary = format!(
        "Run {}: {} messages in {} batches",
        report.status, report.stats.total, report.stats.batches
    );
    reporter.finish_spinner(&spinner, &summary);

    Ok(report)
}

/// Print the end-of-run summary block
pub fn print_summary(report: &RunReport) {
    println!("\n========================================");
    println!("Triage Run Summary");
    println!("========================================");
    println!("Run ID: {}", report.run_id);
    println!("Scope: {}", report.scope);
    println!("Status: {}", report.status);
    println!("Duration: {} seconds", report.elapsed().num_seconds());
    println!("Batches: {}", report.stats.batches);
    println!("Messages examined: {}", report.stats.total);
    println!(
        "{}: {}",
        if report.dry_run { "Classified" } else { "Labeled" },
        report.stats.processed
    );
    println!("Skipped: {}", report.stats.skipped);
    println!("Errors: {}", report.stats.errors);
    println!("========================================");

    if report.status == RunStatus::Stopped {
        println!("Stopped on request. Run again to continue where this left off.");
    }
}

/// Handle one `batch` invocation
///
/// A missing token cache is reported as a 401 payload rather than opening a
/// browser for the OAuth flow.
pub async fn run_single_batch(
    cli: &Cli,
    config: &Config,
    request: BatchRequest,
) -> Result<std::result::Result<BatchResponse, ErrorPayload>> {
    let classifier: Arc<dyn MessageClassifier> =
        Arc::new(LlmClassifier::from_config(&config.classifier)?);

    let client: Option<Arc<dyn GmailClient>> = if auth::has_cached_token(&cli.token_cache) {
        match connect(cli, config).await {
            Ok(client) => Some(Arc::new(client) as Arc<dyn GmailClient>),
            Err(e) => {
                return Ok(Err(ErrorPayload {
                    status: handler::STATUS_UNAUTHORIZED,
                    error: e.to_string(),
                }))
            }
        }
    } else {
        None
    };

    let options = BatchOptions::from_config(config);
    Ok(handler::handle_batch_request(request, client, classifier, options).await)
}

/// Triage labels present in the account, in category order
pub async fn list_managed_labels(
    cli: &Cli,
    config: &Config,
) -> Result<Vec<(EmailCategory, Option<LabelInfo>)>> {
    let client: Arc<dyn GmailClient> = Arc::new(connect(cli, config).await?);
    let resolver = LabelResolver::new(client);
    let labels = resolver.list_all_labels(&LabelCache::new()).await?;

    Ok(managed_label_table(&labels))
}

/// Pair every category with its label in `labels`, if present
pub fn managed_label_table(labels: &[LabelInfo]) -> Vec<(EmailCategory, Option<LabelInfo>)> {
    EmailCategory::ALL
        .iter()
        .map(|category| {
            let label = labels
                .iter()
                .find(|label| EmailCategory::from_label_name(&label.name) == Some(*category))
                .cloned();
            (*category, label)
        })
        .collect()
}

/// Write the example configuration, refusing to clobber without `force`
pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(TriageError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await
}
