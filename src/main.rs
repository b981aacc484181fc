use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use mail_triage::cli::{self, Cli, Commands, LogFormat};
use mail_triage::config::Config;
use mail_triage::handler::BatchRequest;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Vec::new(),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
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

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

fn init_tracing(cli: &Cli, multi: Arc<MultiProgress>) {
    let default_directive = if cli.verbose {
        "mail_triage=debug,warn"
    } else {
        "mail_triage=info,warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter { multi })
        .with_target(false);

    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nFor help, run: mail-triage --help");
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    // Several dependencies pull in rustls; pick the provider explicitly
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, Arc::clone(&multi_progress));

    if let Commands::InitConfig { output, force } = &cli.command {
        cli::init_config(output, *force).await?;
        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - classifier.model / classifier.api_base: which model answers");
        println!("  - classifier.fallback_category: used when the reply is not a category");
        println!("  - run.page_size and run.batch_delay_ms: batch pacing");
        return Ok(0);
    }

    let mut config = Config::load(&cli.config).await?;

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            let email = cli::authenticate(&cli, &config, *force).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", email);
            Ok(0)
        }

        Commands::Run {
            scope,
            dry_run,
            report,
        } => {
            config.execution.dry_run |= *dry_run;
            if config.execution.dry_run {
                println!("Running in DRY RUN mode - no labels will be created or applied");
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Stop requested; finishing the current batch");
                    on_signal.cancel();
                }
            });

            let run_report = cli::run_triage(
                &cli,
                &config,
                *scope,
                (*multi_progress).clone(),
                cancel,
            )
            .await?;

            cli::print_summary(&run_report);

            if let Some(path) = report {
                run_report.save(path).await?;
                println!("Report written to: {:?}", path);
            }

            Ok(if matches!(run_report.status, mail_triage::RunStatus::Failed(_)) {
                1
            } else {
                0
            })
        }

        Commands::Batch {
            scope,
            page_token,
            dry_run,
        } => {
            config.execution.dry_run |= *dry_run;
            let request = BatchRequest {
                scope: *scope,
                page_token: page_token.clone(),
            };

            match cli::run_single_batch(&cli, &config, request).await? {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    Ok(0)
                }
                Err(payload) => {
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                    Ok(1)
                }
            }
        }

        Commands::Labels => {
            let table = cli::list_managed_labels(&cli, &config).await?;

            println!("\n{:<16} {:<18} Label ID", "Category", "Label");
            println!("{}", "-".repeat(56));
            for (category, label) in table {
                match label {
                    Some(label) => println!("{:<16} {:<18} {}", category, label.name, label.id),
                    None => println!("{:<16} {:<18} (not created yet)", category, category.label_name()),
                }
            }
            Ok(0)
        }

        Commands::InitConfig { .. } => Ok(0),
    }
}
