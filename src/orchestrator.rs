//! Sequential batch loop with cooperative cancellation
//!
//! A run walks the mailbox one page at a time until the provider stops
//! returning a cursor, the caller cancels, or a batch call fails. Progress is
//! reported as a stream of [`RunEvent`]s; the last event is always
//! [`RunEvent::Finished`].

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::BatchProcessor;
use crate::error::Result;
use crate::label_resolver::LabelCache;
use crate::models::{BatchResult, ClassifiedMessage, RunStatistics, Scope};

/// Anything that can process one page of messages
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn process_batch(
        &self,
        scope: Scope,
        page_token: Option<&str>,
        cache: &LabelCache,
    ) -> Result<BatchResult>;
}

#[async_trait]
impl BatchSource for BatchProcessor {
    async fn process_batch(
        &self,
        scope: Scope,
        page_token: Option<&str>,
        cache: &LabelCache,
    ) -> Result<BatchResult> {
        BatchProcessor::process_batch(self, scope, page_token, cache).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    /// The provider returned no further cursor
    Completed,
    /// Cancelled at a batch boundary
    Stopped,
    Failed(String),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed(_))
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scope: Scope,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub stats: RunStatistics,
    pub results: Vec<ClassifiedMessage>,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Cumulative statistics after each finished batch
    BatchCompleted(RunStatistics),
    Finished(RunReport),
}

pub type RunEventStream<'a> = Pin<Box<dyn Stream<Item = RunEvent> + Send + 'a>>;

pub struct RunOrchestrator {
    source: Arc<dyn BatchSource>,
    batch_delay: Duration,
    dry_run: bool,
}

impl RunOrchestrator {
    pub fn new(source: Arc<dyn BatchSource>, batch_delay: Duration) -> Self {
        Self {
            source,
            batch_delay,
            dry_run: false,
        }
    }

    /// Mark reports produced by this orchestrator as dry runs
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run batches for `scope` until exhausted, cancelled, or failed
    ///
    /// `cancel` is only checked between batches; a batch in flight always
    /// finishes. Results from completed batches are kept in the final report
    /// regardless of how the run ended.
    pub fn run(&self, scope: Scope, cancel: CancellationToken) -> RunEventStream<'_> {
        Box::pin(stream! {
            let run_id = Uuid::new_v4();
            let started_at = Utc::now();
            let cache = LabelCache::new();
            let mut stats = RunStatistics::default();
            let mut results: Vec<ClassifiedMessage> = Vec::new();
            let mut cursor: Option<String> = None;
            let mut status = RunStatus::Idle;

            info!("Starting run {} (scope: {}, dry run: {})", run_id, scope, self.dry_run);

            if cancel.is_cancelled() {
                info!("Run {} cancelled before the first batch", run_id);
                status = RunStatus::Stopped;
            }

            while !status.is_terminal() {
                status = RunStatus::Running;
                debug!("Batch {} starting (cursor: {:?})", stats.batches + 1, cursor);

                let batch = match self.source.process_batch(scope, cursor.as_deref(), &cache).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!("Batch {} failed: {}", stats.batches + 1, e);
                        status = RunStatus::Failed(e.to_string());
                        break;
                    }
                };

                stats.absorb(&batch);
                results.extend(batch.results);
                cursor = batch.next_page_token;
                yield RunEvent::BatchCompleted(stats);

                if cursor.is_none() {
                    status = RunStatus::Completed;
                } else if cancel.is_cancelled() {
                    status = RunStatus::Stopped;
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => status = RunStatus::Stopped,
                        _ = tokio::time::sleep(self.batch_delay) => {}
                    }
                }
            }

            match &status {
                RunStatus::Stopped => warn!("Run {} stopped after {} batches", run_id, stats.batches),
                RunStatus::Failed(_) => warn!("Run {} failed after {} batches", run_id, stats.batches),
                _ => info!(
                    "Run {} completed: {} batches, {} processed, {} skipped, {} errors",
                    run_id, stats.batches, stats.processed, stats.skipped, stats.errors
                ),
            }

            yield RunEvent::Finished(RunReport {
                run_id,
                scope,
                dry_run: self.dry_run,
                started_at,
                finished_at: Utc::now(),
                status,
                stats,
                results,
            });
        })
    }

    /// Drain [`run`](Self::run) and return the final report
    pub async fn run_to_end(&self, scope: Scope, cancel: CancellationToken) -> RunReport {
        let mut events = self.run(scope, cancel);
        let mut report = None;
        while let Some(event) = events.next().await {
            if let RunEvent::Finished(finished) = event {
                report = Some(finished);
            }
        }

        // The stream always ends with Finished; this arm only satisfies the type
        report.unwrap_or_else(|| RunReport {
            run_id: Uuid::new_v4(),
            scope,
            dry_run: self.dry_run,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: RunStatus::Failed("run ended without a report".to_string()),
            stats: RunStatistics::default(),
            results: Vec::new(),
        })
    }
}
