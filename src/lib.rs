//! Gmail triage with a language model
//!
//! Walks a mailbox one page at a time, asks a chat-completion model to place
//! each unlabeled message into one of a fixed set of triage categories, and
//! applies the matching Gmail label, creating it on first use.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching
//! - **Classification**: single-turn prompt, unrecognized replies map to a
//!   fallback category
//! - **Labels**: per-run cache, get-or-create serialized behind one lock
//! - **Batches**: list, hydrate, classify and label one page concurrently
//! - **Runs**: sequential batches with cooperative cancellation and a
//!   progress event stream
//!
//! # Example Usage
//!
//! ```no_run
//! use mail_triage::{auth, client::ProductionGmailClient, config::Config};
//! use mail_triage::{BatchOptions, BatchProcessor, LlmClassifier, RunOrchestrator, Scope};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".mail-triage/token.json".as_ref(),
//!     )
//!     .await?;
//!     let client = Arc::new(ProductionGmailClient::new(
//!         hub,
//!         config.gmail.max_concurrent_requests,
//!         config.gmail.request_timeout(),
//!     ));
//!     let classifier = Arc::new(LlmClassifier::from_config(&config.classifier)?);
//!
//!     let processor = BatchProcessor::new(client, classifier, BatchOptions::from_config(&config));
//!     let orchestrator = RunOrchestrator::new(Arc::new(processor), config.run.batch_delay());
//!
//!     let report = orchestrator.run_to_end(Scope::Inbox, CancellationToken::new()).await;
//!     println!("{}: {} labeled", report.status, report.stats.processed);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Gmail API seam and its rate-limited production client
//! - [`classifier`] - Prompt construction and reply validation
//! - [`label_resolver`] - Label lookup and idempotent creation
//! - [`batch`] - One page of triage work
//! - [`orchestrator`] - The batch loop, run status and events
//! - [`handler`] - Single-batch JSON boundary
//! - [`report`] - Markdown run reports
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod batch;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod label_resolver;
pub mod models;
pub mod orchestrator;
pub mod report;

pub use batch::{build_search_query, BatchOptions, BatchProcessor, MessageOutcome};
pub use classifier::{LlmClassifier, MessageClassifier};
pub use client::{GmailClient, LabelChange, ListMessagesRequest, MessagePage};
pub use error::{Result, TriageError};
pub use handler::{handle_batch_request, BatchRequest, BatchResponse, ErrorPayload};
pub use label_resolver::{LabelCache, LabelResolver};
pub use models::{
    BatchResult, ClassifiedMessage, EmailCategory, LabelInfo, MessageMetadata, RunStatistics,
    Scope,
};
pub use orchestrator::{BatchSource, RunEvent, RunOrchestrator, RunReport, RunStatus};
