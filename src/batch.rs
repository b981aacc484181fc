//! One page of triage work: list, hydrate, classify, label, tally

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::MessageClassifier;
use crate::client::{GmailClient, LabelChange, ListMessagesRequest};
use crate::config::Config;
use crate::error::Result;
use crate::label_resolver::{LabelCache, LabelResolver};
use crate::models::{BatchResult, ClassifiedMessage, EmailCategory, MessageMetadata, Scope};

/// Build the Gmail search query for one scope
///
/// Every managed label is excluded, so a message that was labeled by an
/// earlier batch or run is never listed again.
pub fn build_search_query(scope: Scope) -> String {
    let mut parts: Vec<String> = match scope {
        Scope::Inbox => vec!["in:inbox".to_string()],
        Scope::All => vec!["-in:spam".to_string(), "-in:trash".to_string()],
    };

    parts.extend(EmailCategory::label_names().map(|name| format!("-label:\"{}\"", name)));
    parts.join(" ")
}

/// What happened to one hydrated message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Labeled(ClassifiedMessage),
    /// Already carries a managed label
    Skipped { message_id: String },
    Failed { message_id: String, reason: String },
}

/// Fold per-message outcomes into a batch result
pub fn tally<I>(outcomes: I, next_page_token: Option<String>) -> BatchResult
where
    I: IntoIterator<Item = MessageOutcome>,
{
    let empty = BatchResult {
        next_page_token,
        ..Default::default()
    };

    outcomes.into_iter().fold(empty, |mut result, outcome| {
        result.total += 1;
        match outcome {
            MessageOutcome::Labeled(classified) => {
                result.processed += 1;
                result.results.push(classified);
            }
            MessageOutcome::Skipped { .. } => result.skipped += 1,
            MessageOutcome::Failed { .. } => result.errors += 1,
        }
        result
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub page_size: u32,
    /// Messages hydrated or labeled in parallel
    pub concurrency: usize,
    /// Classify only; create and apply no labels
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            concurrency: 5,
            dry_run: false,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.run.page_size,
            concurrency: config.run.message_concurrency.max(1),
            dry_run: config.execution.dry_run,
        }
    }
}

/// Classifies and labels one page of unlabeled messages
pub struct BatchProcessor {
    client: Arc<dyn GmailClient>,
    classifier: Arc<dyn MessageClassifier>,
    resolver: LabelResolver,
    options: BatchOptions,
}

impl BatchProcessor {
    pub fn new(
        client: Arc<dyn GmailClient>,
        classifier: Arc<dyn MessageClassifier>,
        options: BatchOptions,
    ) -> Self {
        Self {
            resolver: LabelResolver::new(Arc::clone(&client)),
            client,
            classifier,
            options,
        }
    }

    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Process one page of messages for `scope`, starting at `page_token`
    ///
    /// Only a failure of the list call itself is returned as an error.
    /// Per-message failures are counted in the result.
    pub async fn process_batch(
        &self,
        scope: Scope,
        page_token: Option<&str>,
        cache: &LabelCache,
    ) -> Result<BatchResult> {
        let request = ListMessagesRequest {
            query: build_search_query(scope),
            page_token: page_token.map(str::to_string),
            max_results: self.options.page_size,
        };
        debug!("Listing messages with query: {}", request.query);

        let page = self.client.list_messages(&request).await?;
        let listed = page.message_ids.len();

        let messages = self.hydrate(page.message_ids).await;
        if messages.len() < listed {
            warn!(
                "Dropped {} of {} messages that could not be fetched",
                listed - messages.len(),
                listed
            );
        }

        let managed_ids = if messages.is_empty() {
            HashSet::new()
        } else {
            self.managed_label_ids(cache).await
        };

        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|message| self.process_message(message, &managed_ids, cache))
            .buffered(self.options.concurrency)
            .collect()
            .await;

        let result = tally(outcomes, page.next_page_token);
        info!(
            "Batch complete: {} fetched, {} processed, {} skipped, {} errors",
            result.total, result.processed, result.skipped, result.errors
        );
        Ok(result)
    }

    /// Fetch metadata for each id, keeping page order and dropping failures
    async fn hydrate(&self, message_ids: Vec<String>) -> Vec<MessageMetadata> {
        let fetched: Vec<(String, Result<MessageMetadata>)> = stream::iter(message_ids)
            .map(|id| async move {
                let result = self.client.get_message(&id).await;
                (id, result)
            })
            .buffered(self.options.concurrency)
            .collect()
            .await;

        fetched
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Skipping message {}: failed to fetch details: {}", id, e);
                    None
                }
            })
            .collect()
    }

    async fn managed_label_ids(&self, cache: &LabelCache) -> HashSet<String> {
        match self.resolver.list_owned_label_ids(cache).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                // Resolution will fail per message and be counted there
                warn!("Could not load labels for skip check: {}", e);
                HashSet::new()
            }
        }
    }

    async fn process_message(
        &self,
        message: MessageMetadata,
        managed_ids: &HashSet<String>,
        cache: &LabelCache,
    ) -> MessageOutcome {
        if message.labels.iter().any(|id| managed_ids.contains(id)) {
            debug!("Message {} already carries a managed label", message.id);
            return MessageOutcome::Skipped {
                message_id: message.id,
            };
        }

        match self.label_message(&message, cache).await {
            Ok(category) => MessageOutcome::Labeled(ClassifiedMessage { message, category }),
            Err(e) => {
                warn!("Failed to triage message {}: {}", message.id, e);
                MessageOutcome::Failed {
                    message_id: message.id,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn label_message(
        &self,
        message: &MessageMetadata,
        cache: &LabelCache,
    ) -> Result<EmailCategory> {
        let category = self.classifier.classify(message).await?;
        if self.options.dry_run {
            debug!("Dry run: would label message {} as {}", message.id, category);
            return Ok(category);
        }

        let label_id = self
            .resolver
            .resolve_label_id(cache, category.label_name())
            .await?;
        self.client
            .modify_message(&message.id, &LabelChange::add_only(label_id))
            .await?;

        debug!("Labeled message {} as {}", message.id, category);
        Ok(category)
    }
}
