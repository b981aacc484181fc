//! Single-batch invocation boundary
//!
//! Runs exactly one batch per request and answers with JSON-serializable
//! payloads, so a scheduler or serverless host can drive a mailbox one page
//! at a time by passing `nextPageToken` back in.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::batch::{BatchOptions, BatchProcessor};
use crate::classifier::MessageClassifier;
use crate::client::GmailClient;
use crate::label_resolver::LabelCache;
use crate::models::{BatchResult, ClassifiedMessage, EmailCategory, Scope};

pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_BAD_GATEWAY: u16 = 502;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabeledMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub category: EmailCategory,
}

impl From<ClassifiedMessage> for LabeledMessage {
    fn from(classified: ClassifiedMessage) -> Self {
        Self {
            id: classified.message.id,
            thread_id: classified.message.thread_id,
            sender: classified.message.sender,
            subject: classified.message.subject,
            category: classified.category,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub results: Vec<LabeledMessage>,
    pub next_page_token: Option<String>,
}

impl From<BatchResult> for BatchResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            total: result.total,
            processed: result.processed,
            skipped: result.skipped,
            errors: result.errors,
            results: result.results.into_iter().map(LabeledMessage::from).collect(),
            next_page_token: result.next_page_token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub status: u16,
    pub error: String,
}

impl ErrorPayload {
    pub fn unauthorized() -> Self {
        Self {
            status: STATUS_UNAUTHORIZED,
            error: "Not authenticated".to_string(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_BAD_GATEWAY,
            error: message.into(),
        }
    }
}

/// Run one batch for an invocation
///
/// `client` is `None` when the caller holds no credential, which answers 401
/// without touching the classifier. A failed list call answers 502. A fresh
/// label cache is used for every invocation.
pub async fn handle_batch_request(
    request: BatchRequest,
    client: Option<Arc<dyn GmailClient>>,
    classifier: Arc<dyn MessageClassifier>,
    options: BatchOptions,
) -> std::result::Result<BatchResponse, ErrorPayload> {
    let Some(client) = client else {
        info!("Rejecting batch request: no credential");
        return Err(ErrorPayload::unauthorized());
    };

    let processor = BatchProcessor::new(client, classifier, options);
    let cache = LabelCache::new();

    match processor
        .process_batch(request.scope, request.page_token.as_deref(), &cache)
        .await
    {
        Ok(result) => Ok(result.into()),
        Err(e) => {
            error!("Batch request failed: {}", e);
            Err(ErrorPayload::bad_gateway(e.to_string()))
        }
    }
}
