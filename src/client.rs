//! Gmail API client with bounded concurrency and per-call timeouts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Label, Message, ModifyMessageRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{Result, TriageError};
use crate::models::{LabelInfo, MessageMetadata};

/// System label id Gmail uses for inbox membership
pub const INBOX_LABEL: &str = "INBOX";
/// System label id Gmail uses for unread state
pub const UNREAD_LABEL: &str = "UNREAD";

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// One `messages.list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMessagesRequest {
    pub query: String,
    pub page_token: Option<String>,
    pub max_results: u32,
}

/// One page of message ids plus the cursor for the next page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Label ids to add to and remove from a single message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl LabelChange {
    /// Add one label and touch nothing else (read state and inbox membership stay as they are)
    pub fn add_only(label_id: impl Into<String>) -> Self {
        Self {
            add_label_ids: vec![label_id.into()],
            remove_label_ids: Vec::new(),
        }
    }

    pub fn removes(&self, label_id: &str) -> bool {
        self.remove_label_ids.iter().any(|id| id == label_id)
    }
}

impl From<&LabelChange> for ModifyMessageRequest {
    fn from(change: &LabelChange) -> Self {
        let non_empty = |ids: &Vec<String>| (!ids.is_empty()).then(|| ids.clone());
        ModifyMessageRequest {
            add_label_ids: non_empty(&change.add_label_ids),
            remove_label_ids: non_empty(&change.remove_label_ids),
        }
    }
}

/// Provider operations the triage pipeline depends on
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List one page of message ids matching a search query
    async fn list_messages(&self, request: &ListMessagesRequest) -> Result<MessagePage>;

    /// Get header metadata and preview snippet for a message
    async fn get_message(&self, id: &str) -> Result<MessageMetadata>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add and/or remove labels on a single message
    async fn modify_message(&self, message_id: &str, change: &LabelChange) -> Result<()>;
}

/// Production Gmail client
///
/// Every call acquires a semaphore permit and is wrapped in a timeout so a
/// stalled connection can never hang a batch. Failures are not retried.
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    request_timeout: Duration,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    ///
    /// # Arguments
    /// * `hub` - Authenticated Gmail API hub
    /// * `max_concurrent` - Maximum in-flight requests
    /// * `request_timeout` - Upper bound for each API call
    pub fn new(hub: GmailHub, max_concurrent: usize, request_timeout: Duration) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
            request_timeout,
        }
    }

    pub fn hub(&self) -> &GmailHub {
        &self.hub
    }

    async fn call<T, F>(&self, operation: &str, api_call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            TriageError::NetworkError(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        debug!("Calling Gmail API: {}", operation);
        match tokio::time::timeout(self.request_timeout, api_call).await {
            Ok(result) => result.map_err(TriageError::from),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation, self.request_timeout
                );
                Err(TriageError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.request_timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_messages(&self, request: &ListMessagesRequest) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(&request.query)
            .max_results(request.max_results);

        if let Some(token) = request.page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = self
            .call("messages.list", call.add_scope(MODIFY_SCOPE).doit())
            .await?;

        let message_ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg_ref| msg_ref.id)
            .collect();

        Ok(MessagePage {
            message_ids,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_message(&self, id: &str) -> Result<MessageMetadata> {
        let call = self
            .hub
            .users()
            .messages_get("me", id)
            .format("metadata")
            .add_metadata_headers("From")
            .add_metadata_headers("Subject")
            .add_metadata_headers("Date")
            .add_scope(MODIFY_SCOPE)
            .doit();

        let (_, msg) = self.call("messages.get", call).await?;
        parse_message_metadata(msg)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let call = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(LABELS_SCOPE)
            .doit();

        let (_, response) = self.call("labels.list", call).await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(LABELS_SCOPE)
            .doit();

        let (_, created_label) = self.call("labels.create", call).await?;

        created_label
            .id
            .ok_or_else(|| TriageError::LabelError(format!("Created label '{}' has no ID", name)))
    }

    async fn modify_message(&self, message_id: &str, change: &LabelChange) -> Result<()> {
        let call = self
            .hub
            .users()
            .messages_modify(ModifyMessageRequest::from(change), "me", message_id)
            .add_scope(MODIFY_SCOPE)
            .doit();

        self.call("messages.modify", call).await?;
        Ok(())
    }
}

/// Parse Gmail API Message into our MessageMetadata structure
fn parse_message_metadata(msg: Message) -> Result<MessageMetadata> {
    let id = msg
        .id
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing headers".to_string()))?;

    let mut sender = String::new();
    let mut subject = String::new();
    let mut date_str = String::new();

    for header in headers {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "from" => sender = value.clone(),
                "subject" => subject = value.clone(),
                "date" => date_str = value.clone(),
                _ => {}
            }
        }
    }

    let (sender_name, sender_email) =
        parse_email_header(&sender).unwrap_or_else(|| (String::new(), sender.trim().to_string()));

    let date_received = parse_date(&date_str)
        .ok()
        .or_else(|| msg.internal_date.and_then(DateTime::from_timestamp_millis))
        .unwrap_or_else(Utc::now);

    Ok(MessageMetadata {
        id,
        thread_id,
        sender,
        sender_email,
        sender_name,
        subject,
        snippet: msg.snippet.unwrap_or_default(),
        date_received,
        labels: msg.label_ids.unwrap_or_default(),
    })
}

/// Parse email header in "Name <email@example.com>" format
fn parse_email_header(header: &str) -> Option<(String, String)> {
    let start = header.find('<')?;
    let end = header[start..].find('>')? + start;
    let name = header[..start].trim().trim_matches('"').to_string();
    let email = header[start + 1..end].trim().to_string();
    Some((name, email))
}

/// Parse RFC 2822 date string
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TriageError::InvalidMessageFormat(format!("Invalid date format: {}", e)))
}
