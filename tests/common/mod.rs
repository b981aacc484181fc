//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use mail_triage::client::{GmailClient, LabelChange, ListMessagesRequest, MessagePage};
use mail_triage::classifier::MessageClassifier;
use mail_triage::error::{Result, TriageError};
use mail_triage::models::{EmailCategory, LabelInfo, MessageMetadata};
use mockall::mock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Create a test message with default values
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender: format!("Test Sender <{}>", sender),
        sender_email: sender.to_string(),
        sender_name: "Test Sender".to_string(),
        subject: subject.to_string(),
        snippet: format!("Preview of {}", subject),
        date_received: Utc::now(),
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

/// Create a test message that already carries the given label ids
pub fn create_labeled_message(id: &str, label_ids: &[&str]) -> MessageMetadata {
    let mut message = create_test_message(id, "someone@example.com", "Already sorted");
    message.labels.extend(label_ids.iter().map(|l| l.to_string()));
    message
}

pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Gmail system labels plus one user label unrelated to triage
pub fn system_labels() -> Vec<LabelInfo> {
    vec![
        create_test_label_info("INBOX", "INBOX"),
        create_test_label_info("UNREAD", "UNREAD"),
        create_test_label_info("Label_travel", "Travel"),
    ]
}

pub fn page(ids: &[&str], next_page_token: Option<&str>) -> MessagePage {
    MessagePage {
        message_ids: ids.iter().map(|id| id.to_string()).collect(),
        next_page_token: next_page_token.map(str::to_string),
    }
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn list_messages(&self, request: &ListMessagesRequest) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<MessageMetadata>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_message(&self, message_id: &str, change: &LabelChange) -> Result<()>;
    }
}

mock! {
    pub Classifier {}

    #[async_trait::async_trait]
    impl MessageClassifier for Classifier {
        async fn classify(&self, message: &MessageMetadata) -> Result<EmailCategory>;
    }
}

/// In-memory mailbox that records every mutating call
///
/// Unlike the mocks this tolerates real concurrency, and can slow down label
/// creation to widen race windows.
#[derive(Default)]
pub struct FakeGmailClient {
    pages: Mutex<HashMap<Option<String>, MessagePage>>,
    messages: Mutex<HashMap<String, MessageMetadata>>,
    labels: Mutex<Vec<LabelInfo>>,
    failing_gets: HashSet<String>,
    failing_modifies: HashSet<String>,
    failing_creates: AtomicUsize,
    create_delay: Duration,
    pub list_requests: Mutex<Vec<ListMessagesRequest>>,
    pub list_label_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub modifications: Mutex<Vec<(String, LabelChange)>>,
}

impl FakeGmailClient {
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(system_labels()),
            ..Default::default()
        }
    }

    /// Serve `messages` as the page reached with `cursor`
    pub fn with_page(
        self,
        cursor: Option<&str>,
        messages: Vec<MessageMetadata>,
        next_page_token: Option<&str>,
    ) -> Self {
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        self.pages
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_string), page(&ids, next_page_token));
        {
            let mut stored = self.messages.lock().unwrap();
            for message in messages {
                stored.insert(message.id.clone(), message);
            }
        }
        self
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.labels.lock().unwrap().push(create_test_label_info(id, name));
        self
    }

    pub fn with_failing_get(mut self, id: &str) -> Self {
        self.failing_gets.insert(id.to_string());
        self
    }

    pub fn with_failing_modify(mut self, id: &str) -> Self {
        self.failing_modifies.insert(id.to_string());
        self
    }

    /// Fail the next `count` label creations
    pub fn with_failing_creates(self, count: usize) -> Self {
        self.failing_creates.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.labels.lock().unwrap().clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.id.clone())
    }

    pub fn modified_ids(&self) -> Vec<String> {
        self.modifications
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl GmailClient for FakeGmailClient {
    async fn list_messages(&self, request: &ListMessagesRequest) -> Result<MessagePage> {
        self.list_requests.lock().unwrap().push(request.clone());
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&request.page_token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_message(&self, id: &str) -> Result<MessageMetadata> {
        if self.failing_gets.contains(id) {
            return Err(TriageError::NotFound(format!("message {}", id)));
        }
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("message {}", id)))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.list_label_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.labels())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let remaining = self.failing_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(TriageError::ServerError {
                status: 500,
                message: "backend error".to_string(),
            });
        }

        let id = format!("Label_{}", call + 1);
        self.labels
            .lock()
            .unwrap()
            .push(create_test_label_info(&id, name));
        Ok(id)
    }

    async fn modify_message(&self, message_id: &str, change: &LabelChange) -> Result<()> {
        if self.failing_modifies.contains(message_id) {
            return Err(TriageError::Forbidden(format!("message {}", message_id)));
        }
        self.modifications
            .lock()
            .unwrap()
            .push((message_id.to_string(), change.clone()));
        Ok(())
    }
}

/// Classifier answering from a table keyed by message id
#[derive(Default)]
pub struct ScriptedClassifier {
    answers: HashMap<String, EmailCategory>,
    failures: HashSet<String>,
    default: Option<EmailCategory>,
    pub calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn always(category: EmailCategory) -> Self {
        Self {
            default: Some(category),
            ..Default::default()
        }
    }

    pub fn answer(mut self, id: &str, category: EmailCategory) -> Self {
        self.answers.insert(id.to_string(), category);
        self
    }

    pub fn fail(mut self, id: &str) -> Self {
        self.failures.insert(id.to_string());
        self
    }
}

#[async_trait]
impl MessageClassifier for ScriptedClassifier {
    async fn classify(&self, message: &MessageMetadata) -> Result<EmailCategory> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.contains(&message.id) {
            return Err(TriageError::ClassificationError(
                "service unavailable".to_string(),
            ));
        }
        Ok(self
            .answers
            .get(&message.id)
            .copied()
            .or(self.default)
            .unwrap_or(EmailCategory::Fyi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", "test@example.com", "Test Subject");
        assert_eq!(msg.id, "msg1");
        assert_eq!(msg.sender_email, "test@example.com");
        assert_eq!(msg.sender, "Test Sender <test@example.com>");
        assert_eq!(msg.subject, "Test Subject");
    }

    #[test]
    fn test_create_labeled_message() {
        let msg = create_labeled_message("msg1", &["Label_1"]);
        assert!(msg.labels.contains(&"Label_1".to_string()));
        assert!(msg.labels.contains(&"INBOX".to_string()));
    }
}
