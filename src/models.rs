use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TriageError;

/// The fixed set of triage categories.
///
/// Each category has a symbolic token (what the language model is asked to
/// reply with) and a label name (what the user sees in Gmail).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailCategory {
    ToReply,
    Fyi,
    Comment,
    Notification,
    MeetingUpdate,
    AwaitingReply,
    Actioned,
    Marketing,
    Receipt,
    Newsletter,
}

impl EmailCategory {
    pub const ALL: [EmailCategory; 10] = [
        EmailCategory::ToReply,
        EmailCategory::Fyi,
        EmailCategory::Comment,
        EmailCategory::Notification,
        EmailCategory::MeetingUpdate,
        EmailCategory::AwaitingReply,
        EmailCategory::Actioned,
        EmailCategory::Marketing,
        EmailCategory::Receipt,
        EmailCategory::Newsletter,
    ];

    /// Token the classifier is expected to answer with
    pub fn as_token(&self) -> &'static str {
        match self {
            EmailCategory::ToReply => "TO_REPLY",
            EmailCategory::Fyi => "FYI",
            EmailCategory::Comment => "COMMENT",
            EmailCategory::Notification => "NOTIFICATION",
            EmailCategory::MeetingUpdate => "MEETING_UPDATE",
            EmailCategory::AwaitingReply => "AWAITING_REPLY",
            EmailCategory::Actioned => "ACTIONED",
            EmailCategory::Marketing => "MARKETING",
            EmailCategory::Receipt => "RECEIPT",
            EmailCategory::Newsletter => "NEWSLETTER",
        }
    }

    /// Gmail label name for this category
    pub fn label_name(&self) -> &'static str {
        match self {
            EmailCategory::ToReply => "To Reply",
            EmailCategory::Fyi => "FYI",
            EmailCategory::Comment => "Comment",
            EmailCategory::Notification => "Notification",
            EmailCategory::MeetingUpdate => "Meeting Update",
            EmailCategory::AwaitingReply => "Awaiting Reply",
            EmailCategory::Actioned => "Actioned",
            EmailCategory::Marketing => "Marketing",
            EmailCategory::Receipt => "Receipt",
            EmailCategory::Newsletter => "Newsletter",
        }
    }

    /// One-line definition used in the classification prompt
    pub fn description(&self) -> &'static str {
        match self {
            EmailCategory::ToReply => "a person is waiting for a reply or decision from me",
            EmailCategory::Fyi => "informational, worth knowing but needs no action",
            EmailCategory::Comment => "a comment or mention in a shared document, ticket or thread",
            EmailCategory::Notification => "an automated alert or status update from a tool or service",
            EmailCategory::MeetingUpdate => "a calendar invite, reschedule, cancellation or meeting notes",
            EmailCategory::AwaitingReply => "I asked something and am waiting on the other party",
            EmailCategory::Actioned => "the request has already been handled or the thread is resolved",
            EmailCategory::Marketing => "promotions, sales, offers or cold outreach",
            EmailCategory::Receipt => "an order confirmation, invoice, receipt or payment notice",
            EmailCategory::Newsletter => "a newsletter, digest or subscription content",
        }
    }

    /// Case-insensitive lookup by Gmail label name
    pub fn from_label_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.label_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Label names of every managed category, in category order
    pub fn label_names() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(|category| category.label_name())
    }
}

impl fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for EmailCategory {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_token() == normalized)
            .ok_or_else(|| TriageError::ClassificationError(format!("Unknown category '{}'", s.trim())))
    }
}

/// Which part of the mailbox a run covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only messages currently in the inbox
    #[default]
    Inbox,
    /// The whole mailbox except spam and trash
    All,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Inbox => f.write_str("inbox"),
            Scope::All => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: String,
    /// Raw `From` header value
    pub sender: String,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    /// Short preview text supplied by Gmail
    pub snippet: String,
    pub date_received: DateTime<Utc>,
    pub labels: Vec<String>,
}

/// Label info returned from Gmail API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedMessage {
    pub message: MessageMetadata,
    pub category: EmailCategory,
}

/// Outcome of one page of work
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchResult {
    /// Messages that were successfully hydrated
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub results: Vec<ClassifiedMessage>,
    pub next_page_token: Option<String>,
}

/// Running totals across every batch of a run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatistics {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub batches: usize,
}

impl RunStatistics {
    /// Fold one batch's counters into the running totals
    pub fn absorb(&mut self, batch: &BatchResult) {
        self.total += batch.total;
        self.processed += batch.processed;
        self.skipped += batch.skipped;
        self.errors += batch.errors;
        self.batches += 1;
    }
}
