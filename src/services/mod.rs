//! External collaborators consumed by the scheduling core.
//!
//! Each collaborator is an async trait so the router and scheduler receive
//! explicitly constructed handles at build time. Production implementations:
//! - `gmail` / `calendar`: Google APIs over reqwest
//! - `llm`: classifier, time extractor and agenda generator over an `LlmProvider`

pub mod calendar;
pub mod gmail;
pub mod google;
pub mod llm;

pub use calendar::GoogleCalendar;
pub use gmail::GmailInbox;
pub use llm::{LlmAgendaGenerator, LlmClassifier, LlmTimeExtractor};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One fetched inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Raw `From` header, e.g. `Jane <jane@x.com>`.
    pub from: String,
    pub subject: String,
    pub snippet: String,
}

impl InboxMessage {
    pub fn new(from: &str, subject: &str, snippet: &str) -> Self {
        Self {
            from: from.to_string(),
            subject: subject.to_string(),
            snippet: snippet.to_string(),
        }
    }
}

/// A listed message whose details could not be fetched.
#[derive(Debug)]
pub struct UnreadableMessage {
    /// Provider message id.
    pub id: String,
    pub error: ServiceError,
}

/// One slot of an inbox listing.
pub type InboxEntry = Result<InboxMessage, UnreadableMessage>;

/// A calendar booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub attendee: String,
    pub summary: String,
    /// Local start time, interpreted in the calendar's configured zone.
    pub start: NaiveDateTime,
    pub duration_minutes: i64,
    pub description: String,
}

/// Source of recent inbox messages.
#[async_trait]
pub trait InboxSource: Send + Sync {
    /// Up to `max_results` most recent messages, newest first. A message
    /// that was listed but could not be read keeps its slot as an error.
    async fn list_recent(&self, max_results: u32) -> Result<Vec<InboxEntry>, ServiceError>;
}

/// Decides whether a message asks for a meeting.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn is_meeting_request(&self, text: &str) -> Result<bool, ServiceError>;
}

/// Pulls a proposed meeting time out of free text.
#[async_trait]
pub trait TimeExtractor: Send + Sync {
    /// `Ok(None)` when the text proposes no time.
    async fn extract_time(&self, text: &str) -> Result<Option<NaiveDateTime>, ServiceError>;
}

/// Produces a short agenda for a meeting request.
#[async_trait]
pub trait AgendaGenerator: Send + Sync {
    async fn summarize_as_agenda(&self, text: &str) -> Result<String, ServiceError>;
}

/// Books calendar events.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn book_event(&self, event: &EventRequest) -> Result<(), ServiceError>;
}
