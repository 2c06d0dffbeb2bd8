//! Classification router: one inbox message in, one outcome line out.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::followup::{FollowupOutcome, FollowupTracker};
use crate::pipeline::meeting::{ConfirmationSummary, MeetingScheduler};
use crate::services::{InboxEntry, InboxMessage, IntentClassifier};

/// Reply sent when the inbox listing is empty.
pub const NO_EMAILS: &str = "No emails found.";

/// `From`/`Subject` shown for a message that could not be read.
pub const UNKNOWN_HEADER: &str = "(unknown)";

/// Correspondent identity parsed from a `From` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Trimmed, ASCII-lowercased address.
    pub email: String,
    pub name: String,
}

/// Parse `Name <email>` or a bare address.
///
/// An empty display name falls back to the address. A header with `<` but
/// no closing `>` is used whole as both address and name.
pub fn parse_sender(from: &str) -> Sender {
    let from = from.trim();
    let Some(open) = from.find('<') else {
        let email = normalize_email(from);
        return Sender {
            name: email.clone(),
            email,
        };
    };

    let rest = &from[open + 1..];
    match rest.find('>') {
        Some(close) if !rest[..close].trim().is_empty() => {
            let email = normalize_email(&rest[..close]);
            let display = from[..open].trim().trim_matches('"').trim();
            let name = if display.is_empty() {
                email.clone()
            } else {
                display.to_string()
            };
            Sender { email, name }
        }
        _ => {
            tracing::warn!(from = %from, "Malformed sender header, using it whole");
            Sender {
                email: normalize_email(from),
                name: from.to_string(),
            }
        }
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// What happened to one message.
#[derive(Debug)]
pub enum Outcome {
    MeetingScheduled(ConfirmationSummary),
    FollowupQueued(FollowupOutcome),
    Failed(PipelineError),
}

impl Outcome {
    fn describe(&self) -> String {
        match self {
            Outcome::MeetingScheduled(summary) => summary.body.clone(),
            Outcome::FollowupQueued(followup) => {
                format!("Follow-up #{}\n{}", followup.attempt, followup.message)
            }
            Outcome::Failed(e) => format!("Error: {e}"),
        }
    }
}

/// Summary entry for one routed message.
#[derive(Debug)]
pub struct OutcomeLine {
    pub from: String,
    pub subject: String,
    pub outcome: Outcome,
}

impl OutcomeLine {
    /// Render as the `index`th (1-based) entry of a reply.
    pub fn render(&self, index: usize) -> String {
        format!(
            "Email {index}:\nFrom: {}\nSubject: {}\nOutcome: {}\n",
            self.from,
            self.subject,
            self.outcome.describe()
        )
    }
}

/// Join rendered entries, separated by a blank line.
pub fn render_summary(lines: &[OutcomeLine]) -> String {
    if lines.is_empty() {
        return NO_EMAILS.to_string();
    }
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| line.render(i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ClassificationRouter {
    classifier: Arc<dyn IntentClassifier>,
    scheduler: MeetingScheduler,
    tracker: FollowupTracker,
}

impl ClassificationRouter {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        scheduler: MeetingScheduler,
        tracker: FollowupTracker,
    ) -> Self {
        Self {
            classifier,
            scheduler,
            tracker,
        }
    }

    /// Classify one message and schedule a meeting or advance its follow-up.
    pub async fn route(&self, message: &InboxMessage) -> OutcomeLine {
        let sender = parse_sender(&message.from);
        let outcome = self.dispatch(&sender, &message.snippet).await;
        if let Outcome::Failed(e) = &outcome {
            tracing::warn!(email = %sender.email, error = %e, "Message routing failed");
        }
        OutcomeLine {
            from: message.from.clone(),
            subject: message.subject.clone(),
            outcome,
        }
    }

    /// Route entries one after another, in listing order. An unreadable
    /// message becomes an error line in its place.
    pub async fn route_batch(&self, entries: Vec<InboxEntry>) -> Vec<OutcomeLine> {
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = match entry {
                Ok(message) => self.route(&message).await,
                Err(unreadable) => OutcomeLine {
                    from: UNKNOWN_HEADER.to_string(),
                    subject: UNKNOWN_HEADER.to_string(),
                    outcome: Outcome::Failed(PipelineError::MessageFetch {
                        id: unreadable.id,
                        source: unreadable.error,
                    }),
                },
            };
            lines.push(line);
        }
        lines
    }

    async fn dispatch(&self, sender: &Sender, snippet: &str) -> Outcome {
        let wants_meeting = match self.classifier.is_meeting_request(snippet).await {
            Ok(verdict) => verdict,
            Err(e) => return Outcome::Failed(PipelineError::Classification(e)),
        };
        tracing::info!(email = %sender.email, wants_meeting, "Message classified");

        if wants_meeting {
            match self
                .scheduler
                .schedule(&sender.email, &sender.name, snippet)
                .await
            {
                Ok(summary) => Outcome::MeetingScheduled(summary),
                Err(e) => Outcome::Failed(e),
            }
        } else {
            match self
                .tracker
                .advance(&sender.email, &sender.name, snippet)
                .await
            {
                Ok(followup) => Outcome::FollowupQueued(followup),
                Err(source) => Outcome::Failed(PipelineError::Followup {
                    email: sender.email.clone(),
                    source,
                }),
            }
        }
    }
}
