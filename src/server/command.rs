//! Client commands and their handling.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PipelineError, ProtocolError};
use crate::pipeline::{ClassificationRouter, render_summary};
use crate::services::InboxSource;

/// Reply for anything other than a supported command.
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Try 'get_emails'.";

/// A parsed client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetEmails,
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("get_emails") {
            Ok(Command::GetEmails)
        } else {
            Err(ProtocolError::UnknownCommand(trimmed.to_string()))
        }
    }
}

/// Turns one command into one textual reply.
pub struct Dispatcher {
    inbox: Arc<dyn InboxSource>,
    router: ClassificationRouter,
    batch_size: u32,
}

impl Dispatcher {
    pub fn new(inbox: Arc<dyn InboxSource>, router: ClassificationRouter, batch_size: u32) -> Self {
        Self {
            inbox,
            router,
            batch_size,
        }
    }

    /// Reply to a raw command. Never fails; errors become the reply text.
    pub async fn handle(&self, raw: &str) -> String {
        match raw.parse::<Command>() {
            Ok(Command::GetEmails) => match self.get_emails().await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(error = %e, "get_emails failed");
                    format!("Error: {e}")
                }
            },
            Err(e) => {
                tracing::info!(error = %e, "Rejected client command");
                UNKNOWN_COMMAND_REPLY.to_string()
            }
        }
    }

    async fn get_emails(&self) -> Result<String, PipelineError> {
        let entries = self
            .inbox
            .list_recent(self.batch_size)
            .await
            .map_err(PipelineError::InboxFetch)?;
        tracing::info!(count = entries.len(), "Routing inbox batch");

        let lines = self.router.route_batch(entries).await;
        Ok(render_summary(&lines))
    }
}
