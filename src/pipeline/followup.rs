//! Followup tracker: advances a correspondent's escalation step.
//!
//! Each correspondent key is serialized twice: by an in-process async lock
//! held across the store call, and by the store's atomic upsert. Different
//! keys proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::DatabaseError;
use crate::pipeline::escalation::{MAX_ATTEMPTS, select_message};
use crate::store::Database;

/// Result of one follow-up step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupOutcome {
    /// Rendered escalation message.
    pub message: String,
    /// Attempt the message corresponds to.
    pub attempt: u32,
    /// False when the correspondent was already at the ceiling.
    pub advanced: bool,
}

pub struct FollowupTracker {
    db: Arc<dyn Database>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FollowupTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create or advance the record for `email` and render its message.
    ///
    /// The message uses the `name` and `context` of the current email; the
    /// stored record keeps the values from the first follow-up.
    pub async fn advance(
        &self,
        email: &str,
        name: &str,
        context: &str,
    ) -> Result<FollowupOutcome, DatabaseError> {
        let key_lock = self.key_lock(email).await;
        let result = {
            let _guard = key_lock.lock().await;
            self.advance_with_retry(email, name, context).await
        };
        self.release_key(email, key_lock).await;

        let update = result?;
        let attempt = update.record.attempt;
        if update.advanced {
            tracing::info!(email = %email, attempt, "Follow-up advanced");
        } else {
            tracing::info!(email = %email, attempt, "Follow-up at ceiling, repeating final notice");
        }

        Ok(FollowupOutcome {
            message: select_message(name, context, attempt),
            attempt,
            advanced: update.advanced,
        })
    }

    async fn advance_with_retry(
        &self,
        email: &str,
        name: &str,
        context: &str,
    ) -> Result<crate::store::FollowupUpdate, DatabaseError> {
        match self
            .db
            .advance_followup(email, name, context, MAX_ATTEMPTS, Utc::now())
            .await
        {
            Err(e) if e.is_contention() => {
                tracing::warn!(email = %email, error = %e, "Store contention, retrying follow-up once");
                self.db
                    .advance_followup(email, name, context, MAX_ATTEMPTS, Utc::now())
                    .await
            }
            other => other,
        }
    }

    async fn key_lock(&self, email: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other task holds or waits on it.
    async fn release_key(&self, email: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(email);
        }
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.key_locks.lock().await.len()
    }
}
