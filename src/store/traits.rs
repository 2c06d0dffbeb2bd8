//! `Database` trait: single async interface for follow-up and meeting persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Storage format for `MeetingRecord::meeting_time`.
pub const MEETING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Follow-up progress for one correspondent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupRecord {
    /// Normalized correspondent address.
    pub email: String,
    pub name: String,
    /// Snippet the follow-up messages are generated from.
    pub context: String,
    /// Escalation step, starting at 1.
    pub attempt: u32,
    pub last_sent: DateTime<Utc>,
}

/// Result of one atomic follow-up upsert.
#[derive(Debug, Clone)]
pub struct FollowupUpdate {
    pub record: FollowupRecord,
    /// False when the record was already at the ceiling and left untouched.
    pub advanced: bool,
}

/// A booked meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Source snippet the meeting was requested in.
    pub content: String,
    /// Start time, naive local calendar time.
    pub meeting_time: NaiveDateTime,
    pub scheduled: bool,
    pub created_at: DateTime<Utc>,
}

impl MeetingRecord {
    pub fn new(email: &str, name: &str, content: &str, meeting_time: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            meeting_time,
            scheduled: true,
            created_at: Utc::now(),
        }
    }

    /// `meeting_time` in its stored form, e.g. `2024-06-04T15:00:00`.
    pub fn meeting_time_str(&self) -> String {
        self.meeting_time.format(MEETING_TIME_FORMAT).to_string()
    }
}

/// Backend-agnostic database trait covering follow-ups and meetings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Follow-ups ──────────────────────────────────────────────────

    /// Look up the follow-up record for a correspondent.
    async fn get_followup(&self, email: &str) -> Result<Option<FollowupRecord>, DatabaseError>;

    /// Create the record at attempt 1, or increment it while below
    /// `max_attempts`, in one atomic statement. At the ceiling the stored
    /// record is returned unchanged.
    async fn advance_followup(
        &self,
        email: &str,
        name: &str,
        context: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<FollowupUpdate, DatabaseError>;

    /// All follow-up records, most recently sent first.
    async fn list_followups(&self) -> Result<Vec<FollowupRecord>, DatabaseError>;

    // ── Meetings ────────────────────────────────────────────────────

    /// Persist a booked meeting.
    async fn insert_meeting(&self, meeting: &MeetingRecord) -> Result<(), DatabaseError>;

    /// Meetings booked with a correspondent, earliest first.
    async fn list_meetings_for(&self, email: &str) -> Result<Vec<MeetingRecord>, DatabaseError>;

    /// Total number of booked meetings.
    async fn count_meetings(&self) -> Result<usize, DatabaseError>;
}
