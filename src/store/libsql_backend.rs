//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    Database, FollowupRecord, FollowupUpdate, MEETING_TIME_FORMAT, MeetingRecord,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// every write below is a single statement, so each is atomic on its own.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite/ISO naive datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // RFC 3339 is our canonical write format
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return ndt.and_utc();
        }
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse a stored meeting time. Seconds may be absent in imported rows.
fn parse_meeting_time(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, MEETING_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| DatabaseError::Query(format!("bad meeting_time {s:?}: {e}")))
}

/// Map a libsql Row to a FollowupRecord.
///
/// Column order matches FOLLOWUP_COLUMNS:
/// 0:email, 1:name, 2:context, 3:attempt, 4:last_sent
fn row_to_followup(row: &libsql::Row) -> Result<FollowupRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("followup row parse: {e}"));
    let attempt: i64 = row.get(3).map_err(read)?;
    let last_sent: String = row.get(4).map_err(read)?;

    Ok(FollowupRecord {
        email: row.get(0).map_err(read)?,
        name: row.get(1).map_err(read)?,
        context: row.get(2).map_err(read)?,
        attempt: u32::try_from(attempt).unwrap_or(1).max(1),
        last_sent: parse_datetime(&last_sent),
    })
}

/// Map a libsql Row to a MeetingRecord.
///
/// Column order matches MEETING_COLUMNS:
/// 0:id, 1:email, 2:name, 3:content, 4:meeting_time, 5:scheduled, 6:created_at
fn row_to_meeting(row: &libsql::Row) -> Result<MeetingRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("meeting row parse: {e}"));
    let id_str: String = row.get(0).map_err(read)?;
    let meeting_time: String = row.get(4).map_err(read)?;
    let scheduled: i64 = row.get(5).map_err(read)?;
    let created_str: String = row.get(6).map_err(read)?;

    Ok(MeetingRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        email: row.get(1).map_err(read)?,
        name: row.get(2).map_err(read)?,
        content: row.get(3).map_err(read)?,
        meeting_time: parse_meeting_time(&meeting_time)?,
        scheduled: scheduled != 0,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const FOLLOWUP_COLUMNS: &str = "email, name, context, attempt, last_sent";

const MEETING_COLUMNS: &str = "id, email, name, content, meeting_time, scheduled, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Follow-ups ──────────────────────────────────────────────────

    async fn get_followup(&self, email: &str) -> Result<Option<FollowupRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FOLLOWUP_COLUMNS} FROM followups WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("get_followup", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_followup(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::from_libsql("get_followup", e)),
        }
    }

    async fn advance_followup(
        &self,
        email: &str,
        name: &str,
        context: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<FollowupUpdate, DatabaseError> {
        // The conflict branch only fires below the ceiling; at the ceiling
        // nothing is written and RETURNING yields no row.
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO followups (email, name, context, attempt, last_sent)
                     VALUES (?1, ?2, ?3, 1, ?4)
                     ON CONFLICT(email) DO UPDATE SET
                        attempt = followups.attempt + 1,
                        last_sent = excluded.last_sent
                     WHERE followups.attempt < ?5
                     RETURNING {FOLLOWUP_COLUMNS}"
                ),
                params![email, name, context, now.to_rfc3339(), i64::from(max_attempts)],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("advance_followup", e))?;

        let returned = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_libsql("advance_followup", e))?;

        if let Some(row) = returned {
            let record = row_to_followup(&row)?;
            debug!(email = %record.email, attempt = record.attempt, "Follow-up advanced in DB");
            return Ok(FollowupUpdate {
                record,
                advanced: true,
            });
        }
        drop(rows);

        let record = self.get_followup(email).await?.ok_or_else(|| {
            DatabaseError::Query(format!("advance_followup: no row for {email} after upsert"))
        })?;
        debug!(email = %record.email, attempt = record.attempt, "Follow-up at ceiling, unchanged");
        Ok(FollowupUpdate {
            record,
            advanced: false,
        })
    }

    async fn list_followups(&self) -> Result<Vec<FollowupRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FOLLOWUP_COLUMNS} FROM followups ORDER BY last_sent DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("list_followups", e))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_followup(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping follow-up row: {e}");
                }
            }
        }
        Ok(records)
    }

    // ── Meetings ────────────────────────────────────────────────────

    async fn insert_meeting(&self, meeting: &MeetingRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO meetings (id, email, name, content, meeting_time, scheduled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    meeting.id.to_string(),
                    meeting.email.as_str(),
                    meeting.name.as_str(),
                    meeting.content.as_str(),
                    meeting.meeting_time_str(),
                    i64::from(meeting.scheduled),
                    meeting.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("insert_meeting", e))?;

        debug!(id = %meeting.id, email = %meeting.email, "Meeting inserted into DB");
        Ok(())
    }

    async fn list_meetings_for(&self, email: &str) -> Result<Vec<MeetingRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEETING_COLUMNS} FROM meetings WHERE email = ?1 ORDER BY meeting_time ASC"
                ),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("list_meetings_for", e))?;

        let mut meetings = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_meeting(&row) {
                Ok(meeting) => meetings.push(meeting),
                Err(e) => {
                    tracing::warn!("Skipping meeting row: {e}");
                }
            }
        }
        Ok(meetings)
    }

    async fn count_meetings(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM meetings", ())
            .await
            .map_err(|e| DatabaseError::from_libsql("count_meetings", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_meetings: {e}")))?;
                Ok(count.max(0) as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::from_libsql("count_meetings", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // ── Follow-up tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn advance_creates_record_at_attempt_one() {
        let db = test_db().await;
        let now = Utc::now();

        let update = db
            .advance_followup("bob@x.com", "Bob", "About the quote", 4, now)
            .await
            .unwrap();

        assert!(update.advanced);
        assert_eq!(update.record.attempt, 1);
        assert_eq!(update.record.name, "Bob");
        assert_eq!(update.record.context, "About the quote");

        let fetched = db.get_followup("bob@x.com").await.unwrap().unwrap();
        assert_eq!(fetched, update.record);
    }

    #[tokio::test]
    async fn advance_increments_until_ceiling() {
        let db = test_db().await;
        let mut attempts = Vec::new();
        for _ in 0..6 {
            let update = db
                .advance_followup("bob@x.com", "Bob", "ctx", 4, Utc::now())
                .await
                .unwrap();
            attempts.push(update.record.attempt);
        }
        assert_eq!(attempts, vec![1, 2, 3, 4, 4, 4]);
    }

    #[tokio::test]
    async fn advance_at_ceiling_leaves_last_sent_alone() {
        let db = test_db().await;
        let start = Utc::now() - Duration::hours(1);
        for i in 0..4 {
            db.advance_followup("bob@x.com", "Bob", "ctx", 4, start + Duration::minutes(i))
                .await
                .unwrap();
        }
        let before = db.get_followup("bob@x.com").await.unwrap().unwrap();

        let update = db
            .advance_followup("bob@x.com", "Bob", "ctx", 4, Utc::now())
            .await
            .unwrap();

        assert!(!update.advanced);
        assert_eq!(update.record.attempt, 4);
        assert_eq!(update.record.last_sent, before.last_sent);
    }

    #[tokio::test]
    async fn advance_keeps_first_name_and_context() {
        let db = test_db().await;
        db.advance_followup("bob@x.com", "Bob", "first", 4, Utc::now())
            .await
            .unwrap();
        let update = db
            .advance_followup("bob@x.com", "Robert", "second", 4, Utc::now())
            .await
            .unwrap();
        assert_eq!(update.record.attempt, 2);
        assert_eq!(update.record.name, "Bob");
        assert_eq!(update.record.context, "first");
    }

    #[tokio::test]
    async fn get_followup_not_found() {
        let db = test_db().await;
        assert!(db.get_followup("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_followups_returns_each_correspondent_once() {
        let db = test_db().await;
        for email in ["a@x.com", "b@x.com", "a@x.com"] {
            db.advance_followup(email, "N", "ctx", 4, Utc::now())
                .await
                .unwrap();
        }
        let all = db.list_followups().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    // ── Meeting tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_list_meetings() {
        let db = test_db().await;
        let meeting = MeetingRecord::new("jane@x.com", "Jane", "Can we meet?", at(2024, 6, 4, 15, 0));

        db.insert_meeting(&meeting).await.unwrap();

        let fetched = db.list_meetings_for("jane@x.com").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, meeting.id);
        assert_eq!(fetched[0].meeting_time_str(), "2024-06-04T15:00:00");
        assert!(fetched[0].scheduled);
    }

    #[tokio::test]
    async fn repeated_meetings_are_not_deduplicated() {
        let db = test_db().await;
        for hour in [9, 10] {
            let meeting = MeetingRecord::new("jane@x.com", "Jane", "again", at(2024, 6, 4, hour, 0));
            db.insert_meeting(&meeting).await.unwrap();
        }
        assert_eq!(db.count_meetings().await.unwrap(), 2);
        let listed = db.list_meetings_for("jane@x.com").await.unwrap();
        assert_eq!(listed[0].meeting_time.format("%H").to_string(), "09");
    }

    #[tokio::test]
    async fn count_meetings_empty() {
        let db = test_db().await;
        assert_eq!(db.count_meetings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("followups.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.advance_followup("bob@x.com", "Bob", "ctx", 4, Utc::now())
            .await
            .unwrap();
        drop(db);

        let reopened = LibSqlBackend::new_local(&db_path).await.unwrap();
        let record = reopened.get_followup("bob@x.com").await.unwrap().unwrap();
        assert_eq!(record.attempt, 1);
    }

    #[test]
    fn parse_datetime_accepts_naive_iso() {
        let dt = parse_datetime("2024-06-01T10:00:00.123456");
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-06-01 10:00");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
