//! Persistence layer: libSQL-backed storage for follow-ups and meetings.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, FollowupRecord, FollowupUpdate, MeetingRecord};
