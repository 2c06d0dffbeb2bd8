//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! A pre-migration database (tables present, no `_migrations` table, no
//! uniqueness on `followups.email`) is detected and its rows are folded into
//! the V1 schema, one follow-up row per correspondent.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS followups (
                email TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                context TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 1 CHECK (attempt >= 1),
                last_sent TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                meeting_time TEXT NOT NULL,
                scheduled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_meetings_email ON meetings(email);
            CREATE INDEX IF NOT EXISTS idx_meetings_time ON meetings(meeting_time);
            CREATE INDEX IF NOT EXISTS idx_followups_last_sent ON followups(last_sent);
        "#,
    },
];

/// Upper bound applied to attempts carried over from a legacy database.
const LEGACY_ATTEMPT_CEILING: i64 = 4;

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    // Legacy tables have to be moved aside before V1 can create the keyed ones.
    let legacy = current_version == 0 && table_exists(conn, "followups").await?;
    let legacy_meetings = current_version == 0 && table_exists(conn, "meetings").await?;
    if legacy {
        rename_table(conn, "followups", "followups_legacy").await?;
    }
    if legacy_meetings {
        rename_table(conn, "meetings", "meetings_legacy").await?;
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    if legacy {
        import_legacy_followups(conn).await?;
    }
    if legacy_meetings {
        import_legacy_meetings(conn).await?;
    }
    if legacy || legacy_meetings {
        tracing::info!("Legacy database detected, imported follow-ups and meetings");
    }

    if tracing::enabled!(tracing::Level::INFO) {
        let version = get_current_version(conn).await?;
        tracing::info!(version = version, "Database migrations complete");
    }
    Ok(())
}

async fn rename_table(conn: &Connection, from: &str, to: &str) -> Result<(), DatabaseError> {
    conn.execute(&format!("ALTER TABLE {from} RENAME TO {to}"), ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to set aside legacy table {from}: {e}")))?;
    Ok(())
}

/// Copy legacy follow-ups, collapsing duplicate rows per correspondent into one.
async fn import_legacy_followups(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO followups (email, name, context, attempt, last_sent)
         SELECT lower(trim(email)),
                COALESCE(name, ''),
                COALESCE(context, ''),
                max(min(max(COALESCE(attempt, 1)), ?1), 1),
                COALESCE(max(last_sent), datetime('now'))
         FROM followups_legacy
         WHERE email IS NOT NULL AND trim(email) != ''
         GROUP BY lower(trim(email))",
        libsql::params![LEGACY_ATTEMPT_CEILING],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to import legacy follow-ups: {e}")))?;

    conn.execute("DROP TABLE followups_legacy", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to drop legacy follow-ups: {e}")))?;
    Ok(())
}

/// Copy legacy meetings that were actually booked.
async fn import_legacy_meetings(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "INSERT INTO meetings (id, email, name, content, meeting_time, scheduled, created_at)
         SELECT lower(hex(randomblob(16))),
                lower(trim(email)),
                COALESCE(name, ''),
                COALESCE(content, ''),
                meeting_time,
                1,
                datetime('now')
         FROM meetings_legacy
         WHERE email IS NOT NULL AND meeting_time IS NOT NULL AND scheduled = 1;
         DROP TABLE meetings_legacy;",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to import legacy meetings: {e}")))?;

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

async fn table_exists(conn: &Connection, table: &str) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            libsql::params![table],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check table {table}: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read table check: {e}")))?;

    match row {
        Some(row) => {
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count > 0)
        }
        None => Ok(false),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
