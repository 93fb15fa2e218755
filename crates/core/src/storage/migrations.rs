//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Member registry
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                external_chat_id TEXT UNIQUE,
                roles TEXT NOT NULL DEFAULT '',
                classes TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Meetings; hoster columns are written once
            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                is_active INTEGER NOT NULL DEFAULT 1,
                hoster_member_id TEXT,
                hoster_display_name TEXT,
                hoster_chat_id TEXT,
                hoster_role TEXT,
                hoster_class TEXT,
                hoster_score INTEGER,
                hoster_selected_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Roster snapshots, independent of the live member record
            CREATE TABLE IF NOT EXISTS meeting_participants (
                meeting_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                external_chat_id TEXT,
                role TEXT NOT NULL,
                class TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (meeting_id, member_id),
                FOREIGN KEY (meeting_id) REFERENCES meetings(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS meeting_guests (
                meeting_id TEXT NOT NULL,
                guest_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                external_chat_id TEXT,
                roles TEXT NOT NULL DEFAULT '',
                classes TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL,
                class TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (meeting_id, guest_id),
                FOREIGN KEY (meeting_id) REFERENCES meetings(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS join_requests (
                id TEXT PRIMARY KEY,
                meeting_id TEXT NOT NULL,
                external_chat_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                requested_role TEXT NOT NULL,
                requested_class TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                requested_at TEXT NOT NULL,
                processed_at TEXT,
                processed_by TEXT,
                reason TEXT,
                FOREIGN KEY (meeting_id) REFERENCES meetings(id) ON DELETE CASCADE
            );

            -- Score ledger
            CREATE TABLE IF NOT EXISTS score_records (
                member_id TEXT PRIMARY KEY,
                external_chat_id TEXT,
                display_name TEXT NOT NULL,
                balance INTEGER NOT NULL DEFAULT 100 CHECK (balance >= 0),
                meetings_credited INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL,
                FOREIGN KEY (member_id) REFERENCES members(id)
            );

            -- Append-only audit trail
            CREATE TABLE IF NOT EXISTS score_modifications (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                member_id TEXT NOT NULL,
                delta INTEGER NOT NULL,
                balance_before INTEGER NOT NULL,
                balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
                reason TEXT NOT NULL,
                actor TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (member_id) REFERENCES score_records(member_id)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes and admission constraints",
        sql: r#"
            -- At most one pending request per requester per meeting
            CREATE UNIQUE INDEX IF NOT EXISTS idx_join_requests_one_pending
                ON join_requests(meeting_id, external_chat_id) WHERE status = 'pending';
            CREATE INDEX IF NOT EXISTS idx_join_requests_meeting ON join_requests(meeting_id);

            -- Recency queries
            CREATE INDEX IF NOT EXISTS idx_meetings_active_created ON meetings(is_active, created_at);

            -- Roster lookups
            CREATE INDEX IF NOT EXISTS idx_participants_meeting ON meeting_participants(meeting_id, position);
            CREATE INDEX IF NOT EXISTS idx_guests_meeting ON meeting_guests(meeting_id, position);

            -- Leaderboard
            CREATE INDEX IF NOT EXISTS idx_scores_leaderboard ON score_records(balance DESC, meetings_credited DESC);
            CREATE INDEX IF NOT EXISTS idx_scores_chat ON score_records(external_chat_id);
            CREATE INDEX IF NOT EXISTS idx_modifications_member ON score_modifications(member_id, seq);
        "#,
    },
];

/// Initialize the migrations tracking table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(crate) fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }
}
