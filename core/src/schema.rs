//! Database schema and migrations for provtrail
//!
//! Migrations are additive only: tables and columns are created when missing,
//! nothing is ever dropped or retyped.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Columns added after the first release, with their SQL type.
const ADDED_COLUMNS: &[(&str, &str)] = &[("timestamp_display", "TEXT")];

/// Initialize or migrate the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// V1: events table with the full column set and lookup indexes
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            timestamp_display TEXT,
            session_id TEXT,
            tool_name TEXT NOT NULL,
            file_path TEXT,
            operation TEXT,
            diff_summary TEXT,
            raw_input TEXT,
            ai_summary TEXT,
            git_commit_sha TEXT,
            parent_event_id INTEGER,
            metadata TEXT,
            FOREIGN KEY (parent_event_id) REFERENCES events(id)
        );

        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_file_path ON events(file_path);
        CREATE INDEX IF NOT EXISTS idx_events_session_id ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_tool_name ON events(tool_name);",
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}

/// V2: add columns missing from tables created by older releases
fn migrate_v2(conn: &Connection) -> Result<()> {
    let existing = event_columns(conn)?;

    for (column, sql_type) in ADDED_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            conn.execute(
                &format!("ALTER TABLE events ADD COLUMN {} {}", column, sql_type),
                [],
            )?;
        }
    }

    set_schema_version(conn, 2)?;
    Ok(())
}

/// Column names of the events table.
pub fn event_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(events)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_init() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"events".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='events'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for idx in [
            "idx_events_timestamp",
            "idx_events_file_path",
            "idx_events_session_id",
            "idx_events_tool_name",
        ] {
            assert!(indexes.contains(&idx.to_string()), "missing {}", idx);
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_legacy_table_gains_display_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE events (
                id INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                session_id TEXT,
                tool_name TEXT NOT NULL,
                file_path TEXT,
                operation TEXT,
                diff_summary TEXT,
                raw_input TEXT,
                ai_summary TEXT,
                git_commit_sha TEXT,
                parent_event_id INTEGER,
                metadata TEXT
            );
            INSERT INTO events (timestamp, tool_name) VALUES ('2025-01-01T00:00:00', 'Write');",
        )
        .unwrap();

        init_schema(&conn).unwrap();

        assert!(event_columns(&conn)
            .unwrap()
            .contains(&"timestamp_display".to_string()));
        let display: Option<String> = conn
            .query_row("SELECT timestamp_display FROM events WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert!(display.is_none());
    }
}
