//! Event store
//!
//! Append-only SQLite table of normalized events, one database per project
//! (`.provtrail/events.db`). Concurrent writers from separate processes rely on
//! SQLite's own locking; a writer waits up to [`BUSY_TIMEOUT`] for another
//! writer's transaction.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::project;
use crate::schema::init_schema;
use crate::session::{generate_session_id, SessionManager};
use crate::time_filter::{format_sortable, parse_time_filter};
use crate::types::{metadata_from_blob, CaptureEvent, Operation, StoreStats, StoredEvent};

/// Maximum stored length of `raw_input`, in characters.
pub const RAW_INPUT_MAX_CHARS: usize = 10_000;

/// Appended to a `raw_input` cut at [`RAW_INPUT_MAX_CHARS`].
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// How long a writer waits for a lock held by another process.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_COLUMNS: &str = "id, timestamp, timestamp_display, session_id, tool_name, file_path,
     operation, diff_summary, raw_input, ai_summary, git_commit_sha, parent_event_id, metadata";

/// Filters for [`EventStore::query`]. Unset filters add no condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Lower time bound, relative ("2 hours ago") or absolute
    pub since: Option<String>,
    /// Upper time bound, same grammar as `since`
    pub until: Option<String>,
    /// File path prefix
    pub file_path: Option<String>,
    pub tool_name: Option<String>,
    pub session_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            file_path: None,
            tool_name: None,
            session_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl EventQuery {
    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn until(mut self, until: impl Into<String>) -> Self {
        self.until = Some(until.into());
        self
    }

    pub fn file_path(mut self, prefix: impl Into<String>) -> Self {
        self.file_path = Some(prefix.into());
        self
    }

    pub fn tool_name(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }

    pub fn session_id(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Where inserted events get their session id from.
#[derive(Debug, Clone)]
enum SessionSource {
    /// Token file in the project marker directory
    Managed(SessionManager),
    /// One id for the lifetime of the store (in-memory databases)
    Fixed(String),
}

/// Handle on one project's event database
pub struct EventStore {
    conn: Connection,
    sessions: SessionSource,
    formatter_command: Option<String>,
}

impl EventStore {
    /// Open (and create if needed) the store of a project root.
    pub fn open(project_root: &Path, config: &Config) -> Result<Self> {
        let dir = project::project_dir(project_root);
        std::fs::create_dir_all(&dir)?;

        let sessions = SessionManager::new(&dir).with_expiry(config.session.expiry());
        let store = Self::open_path(&project::db_path(project_root), sessions)?;
        Ok(store.with_formatter_command(config.display.formatter_command.clone()))
    }

    /// Open a database file with an explicit session manager.
    pub fn open_path(db_path: &Path, sessions: SessionManager) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, SessionSource::Managed(sessions))
    }

    /// In-memory store; every insert shares one generated session id.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, SessionSource::Fixed(generate_session_id()))
    }

    fn from_connection(conn: Connection, sessions: SessionSource) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            sessions,
            formatter_command: None,
        })
    }

    /// Use an external command for `timestamp_display`.
    pub fn with_formatter_command(mut self, command: Option<String>) -> Self {
        self.formatter_command = command;
        self
    }

    /// Session id that the next insert will carry.
    pub fn current_session_id(&self) -> String {
        match &self.sessions {
            SessionSource::Managed(manager) => manager.get_or_create(),
            SessionSource::Fixed(id) => id.clone(),
        }
    }

    /// Persist an event and return its id.
    ///
    /// Assigns timestamps and the session id, caps `raw_input` and serializes
    /// metadata. Write failures are returned to the caller, not retried.
    pub fn insert(&self, event: &CaptureEvent) -> Result<i64> {
        let now = Local::now();
        let timestamp = format_sortable(now.naive_local());
        let timestamp_display = display_timestamp(&now, self.formatter_command.as_deref());
        let session_id = self.current_session_id();

        let raw_input = event.raw_input.as_deref().map(cap_raw_input);
        let metadata = match &event.metadata {
            Some(map) => Some(serde_json::to_string(map)?),
            None => None,
        };

        self.conn.execute(
            "INSERT INTO events (
                timestamp, timestamp_display, session_id, tool_name, file_path,
                operation, diff_summary, raw_input, ai_summary, git_commit_sha,
                parent_event_id, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                timestamp,
                timestamp_display,
                session_id,
                event.tool_name,
                event.file_path,
                event.operation.as_str(),
                event.diff_summary,
                raw_input,
                event.ai_summary,
                event.git_commit_sha,
                event.parent_event_id,
                metadata,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Stored event {} ({} {})", id, event.tool_name, event.operation);
        Ok(id)
    }

    /// Fetch one event by id.
    pub fn get(&self, id: i64) -> Result<Option<StoredEvent>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
        let event = self
            .conn
            .query_row(&sql, [id], row_to_event)
            .optional()?;
        Ok(event)
    }

    /// Query events, most recent first.
    ///
    /// Time bounds that cannot be parsed are dropped rather than failing the
    /// query.
    pub fn query(&self, query: &EventQuery) -> Result<Vec<StoredEvent>> {
        let mut sql = format!("SELECT {} FROM events", EVENT_COLUMNS);
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(since) = query.since.as_deref().and_then(parse_time_filter) {
            conditions.push("timestamp >= ?");
            params.push(Box::new(format_sortable(since)));
        }

        if let Some(until) = query.until.as_deref().and_then(parse_time_filter) {
            conditions.push("timestamp <= ?");
            params.push(Box::new(format_sortable(until)));
        }

        if let Some(prefix) = &query.file_path {
            conditions.push("file_path LIKE ? ESCAPE '\\'");
            params.push(Box::new(format!("{}%", escape_like(prefix))));
        }

        if let Some(tool) = &query.tool_name {
            conditions.push("tool_name = ?");
            params.push(Box::new(tool.clone()));
        }

        if let Some(session) = &query.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session.clone()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
        params.push(Box::new(query.limit as i64));
        params.push(Box::new(query.offset as i64));

        debug!("Query: {} with {} params", sql, params.len());

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let events = stmt
            .query_map(param_refs.as_slice(), row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let total_events: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT tool_name, COUNT(*) AS count FROM events
             GROUP BY tool_name ORDER BY count DESC, tool_name ASC",
        )?;
        let by_tool = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let total_sessions: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT session_id) FROM events",
            [],
            |row| row.get(0),
        )?;

        let unique_files: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT file_path) FROM events WHERE file_path IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let (first_event, last_event): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM events",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStats {
            total_events: total_events as u64,
            by_tool,
            total_sessions: total_sessions as u64,
            unique_files: unique_files as u64,
            first_event,
            last_event,
        })
    }

    /// Events without an AI summary, most recent first.
    pub fn unsummarized(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        let sql = format!(
            "SELECT {} FROM events WHERE ai_summary IS NULL
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let events = stmt
            .query_map([limit as i64], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Store an AI summary. Returns `false` when the event does not exist or
    /// already has one.
    pub fn set_ai_summary(&self, id: i64, summary: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE events SET ai_summary = ?1 WHERE id = ?2 AND ai_summary IS NULL",
            params![summary, id],
        )?;
        Ok(updated == 1)
    }

    /// Get event count
    pub fn event_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let operation: Option<String> = row.get(6)?;
    let metadata: Option<String> = row.get(12)?;

    Ok(StoredEvent {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        timestamp_display: row.get(2)?,
        session_id: row.get(3)?,
        tool_name: row.get(4)?,
        file_path: row.get(5)?,
        operation: operation
            .and_then(|op| op.parse().ok())
            .unwrap_or(Operation::Unknown),
        diff_summary: row.get(7)?,
        raw_input: row.get(8)?,
        ai_summary: row.get(9)?,
        git_commit_sha: row.get(10)?,
        parent_event_id: row.get(11)?,
        metadata: metadata.as_deref().and_then(metadata_from_blob),
    })
}

/// Apply the raw-input cap, appending [`TRUNCATION_MARKER`] when cut.
pub fn cap_raw_input(raw: &str) -> String {
    match raw.char_indices().nth(RAW_INPUT_MAX_CHARS) {
        Some((cut, _)) => format!("{}{}", &raw[..cut], TRUNCATION_MARKER),
        None => raw.to_string(),
    }
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Human-readable timestamp, from the external formatter when configured.
pub fn display_timestamp(now: &DateTime<Local>, formatter_command: Option<&str>) -> String {
    formatter_command
        .and_then(run_formatter)
        .unwrap_or_else(|| now.format("%m/%d/%Y %I:%M %p").to_string())
}

fn run_formatter(command: &str) -> Option<String> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;

    Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_event(path: &str) -> CaptureEvent {
        let mut event = CaptureEvent::new("Write", Operation::Create);
        event.file_path = Some(path.to_string());
        event.diff_summary = Some("+10 lines".to_string());
        event
    }

    #[test]
    fn test_save_and_query() {
        let store = EventStore::open_in_memory().unwrap();

        let id = store.insert(&write_event("test.txt")).unwrap();
        assert!(id > 0);

        let events = store.query(&EventQuery::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool_name, "Write");
        assert_eq!(events[0].operation, Operation::Create);
        assert!(events[0].timestamp_display.is_some());
    }

    #[test]
    fn test_ids_increase() {
        let store = EventStore::open_in_memory().unwrap();
        let a = store.insert(&write_event("a")).unwrap();
        let b = store.insert(&write_event("b")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_cap_raw_input_boundary() {
        let exact = "x".repeat(RAW_INPUT_MAX_CHARS);
        assert_eq!(cap_raw_input(&exact), exact);

        let over = "x".repeat(RAW_INPUT_MAX_CHARS + 1);
        let capped = cap_raw_input(&over);
        assert_eq!(capped, format!("{}{}", exact, TRUNCATION_MARKER));
    }

    #[test]
    fn test_cap_counts_characters_not_bytes() {
        let multibyte = "é".repeat(RAW_INPUT_MAX_CHARS);
        assert_eq!(cap_raw_input(&multibyte), multibyte);
    }

    #[test]
    fn test_unknown_operation_persists_when_inserted() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store.insert(&CaptureEvent::new("Manual", Operation::Unknown)).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().operation, Operation::Unknown);
    }

    #[test]
    fn test_unparseable_bound_is_ignored() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&write_event("a.rs")).unwrap();

        let events = store
            .query(&EventQuery::default().since("not a time").until("whenever"))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_time_bounds() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&write_event("a.rs")).unwrap();

        assert_eq!(store.query(&EventQuery::default().since("1 hour ago")).unwrap().len(), 1);
        assert_eq!(store.query(&EventQuery::default().until("yesterday")).unwrap().len(), 0);
        assert_eq!(store.query(&EventQuery::default().since("now")).unwrap().len(), 0);
    }

    #[test]
    fn test_file_prefix_is_literal() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&write_event("src_old/a.rs")).unwrap();
        store.insert(&write_event("src/b.rs")).unwrap();

        let events = store.query(&EventQuery::default().file_path("src_")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_path.as_deref(), Some("src_old/a.rs"));
    }

    #[test]
    fn test_limit_and_offset_apply_after_ordering() {
        let store = EventStore::open_in_memory().unwrap();
        for name in ["1", "2", "3", "4"] {
            store.insert(&write_event(name)).unwrap();
        }

        let page = store.query(&EventQuery::default().limit(2).offset(1)).unwrap();
        let paths: Vec<_> = page.iter().filter_map(|e| e.file_path.as_deref()).collect();
        assert_eq!(paths, vec!["3", "2"]);
    }

    #[test]
    fn test_stats() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&write_event("a.rs")).unwrap();
        store.insert(&write_event("a.rs")).unwrap();
        store.insert(&CaptureEvent::new("Bash", Operation::Execute)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(
            stats.by_tool,
            vec![("Write".to_string(), 2), ("Bash".to_string(), 1)]
        );
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.unique_files, 1);
        assert!(stats.first_event.unwrap() <= stats.last_event.unwrap());
    }

    #[test]
    fn test_stats_on_empty_store() {
        let store = EventStore::open_in_memory().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_events, 0);
        assert!(stats.by_tool.is_empty());
        assert!(stats.first_event.is_none());
    }

    #[test]
    fn test_ai_summary_set_once() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store.insert(&write_event("a.rs")).unwrap();
        assert_eq!(store.unsummarized(10).unwrap().len(), 1);

        assert!(store.set_ai_summary(id, "Add entry point").unwrap());
        assert!(!store.set_ai_summary(id, "Something else").unwrap());
        assert!(!store.set_ai_summary(id + 100, "Missing").unwrap());

        let event = store.get(id).unwrap().unwrap();
        assert_eq!(event.ai_summary.as_deref(), Some("Add entry point"));
        assert!(store.unsummarized(10).unwrap().is_empty());
    }

    #[test]
    fn test_display_timestamp_falls_back() {
        let now = Local::now();
        let fallback = now.format("%m/%d/%Y %I:%M %p").to_string();
        assert_eq!(display_timestamp(&now, None), fallback);
        assert_eq!(
            display_timestamp(&now, Some("/nonexistent/formatter-binary")),
            fallback
        );
    }

    #[test]
    fn test_formatter_command_sets_display() {
        let store = EventStore::open_in_memory()
            .unwrap()
            .with_formatter_command(Some("echo 01/08/2026 03:54 PM".to_string()));
        let id = store.insert(&write_event("src/a.rs")).unwrap();

        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.timestamp_display.as_deref(), Some("01/08/2026 03:54 PM"));
    }
}
