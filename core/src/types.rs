//! Core data types for provtrail
//!
//! These types are shared between the hook, the CLI and the session-log importer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Small auxiliary facts attached to an event (branch, category, ...).
pub type Metadata = BTreeMap<String, String>;

/// Operations that can be performed on files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Modify,
    Delete,
    Move,
    Copy,
    Commit,
    Execute,
    Unknown,
}

impl Operation {
    /// Return the lowercase string representation used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Commit => "commit",
            Operation::Execute => "execute",
            Operation::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = std::convert::Infallible;

    /// Parsing never fails: anything unrecognized becomes `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "create" => Operation::Create,
            "modify" => Operation::Modify,
            "delete" => Operation::Delete,
            "move" => Operation::Move,
            "copy" => Operation::Copy,
            "commit" => Operation::Commit,
            "execute" => Operation::Execute,
            _ => Operation::Unknown,
        })
    }
}

/// Semantic command categories for shell commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Git,
    Test,
    Build,
    Deploy,
    FileOps,
    Package,
    Unknown,
}

impl CommandCategory {
    /// Return the lowercase string representation used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Git => "git",
            CommandCategory::Test => "test",
            CommandCategory::Build => "build",
            CommandCategory::Deploy => "deploy",
            CommandCategory::FileOps => "file_ops",
            CommandCategory::Package => "package",
            CommandCategory::Unknown => "unknown",
        }
    }
}

/// A normalized code change event, ready for delivery.
///
/// Store-assigned fields (id, timestamps, session) are absent here; see
/// [`StoredEvent`] for the persisted shape.
///
/// # Fields
/// - `tool_name`: Producer that generated the event (Write, Edit, Bash, Codex, ...).
/// - `file_path`: File affected, absent for operations without a single target.
/// - `operation`: Operation type for the change.
/// - `diff_summary`: Short human-readable description ("+12 lines", "a → b").
/// - `raw_input`: Raw tool input or command excerpt.
/// - `ai_summary`: Summary produced later by the summarization path.
/// - `git_commit_sha`: Revision created by a commit.
/// - `parent_event_id`: Causing event, when grouping derived events.
/// - `metadata`: Auxiliary facts, sent and stored as a JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub tool_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub operation: Operation,
    #[serde(default)]
    pub diff_summary: Option<String>,
    #[serde(default)]
    pub raw_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub git_commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<i64>,
    #[serde(default, with = "metadata_blob")]
    pub metadata: Option<Metadata>,
}

impl CaptureEvent {
    /// Create an event with only the producer and operation set.
    pub fn new(tool_name: impl Into<String>, operation: Operation) -> Self {
        Self {
            tool_name: tool_name.into(),
            file_path: None,
            operation,
            diff_summary: None,
            raw_input: None,
            ai_summary: None,
            git_commit_sha: None,
            parent_event_id: None,
            metadata: None,
        }
    }

    /// Insert a metadata entry, creating the map on first use.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
    }

    /// Look up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key).map(String::as_str)
    }
}

/// Event as stored in the database (with ID, timestamps and session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub timestamp: String,
    pub timestamp_display: Option<String>,
    pub session_id: Option<String>,
    pub tool_name: String,
    pub file_path: Option<String>,
    pub operation: Operation,
    pub diff_summary: Option<String>,
    pub raw_input: Option<String>,
    pub ai_summary: Option<String>,
    pub git_commit_sha: Option<String>,
    pub parent_event_id: Option<i64>,
    pub metadata: Option<Metadata>,
}

/// Aggregate statistics over the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_events: u64,
    /// Per-tool counts, highest first.
    pub by_tool: Vec<(String, u64)>,
    pub total_sessions: u64,
    pub unique_files: u64,
    pub first_event: Option<String>,
    pub last_event: Option<String>,
}

/// IPC message from a client to the daemon.
///
/// Messages are serialized to a single JSON line and sent over the Unix socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcMessage {
    /// Capture a code change event
    Capture(CaptureEvent),

    /// Health check
    Ping,
}

/// Response from daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcResponse {
    Ok,
    Error(String),
    Pong { uptime_secs: u64, events_count: u64 },
}

/// Parse a metadata blob as written by any producer.
///
/// Non-string values are rendered as JSON text and nulls are dropped, so
/// blobs written by older daemons still load.
pub fn metadata_from_blob(blob: &str) -> Option<Metadata> {
    let value: serde_json::Value = serde_json::from_str(blob).ok()?;
    let object = value.as_object()?;
    let map: Metadata = object
        .iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k.clone(), s.clone())),
            other => Some((k.clone(), other.to_string())),
        })
        .collect();
    Some(map)
}

/// Serialize metadata as an opaque JSON string, the shape the daemon stores.
mod metadata_blob {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{metadata_from_blob, Metadata};

    pub fn serialize<S: Serializer>(value: &Option<Metadata>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(map) => serde_json::to_string(map)
                .map_err(serde::ser::Error::custom)?
                .serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Metadata>, D::Error> {
        // Accept both the string blob and an inline object.
        let value = Option::<serde_json::Value>::deserialize(d)?;
        Ok(match value {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(blob)) => metadata_from_blob(&blob),
            Some(other) => metadata_from_blob(&other.to_string()),
        })
    }
}
