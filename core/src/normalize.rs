//! Event normalization
//!
//! Every producer (hook payloads, agent session logs, manual CLI capture) is
//! first turned into a [`RawInput`] variant, then [`normalize`] maps it to zero
//! or more [`CaptureEvent`]s. An empty result means "do not record".

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::classify::{classify_command, command_category};
use crate::patch::{parse_patch, BEGIN_PATCH_MARKER};
use crate::types::{CaptureEvent, Operation};

/// Producer name for events imported from agent session logs.
pub const SESSION_LOG_TOOL: &str = "Codex";

/// Excerpt length kept for written content and commands.
const RAW_EXCERPT_CHARS: usize = 500;
/// Excerpt length kept for each side of an edit.
const EDIT_EXCERPT_CHARS: usize = 100;
/// Fallback detail length for unclassified session-log commands.
const COMMAND_DETAIL_CHARS: usize = 100;

// ============================================================================
// HOOK INPUT
// ============================================================================

/// Payload supplied by the host hook runtime on stdin.
///
/// Missing structure degrades to empty defaults instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default, alias = "tool")]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default, alias = "tool_output")]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl HookInput {
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    fn input_str(&self, key: &str) -> String {
        self.tool_input
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn result_text(&self) -> Option<String> {
        match self.tool_result.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Map the payload to its producer variant.
    pub fn into_raw(self) -> RawInput {
        match self.tool_name.as_str() {
            "Write" => RawInput::Write {
                file_path: self.input_str("file_path"),
                content: self.input_str("content"),
                tool_result: self.result_text(),
            },
            "Edit" => RawInput::Edit {
                file_path: self.input_str("file_path"),
                old_string: self.input_str("old_string"),
                new_string: self.input_str("new_string"),
            },
            "Bash" => RawInput::Bash {
                command: self.input_str("command"),
            },
            _ => RawInput::Unrecognized {
                tool_name: self.tool_name,
            },
        }
    }
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// One unit of raw input, tagged by producer kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    /// Whole-file write
    Write {
        file_path: String,
        content: String,
        tool_result: Option<String>,
    },
    /// Partial edit of an existing file
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
    },
    /// Shell execution from the interactive hook
    Bash { command: String },
    /// Patch application entry from a session log
    SessionPatch {
        patch: String,
        timestamp: Option<String>,
    },
    /// Command execution entry from a session log
    SessionCommand {
        command: String,
        timestamp: Option<String>,
    },
    /// Explicit capture from the CLI, recorded as given
    Manual(CaptureEvent),
    Unrecognized { tool_name: String },
}

/// Normalize one raw input. An empty result means nothing should be recorded.
pub fn normalize(input: &RawInput) -> Vec<CaptureEvent> {
    match input {
        RawInput::Write {
            file_path,
            content,
            tool_result,
        } => vec![parse_write_event(file_path, content, tool_result.as_deref())],
        RawInput::Edit {
            file_path,
            old_string,
            new_string,
        } => vec![parse_edit_event(file_path, old_string, new_string)],
        RawInput::Bash { command } => parse_bash_event(command).into_iter().collect(),
        RawInput::SessionPatch { patch, timestamp } => {
            parse_session_patch(patch, timestamp.as_deref())
        }
        RawInput::SessionCommand { command, timestamp } => {
            parse_session_command(command, timestamp.as_deref())
        }
        RawInput::Manual(event) => vec![event.clone()],
        RawInput::Unrecognized { tool_name } => {
            debug!("Skipping unrecognized tool: {}", tool_name);
            Vec::new()
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// Lines in a block of text; empty text has none.
fn line_count(s: &str) -> usize {
    if s.is_empty() {
        0
    } else {
        s.matches('\n').count() + 1
    }
}

fn parse_write_event(file_path: &str, content: &str, tool_result: Option<&str>) -> CaptureEvent {
    let operation = match tool_result {
        Some(result) if result.to_lowercase().contains("overwritten") => Operation::Modify,
        _ => Operation::Create,
    };

    let mut event = CaptureEvent::new("Write", operation);
    event.file_path = non_empty(file_path);
    event.diff_summary = Some(format!("+{} lines", line_count(content)));
    event.raw_input = non_empty(excerpt(content, RAW_EXCERPT_CHARS));
    event
}

fn parse_edit_event(file_path: &str, old_string: &str, new_string: &str) -> CaptureEvent {
    let diff = line_count(new_string) as i64 - line_count(old_string) as i64;

    let diff_summary = if diff > 0 {
        format!("+{} lines", diff)
    } else if diff < 0 {
        format!("{} lines", diff)
    } else {
        "modified (same line count)".to_string()
    };

    let mut event = CaptureEvent::new("Edit", Operation::Modify);
    event.file_path = non_empty(file_path);
    event.diff_summary = Some(diff_summary);
    if !old_string.is_empty() {
        event.raw_input = Some(format!(
            "old: {}... → new: {}...",
            excerpt(old_string, EDIT_EXCERPT_CHARS),
            excerpt(new_string, EDIT_EXCERPT_CHARS)
        ));
    }
    event
}

fn parse_bash_event(command: &str) -> Option<CaptureEvent> {
    let (operation, detail) = classify_command(command);

    // Skip uninteresting commands
    if operation == Operation::Unknown {
        return None;
    }

    let mut event = CaptureEvent::new("Bash", operation);
    event.diff_summary = detail;
    event.raw_input = Some(excerpt(command, RAW_EXCERPT_CHARS).to_string());
    event.insert_metadata("command_category", command_category(command).as_str());
    Some(event)
}

fn stamp_source_timestamp(event: &mut CaptureEvent, timestamp: Option<&str>) {
    if let Some(ts) = timestamp {
        event.insert_metadata("source_timestamp", ts);
    }
}

fn parse_session_patch(patch: &str, timestamp: Option<&str>) -> Vec<CaptureEvent> {
    let raw_input = excerpt(patch, RAW_EXCERPT_CHARS).to_string();

    parse_patch(patch)
        .into_iter()
        .map(|op| {
            let mut event = CaptureEvent::new(SESSION_LOG_TOOL, op.operation);
            event.file_path = Some(op.file_path);
            event.diff_summary = Some(op.diff_summary);
            event.raw_input = Some(raw_input.clone());
            stamp_source_timestamp(&mut event, timestamp);
            event
        })
        .collect()
}

fn parse_session_command(command: &str, timestamp: Option<&str>) -> Vec<CaptureEvent> {
    // Patches applied through the shell carry the patch in the script body
    if command.contains("apply_patch") && command.contains(BEGIN_PATCH_MARKER) {
        return parse_session_patch(command, timestamp);
    }

    let (operation, detail) = classify_command(command);
    if operation == Operation::Unknown {
        return Vec::new();
    }

    let mut event = CaptureEvent::new(SESSION_LOG_TOOL, operation);
    event.diff_summary =
        detail.or_else(|| non_empty(excerpt(command.trim(), COMMAND_DETAIL_CHARS)));
    event.raw_input = Some(excerpt(command, RAW_EXCERPT_CHARS).to_string());
    event.insert_metadata("command_category", command_category(command).as_str());
    stamp_source_timestamp(&mut event, timestamp);
    vec![event]
}

// ============================================================================
// SESSION LOGS
// ============================================================================

/// Header of an agent session log (`session_meta` entry).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: Option<String>,
    pub cwd: Option<String>,
    pub cli_version: Option<String>,
    pub timestamp: Option<String>,
}

/// Recognized content of one session log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    pub meta: SessionMeta,
    pub entries: Vec<RawInput>,
}

/// Correlation facts stamped on every event imported from a session log.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub parent_session: Option<String>,
    pub git_branch: Option<String>,
}

impl SessionLog {
    /// Normalize every entry and attach the session's correlation metadata.
    pub fn events(&self, context: &SessionContext) -> Vec<CaptureEvent> {
        let session_id = self.meta.id.as_deref().unwrap_or("unknown");

        self.entries
            .iter()
            .flat_map(normalize)
            .map(|mut event| {
                event.insert_metadata("codex_session_id", session_id);
                if let Some(version) = &self.meta.cli_version {
                    event.insert_metadata("codex_version", version.as_str());
                }
                if let Some(cwd) = &self.meta.cwd {
                    event.insert_metadata("cwd", cwd.as_str());
                }
                if let Some(parent) = &context.parent_session {
                    event.insert_metadata("parent_session_id", parent.as_str());
                }
                if let Some(branch) = &context.git_branch {
                    event.insert_metadata("git_branch", branch.as_str());
                }
                event
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct LogLine {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    payload: Value,
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Read a newline-delimited session log. Malformed lines are skipped.
pub fn parse_session_log<R: BufRead>(reader: R) -> std::io::Result<SessionLog> {
    let mut log = SessionLog::default();

    for (index, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let line = match std::str::from_utf8(&bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                debug!("Skipping non-UTF-8 log line {}: {}", index + 1, e);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let entry: LogLine = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping malformed log line {}: {}", index + 1, e);
                continue;
            }
        };

        match entry.kind.as_deref() {
            Some("session_meta") => {
                log.meta = SessionMeta {
                    id: payload_str(&entry.payload, "id").map(String::from),
                    cwd: payload_str(&entry.payload, "cwd").map(String::from),
                    cli_version: payload_str(&entry.payload, "cli_version").map(String::from),
                    timestamp: entry.timestamp,
                };
            }
            Some("response_item") => {
                if let Some(raw) = response_item(&entry.payload, entry.timestamp) {
                    log.entries.push(raw);
                }
            }
            _ => {}
        }
    }

    Ok(log)
}

fn response_item(payload: &Value, timestamp: Option<String>) -> Option<RawInput> {
    match (payload_str(payload, "type")?, payload_str(payload, "name")?) {
        ("custom_tool_call", "apply_patch") => Some(RawInput::SessionPatch {
            patch: payload_str(payload, "input").unwrap_or_default().to_string(),
            timestamp,
        }),
        ("function_call", "exec_command") => {
            let args = call_arguments(payload)?;
            let command = args.get("cmd").and_then(Value::as_str)?;
            Some(RawInput::SessionCommand {
                command: command.to_string(),
                timestamp,
            })
        }
        ("function_call", "shell") => {
            let args = call_arguments(payload)?;
            let command = match args.get("command")? {
                Value::String(s) => s.clone(),
                // argv form, e.g. ["bash", "-lc", "<script>"]
                Value::Array(argv) => argv.last()?.as_str()?.to_string(),
                _ => return None,
            };
            Some(RawInput::SessionCommand { command, timestamp })
        }
        _ => None,
    }
}

/// Function-call arguments arrive as a JSON document inside a string.
fn call_arguments(payload: &Value) -> Option<Value> {
    match payload.get("arguments")? {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| debug!("Skipping call with malformed arguments: {}", e))
            .ok(),
        Value::Object(_) => payload.get("arguments").cloned(),
        _ => None,
    }
}
