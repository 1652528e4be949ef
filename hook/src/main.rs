//! provtrail hook - PostToolUse event capture
//!
//! Reads one hook payload from stdin, normalizes it and delivers the result:
//! 1. Send each event to the daemon over the Unix socket
//! 2. If the daemon took nothing, write directly to the project database
//!
//! The hook is invisible on the "nothing to do" paths: bad input, skipped
//! commands and directories without `.provtrail/` all exit 0 without output.
//! Only a failed local write is reported (stderr, exit 1).

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use provtrail_core::{
    find_project_root, git, normalize, CaptureEvent, Config, DeliveryRouter, HookInput, Transport,
};

/// Events worth delivering, with the project they belong to.
struct Capture {
    project_root: PathBuf,
    events: Vec<CaptureEvent>,
}

/// Parse and normalize a payload. `None` means exit silently.
fn prepare(input: &str) -> Option<Capture> {
    if input.trim().is_empty() {
        return None;
    }
    let hook = HookInput::from_json(input).ok()?;

    // Hooks may run from a different directory than the session
    let start_path = hook.cwd.as_deref().map(Path::new);
    let project_root = find_project_root(start_path)?;

    let mut events = normalize(&hook.into_raw());
    if events.is_empty() {
        return None;
    }
    for event in &mut events {
        git::enrich_event(event, &project_root);
    }

    Some(Capture {
        project_root,
        events,
    })
}

/// Deliver one payload; returns how many events were recorded.
fn run<T, F>(input: &str, router: F) -> provtrail_core::Result<usize>
where
    T: Transport,
    F: FnOnce(PathBuf) -> DeliveryRouter<T>,
{
    let Some(capture) = prepare(input) else {
        return Ok(0);
    };
    let report = router(capture.project_root).deliver(&capture.events)?;
    Ok(report.delivered())
}

fn main() {
    // The host runtime sends one JSON object and closes stdin
    let mut input = String::new();
    if io::stdin().read_to_string(&mut input).is_err() {
        process::exit(0);
    }

    let result = run(&input, |root| {
        DeliveryRouter::from_config(Config::load_or_default(), Some(root))
    });
    if let Err(e) = result {
        eprintln!("provtrail-hook: failed to save event: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provtrail_core::project::PROJECT_DIR;
    use provtrail_core::{EventQuery, EventStore, IpcClient, Operation};
    use std::fs;

    /// Git repository root, optionally with capture enabled
    fn repo(enabled: bool) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        if enabled {
            fs::create_dir(tmp.path().join(PROJECT_DIR)).unwrap();
        }
        tmp
    }

    fn payload(cwd: &Path, tool: &str, tool_input: serde_json::Value) -> String {
        serde_json::json!({
            "tool_name": tool,
            "tool_input": tool_input,
            "cwd": cwd.to_string_lossy(),
        })
        .to_string()
    }

    fn offline(root: PathBuf) -> DeliveryRouter {
        let client = IpcClient::with_socket_path(root.join("no-daemon.sock"));
        DeliveryRouter::new(client, Config::default(), Some(root))
    }

    #[test]
    fn test_empty_and_invalid_input_are_ignored() {
        assert!(prepare("").is_none());
        assert!(prepare("  \n").is_none());
        assert!(prepare("{not json").is_none());
        assert_eq!(run("{not json", offline).unwrap(), 0);
    }

    #[test]
    fn test_project_without_marker_is_ignored() {
        let tmp = repo(false);
        let input = payload(
            tmp.path(),
            "Write",
            serde_json::json!({"file_path": "a.txt", "content": "hi"}),
        );

        assert!(prepare(&input).is_none());
        assert_eq!(run(&input, offline).unwrap(), 0);
        assert!(!tmp.path().join(PROJECT_DIR).exists());
    }

    #[test]
    fn test_read_only_command_is_ignored() {
        let tmp = repo(true);
        let input = payload(tmp.path(), "Bash", serde_json::json!({"command": "ls -la"}));
        assert!(prepare(&input).is_none());
    }

    #[test]
    fn test_write_is_recorded_locally() {
        let tmp = repo(true);
        let input = payload(
            tmp.path(),
            "Write",
            serde_json::json!({"file_path": "src/main.rs", "content": "fn main() {}\n"}),
        );

        let capture = prepare(&input).unwrap();
        assert_eq!(capture.project_root, tmp.path());
        assert_eq!(capture.events.len(), 1);

        assert_eq!(run(&input, offline).unwrap(), 1);
        let store = EventStore::open(tmp.path(), &Config::default()).unwrap();
        let stored = store.query(&EventQuery::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].operation, Operation::Create);
        assert_eq!(stored[0].file_path.as_deref(), Some("src/main.rs"));
    }
}
