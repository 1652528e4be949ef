//! Git helpers used to enrich captured events
//!
//! Every helper is best effort: a missing `git` binary, a directory outside a
//! repository or a detached HEAD simply yields `None`.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::types::{CaptureEvent, Operation};

fn git_output(project_root: &Path, args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .current_dir(project_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            } else {
                None
            }
        })
}

/// Get the current git branch name
pub fn current_branch(project_root: &Path) -> Option<String> {
    git_output(project_root, &["branch", "--show-current"])
}

/// Get the most recent commit SHA (short form)
pub fn last_commit_sha(project_root: &Path) -> Option<String> {
    git_output(project_root, &["rev-parse", "--short", "HEAD"])
}

/// Attach branch metadata, and the new revision after a commit.
pub fn enrich_event(event: &mut CaptureEvent, project_root: &Path) {
    if event.operation == Operation::Commit && event.git_commit_sha.is_none() {
        event.git_commit_sha = last_commit_sha(project_root);
    }
    if event.metadata_value("git_branch").is_none() {
        if let Some(branch) = current_branch(project_root) {
            event.insert_metadata("git_branch", branch);
        }
    }
}
