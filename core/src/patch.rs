//! Multi-file patch parsing
//!
//! Agent session logs describe edits as patch blocks:
//!
//! ```text
//! *** Begin Patch
//! *** Add File: src/new.rs
//! +fn main() {}
//! *** Update File: src/lib.rs
//! -old
//! +new
//! *** Delete File: src/gone.rs
//! *** End Patch
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Operation;

/// Marker that identifies a patch embedded in a shell command.
pub const BEGIN_PATCH_MARKER: &str = "*** Begin Patch";

/// One file-level intent found in a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub file_path: String,
    pub operation: Operation,
    pub diff_summary: String,
}

fn file_marker_re() -> &'static Regex {
    static FILE_MARKER_RE: OnceLock<Regex> = OnceLock::new();
    FILE_MARKER_RE.get_or_init(|| {
        Regex::new(r"\*\*\* (Add|Update|Delete) File:[ \t]*([^\r\n]+)")
            .expect("valid file marker regex")
    })
}

/// Parse patch text into per-file operations, in document order.
///
/// Every Add/Update block gets the same whole-patch line summary; Delete
/// blocks get `"file deleted"`. Text without any block yields an empty list.
pub fn parse_patch(patch: &str) -> Vec<FileOperation> {
    let summary = line_summary(patch);

    file_marker_re()
        .captures_iter(patch)
        .filter_map(|cap| {
            let file_path = cap[2].trim().to_string();
            if file_path.is_empty() {
                return None;
            }
            let (operation, diff_summary) = match &cap[1] {
                "Add" => (
                    Operation::Create,
                    summary.clone().unwrap_or_else(|| "new file".to_string()),
                ),
                "Update" => (
                    Operation::Modify,
                    summary.clone().unwrap_or_else(|| "updated".to_string()),
                ),
                _ => (Operation::Delete, "file deleted".to_string()),
            };
            Some(FileOperation {
                file_path,
                operation,
                diff_summary,
            })
        })
        .collect()
}

/// `"+A -R lines"` over the whole patch, or `None` when nothing changed.
fn line_summary(patch: &str) -> Option<String> {
    let lines_added = patch
        .lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("++"))
        .count();
    let lines_removed = patch
        .lines()
        .filter(|l| l.starts_with('-') && !l.starts_with("--"))
        .count();

    if lines_added == 0 && lines_removed == 0 {
        return None;
    }

    let mut parts = Vec::new();
    if lines_added > 0 {
        parts.push(format!("+{}", lines_added));
    }
    if lines_removed > 0 {
        parts.push(format!("-{}", lines_removed));
    }
    Some(format!("{} lines", parts.join(" ")))
}
