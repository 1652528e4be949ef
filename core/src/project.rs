//! Project marker discovery
//!
//! Capture is enabled for a directory tree when a `.provtrail/` directory
//! exists at or above the working directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::config;

/// Name of the project marker directory.
pub const PROJECT_DIR: &str = ".provtrail";

/// Name of the event database inside the marker directory.
pub const DB_FILE: &str = "events.db";

/// Walk up from `start` (or the current directory) to the first ancestor
/// holding a `.provtrail/` directory. The walk stops at the enclosing git
/// root, and the global `~/.provtrail` home never counts as a marker.
pub fn find_project_root(start_path: Option<&Path>) -> Option<PathBuf> {
    let start = match start_path {
        Some(p) => p.to_path_buf(),
        None => env::current_dir().ok()?,
    };
    search_ancestors(start, &config::provtrail_home())
}

fn search_ancestors(mut current: PathBuf, global_home: &Path) -> Option<PathBuf> {
    loop {
        let marker = current.join(PROJECT_DIR);
        if marker.is_dir() && marker != global_home {
            return Some(current);
        }
        if current.join(".git").exists() {
            // Git root without a marker
            return None;
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Marker directory of a project root.
pub fn project_dir(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR)
}

/// Event database path of a project root.
pub fn db_path(project_root: &Path) -> PathBuf {
    project_dir(project_root).join(DB_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_finds_marker_in_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(PROJECT_DIR)).unwrap();
        let nested = tmp.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(Some(&nested)).unwrap();
        assert_eq!(root, tmp.path());
        assert_eq!(db_path(&root), tmp.path().join(".provtrail/events.db"));
    }

    #[test]
    fn test_marker_must_be_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir(&project).unwrap();
        fs::write(project.join(PROJECT_DIR), "not a dir").unwrap();

        let found = find_project_root(Some(&project));
        assert_ne!(found.as_deref(), Some(project.as_path()));
    }

    #[test]
    fn test_stops_at_git_root() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(PROJECT_DIR)).unwrap();
        let repo = tmp.path().join("code").join("unrelated-repo");
        fs::create_dir_all(repo.join(".git")).unwrap();
        let nested = repo.join("src");
        fs::create_dir(&nested).unwrap();

        assert_eq!(find_project_root(Some(&nested)), None);

        fs::create_dir(repo.join(PROJECT_DIR)).unwrap();
        assert_eq!(find_project_root(Some(&nested)), Some(repo));
    }

    #[test]
    fn test_global_home_is_not_a_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let home_marker = tmp.path().join(PROJECT_DIR);
        fs::create_dir(&home_marker).unwrap();
        fs::write(home_marker.join("config.toml"), "").unwrap();
        let nested = tmp.path().join("scratch");
        fs::create_dir(&nested).unwrap();

        assert_eq!(search_ancestors(nested.clone(), &home_marker), None);
        assert_eq!(
            search_ancestors(nested, Path::new("/nonexistent/.provtrail")).as_deref(),
            Some(tmp.path())
        );
    }
}
