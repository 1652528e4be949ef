//! Session tokens
//!
//! A session groups the events produced within one working period. The token
//! lives in `.provtrail/.session_id`; its modification time is the
//! "last touched" instant. Two processes may race to mint a token at the same
//! moment, in which case each keeps its own. No lock file is used.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Name of the token file inside the project marker directory.
pub const SESSION_FILE: &str = ".session_id";

/// Default inactivity window before a token lapses.
pub const DEFAULT_SESSION_EXPIRY: Duration = Duration::from_secs(3600);

/// Width of the externally visible token.
pub const SESSION_ID_LEN: usize = 12;

/// Reads, refreshes and mints session tokens for one project.
#[derive(Debug, Clone)]
pub struct SessionManager {
    dir: PathBuf,
    expiry: Duration,
}

impl SessionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            expiry: DEFAULT_SESSION_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn session_file(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Return the live token, or mint and persist a new one.
    ///
    /// Never fails: when the token cannot be persisted a fresh, unpersisted
    /// token is returned.
    pub fn get_or_create(&self) -> String {
        let session_file = self.session_file();

        if let Some(existing) = self.live_token(&session_file) {
            // Rewrite to refresh the modification time
            if let Err(e) = fs::write(&session_file, &existing) {
                debug!("Could not touch session file: {}", e);
            }
            return existing;
        }

        let new_id = generate_session_id();
        let persisted = fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&session_file, &new_id));
        if let Err(e) = persisted {
            debug!("Session token not persisted: {}", e);
        }
        new_id
    }

    fn live_token(&self, session_file: &Path) -> Option<String> {
        let modified = fs::metadata(session_file).ok()?.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age >= self.expiry {
            return None;
        }

        let session_id = fs::read_to_string(session_file).ok()?;
        let session_id = session_id.trim();
        (!session_id.is_empty()).then(|| session_id.to_string())
    }
}

/// Mint a session id from the current time and random bytes.
pub fn generate_session_id() -> String {
    let timestamp = chrono::Local::now().to_rfc3339();
    let random_bytes: [u8; 8] = rand::random();

    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}", timestamp, hex::encode(random_bytes)));
    let digest = hex::encode(hasher.finalize());
    digest[..SESSION_ID_LEN].to_string()
}

/// Convenience wrapper over [`SessionManager`] with the default expiry.
pub fn get_or_create_session(dir: &Path) -> String {
    SessionManager::new(dir).get_or_create()
}
