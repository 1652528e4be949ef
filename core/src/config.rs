//! User configuration
//!
//! Read from `~/.provtrail/config.toml`. Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default model for summarization (fast + cheap)
pub const DEFAULT_SUMMARY_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 60;
const DEFAULT_IPC_TIMEOUT_MS: u64 = 2000;
const DEFAULT_SESSION_EXPIRY_SECS: u64 = 3600;

/// Global provtrail directory (`~/.provtrail`).
pub fn provtrail_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".provtrail")
}

/// Default location of the config file.
pub fn config_path() -> PathBuf {
    provtrail_home().join("config.toml")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub ipc: IpcConfig,
    pub display: DisplayConfig,
    pub summarization: SummarizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub expiry_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_secs: DEFAULT_SESSION_EXPIRY_SECS,
        }
    }
}

impl SessionConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Override of the daemon socket location
    pub socket_path: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_ms: DEFAULT_IPC_TIMEOUT_MS,
        }
    }
}

impl IpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// External command printing a human-readable timestamp (e.g. `pst-timestamp`)
    pub formatter_command: Option<String>,
}

/// Configuration for event summarization
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// API key override (falls back to `ANTHROPIC_API_KEY`)
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub enabled: bool,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_SUMMARY_MODEL.to_string(),
            max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            enabled: true,
        }
    }
}

impl Config {
    /// Load `~/.provtrail/config.toml`, or defaults when it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Like [`Config::load`], but never fails. Used on the hook path.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Effective daemon socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.ipc
            .socket_path
            .clone()
            .unwrap_or_else(crate::ipc::socket_path)
    }
}
