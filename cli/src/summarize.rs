//! Event summarization via Anthropic API
//!
//! Generates a short description of each stored event and writes it back with
//! `EventStore::set_ai_summary`.
//!
//! Credential resolution order:
//! 1. Config file `api_key` (`[summarization]` in ~/.provtrail/config.toml)
//! 2. `ANTHROPIC_API_KEY` environment variable

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use provtrail_core::config::SummarizationConfig;
use provtrail_core::{EventStore, StoredEvent};

const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SummarizationError {
    #[error("No API key available")]
    NoApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
}

/// Produces a natural-language description of one event.
pub trait Summarize {
    fn summarize(&self, event: &StoredEvent) -> Result<String, SummarizationError>;
}

/// Anthropic API request structure
#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Anthropic API response structure
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

pub struct AnthropicSummarizer {
    client: reqwest::blocking::Client,
    config: SummarizationConfig,
    api_key: Option<String>,
}

impl AnthropicSummarizer {
    pub fn new(config: SummarizationConfig) -> Result<Self, SummarizationError> {
        let api_key = resolve_api_key(&config);
        if api_key.is_none() {
            warn!("No Anthropic API key found. Set ANTHROPIC_API_KEY or add api_key to ~/.provtrail/config.toml");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Check if summarization is available (has API key and enabled)
    pub fn is_available(&self) -> bool {
        self.api_key.is_some() && self.config.enabled
    }
}

impl Summarize for AnthropicSummarizer {
    fn summarize(&self, event: &StoredEvent) -> Result<String, SummarizationError> {
        let api_key = self.api_key.as_ref().ok_or(SummarizationError::NoApiKey)?;

        let request = ApiRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: build_prompt(event),
            }],
        };

        let response = self
            .client
            .post(API_BASE_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SummarizationError::Api(format!("HTTP {}: {}", status, body)));
        }

        let api_response: ApiResponse = response.json()?;
        if let Some(error) = api_response.error {
            return Err(SummarizationError::Api(error.message));
        }

        let summary = api_response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        if summary.is_empty() {
            return Err(SummarizationError::Api("Empty response".to_string()));
        }

        Ok(summary)
    }
}

fn resolve_api_key(config: &SummarizationConfig) -> Option<String> {
    if let Some(key) = config.api_key.as_ref().filter(|k| !k.is_empty()) {
        debug!("Using API key from config file");
        return Some(key.clone());
    }

    std::env::var("ANTHROPIC_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// Prompt describing one event.
pub fn build_prompt(event: &StoredEvent) -> String {
    let meta = |key: &str| {
        event
            .metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
    };

    let mut prompt = format!(
        "Summarize this code change in 10 words or less. Be specific about what changed.\n\n\
         Tool: {}\n\
         File: {}\n\
         Operation: {}\n\
         Change details: {}",
        event.tool_name,
        event.file_path.as_deref().unwrap_or("(no file)"),
        event.operation,
        event.diff_summary.as_deref().unwrap_or_default(),
    );
    if let Some(branch) = meta("git_branch") {
        prompt.push_str(&format!("\nBranch: {}", branch));
    }
    if let Some(category) = meta("command_category") {
        prompt.push_str(&format!("\nCategory: {}", category));
    }
    prompt.push('\n');

    if let Some(raw) = event.raw_input.as_deref().filter(|r| !r.is_empty()) {
        match event.tool_name.as_str() {
            "Bash" => prompt.push_str(&format!("\nCommand: {}", truncate_chars(raw, 500))),
            "Write" | "Edit" => {
                prompt.push_str(&format!("\nCode snippet: {}", truncate_chars(raw, 200)))
            }
            _ => {}
        }
    }

    prompt
}

/// Outcome of a summarization pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SummarizeStats {
    pub summarized: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Summarize `events`, storing each result. Per-event failures are logged and
/// counted; only store errors abort the pass.
pub fn summarize_events<S: Summarize>(
    store: &EventStore,
    summarizer: &S,
    events: &[StoredEvent],
) -> provtrail_core::Result<SummarizeStats> {
    let mut stats = SummarizeStats::default();

    for event in events {
        if event.ai_summary.is_some() {
            stats.skipped += 1;
            continue;
        }

        match summarizer.summarize(event) {
            Ok(summary) => {
                if store.set_ai_summary(event.id, &summary)? {
                    stats.summarized += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Err(e) => {
                warn!("Failed to summarize event {}: {}", event.id, e);
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}
