//! provtrail CLI
//!
//! Thin consumer of the project event store.
//!
//! Commands:
//! - provtrail init
//! - provtrail capture --tool Manual --file src/lib.rs --operation modify
//! - provtrail timeline [--since "1 hour ago"] [--file src/] [--tool Write] [--json]
//! - provtrail stats [--json]
//! - provtrail export [--output TIMELINE.md]
//! - provtrail summarize [--id N] [--limit N]
//! - provtrail status
//!
//! Exit codes: 0 on success, 1 on storage/query errors, 2 when the current
//! directory is not inside an initialized project.

mod render;
mod summarize;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use provtrail_core::project::{self, PROJECT_DIR};
use provtrail_core::{
    find_project_root, normalize, CaptureEvent, Config, DeliveryRouter, Error, EventQuery,
    EventStore, IpcClient, IpcError, Operation, RawInput, StoredEvent,
};

use crate::summarize::{summarize_events, AnthropicSummarizer};

#[derive(Parser)]
#[command(name = "provtrail")]
#[command(about = "Provenance timeline for AI-assisted development")]
#[command(version)]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable capture for the current directory
    Init,

    /// Record an event by hand
    Capture {
        /// Producer name
        #[arg(long, default_value = "Manual")]
        tool: String,

        #[arg(long)]
        file: Option<String>,

        /// create, modify, delete, move, copy, commit, execute
        #[arg(long, default_value = "modify")]
        operation: String,

        /// Short description of the change
        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        raw: Option<String>,
    },

    /// View change timeline
    Timeline {
        #[command(flatten)]
        filters: Filters,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Include the first lines of each raw input
        #[arg(long)]
        raw: bool,
    },

    /// Show store statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the timeline as a markdown document
    Export {
        #[command(flatten)]
        filters: Filters,

        #[arg(long, short, default_value = "TIMELINE.md")]
        output: PathBuf,
    },

    /// Generate AI summaries for events without one
    Summarize {
        /// Summarize a single event
        #[arg(long)]
        id: Option<i64>,

        /// Maximum events to summarize
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Daemon and project status
    Status,
}

#[derive(Args)]
struct Filters {
    /// Show events since this time (e.g., "2 hours ago", "yesterday", "2024-01-01")
    #[arg(long, short)]
    since: Option<String>,

    /// Show events until this time
    #[arg(long, short)]
    until: Option<String>,

    /// Filter by file path prefix
    #[arg(long, short)]
    file: Option<String>,

    /// Filter by tool (Write, Edit, Bash, Codex, ...)
    #[arg(long, short)]
    tool: Option<String>,

    /// Filter by session id
    #[arg(long)]
    session: Option<String>,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "20")]
    limit: usize,

    #[arg(long, default_value = "0")]
    offset: usize,
}

impl Filters {
    fn to_query(&self) -> EventQuery {
        EventQuery {
            since: self.since.clone(),
            until: self.until.clone(),
            file_path: self.file.clone(),
            tool_name: self.tool.clone(),
            session_id: self.session.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

/// Open the store of the enclosing project, or fail with `NotInitialized`.
fn open_project_store(config: &Config) -> Result<(PathBuf, EventStore)> {
    let cwd = env::current_dir().context("Failed to read current directory")?;
    let root = find_project_root(Some(&cwd))
        .filter(|root| project::db_path(root).exists())
        .ok_or_else(|| Error::NotInitialized {
            path: cwd.display().to_string(),
        })?;

    debug!("Using project root {}", root.display());
    let store = EventStore::open(&root, config)
        .with_context(|| format!("Failed to open event store in {}", root.display()))?;
    Ok((root, store))
}

fn cmd_init(config: &Config) -> Result<()> {
    let cwd = env::current_dir().context("Failed to read current directory")?;
    let already = project::db_path(&cwd).exists();

    EventStore::open(&cwd, config)
        .with_context(|| format!("Failed to create {}", cwd.join(PROJECT_DIR).display()))?;

    if already {
        println!("provtrail is already initialized in {}", cwd.display());
    } else {
        println!("Initialized provtrail in {}", cwd.join(PROJECT_DIR).display());
    }
    Ok(())
}

fn cmd_capture(
    config: Config,
    tool: String,
    file: Option<String>,
    operation: String,
    summary: Option<String>,
    raw: Option<String>,
) -> Result<()> {
    let operation: Operation = operation.parse().unwrap_or(Operation::Unknown);

    let mut event = CaptureEvent::new(tool, operation);
    event.file_path = file;
    event.diff_summary = summary;
    event.raw_input = raw;

    let root = find_project_root(None);
    let events = normalize(&RawInput::Manual(event));
    let report = DeliveryRouter::from_config(config, root).deliver(&events)?;

    if report.delivered() == 0 {
        eprintln!("Nothing captured: no {} directory found", PROJECT_DIR);
    } else if report.via_daemon > 0 {
        println!("Captured via daemon");
    } else {
        println!("Captured to local store");
    }
    Ok(())
}

fn cmd_timeline(config: &Config, filters: &Filters, json: bool, raw: bool) -> Result<()> {
    let (root, store) = open_project_store(config)?;
    let events = store.query(&filters.to_query()).context("Query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        print!("{}", render::timeline(&events, &project_name(&root), raw));
    }
    Ok(())
}

fn cmd_stats(config: &Config, json: bool) -> Result<()> {
    let (_, store) = open_project_store(config)?;
    let stats = store.stats().context("Query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", render::stats(&stats));
    }
    Ok(())
}

fn cmd_export(config: &Config, filters: &Filters, output: &Path) -> Result<()> {
    let (root, store) = open_project_store(config)?;
    let events = store.query(&filters.to_query()).context("Query failed")?;

    let generated = Local::now().format("%m/%d/%Y %I:%M %p").to_string();
    let doc = render::markdown(&events, &project_name(&root), &generated);
    fs::write(output, doc).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Exported {} events to {}", events.len(), output.display());
    Ok(())
}

fn cmd_summarize(config: &Config, id: Option<i64>, limit: usize) -> Result<()> {
    let (_, store) = open_project_store(config)?;

    if !config.summarization.enabled {
        println!("Summarization is disabled in config");
        return Ok(());
    }

    let summarizer = AnthropicSummarizer::new(config.summarization.clone())?;
    if !summarizer.is_available() {
        eprintln!("No Anthropic API key found. Set ANTHROPIC_API_KEY or add api_key to ~/.provtrail/config.toml");
        process::exit(1);
    }

    let events: Vec<StoredEvent> = match id {
        Some(id) => store.get(id)?.into_iter().collect(),
        None => store.unsummarized(limit)?,
    };
    if events.is_empty() {
        println!("No events to summarize");
        return Ok(());
    }

    info!("Summarizing {} events", events.len());
    let stats = summarize_events(&store, &summarizer, &events)?;
    println!("Summarization complete:");
    println!("  Summarized: {}", stats.summarized);
    println!("  Skipped: {}", stats.skipped);
    println!("  Errors: {}", stats.errors);
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let client = IpcClient::from_config(config);
    println!("Socket: {}", config.socket_path().display());
    match client.ping() {
        Ok((uptime_secs, events_count)) => {
            println!("Daemon: Running");
            println!("  Uptime: {}s", uptime_secs);
            println!("  Events captured: {}", events_count);
        }
        Err(IpcError::DaemonNotRunning) => println!("Daemon: Not running"),
        Err(e) => println!("Daemon: Error ({})", e),
    }

    match find_project_root(None) {
        Some(root) => {
            println!("Project: {}", root.display());
            let db = project::db_path(&root);
            if db.exists() {
                let store = EventStore::open(&root, config)?;
                println!("  Local events: {}", store.event_count()?);
            } else {
                println!("  Local store: not created yet");
            }
        }
        None => println!("Project: not initialized (run `provtrail init`)"),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load ~/.provtrail/config.toml")?;

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Capture {
            tool,
            file,
            operation,
            summary,
            raw,
        } => cmd_capture(config, tool, file, operation, summary, raw),
        Commands::Timeline { filters, json, raw } => cmd_timeline(&config, &filters, json, raw),
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Export { filters, output } => cmd_export(&config, &filters, &output),
        Commands::Summarize { id, limit } => cmd_summarize(&config, id, limit),
        Commands::Status => cmd_status(&config),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        if let Some(Error::NotInitialized { path }) = e.downcast_ref::<Error>() {
            eprintln!("provtrail is not initialized for {}", path);
            eprintln!("Run `provtrail init` to set it up.");
            process::exit(2);
        }
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
