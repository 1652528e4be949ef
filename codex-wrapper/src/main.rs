//! provtrail Codex wrapper
//! ======================
//!
//! Imports file operations from OpenAI Codex CLI session logs into provtrail.
//!
//! Usage:
//!     provtrail-codex --jsonl ~/.codex/sessions/2026/01/11/rollout-abc.jsonl
//!     provtrail-codex --latest --parent-session claude-abc123 --git-branch feature/oauth
//!     provtrail-codex exec "task description"
//!
//! Without `--jsonl`/`--latest` every argument is passed through to `codex`;
//! after it exits the most recent session log is imported and codex's exit
//! code is returned.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use provtrail_core::normalize::SessionMeta;
use provtrail_core::{
    find_project_root, git, parse_session_log, CaptureEvent, Config, DeliveryRouter,
    SessionContext,
};

/// provtrail wrapper for Codex CLI - tracks file operations for provenance
#[derive(Parser, Debug)]
#[command(
    name = "provtrail-codex",
    about = "Codex CLI wrapper with provtrail provenance capture",
    version
)]
struct Args {
    /// Import this session log instead of running codex
    #[arg(short, long)]
    jsonl: Option<PathBuf>,

    /// Import the most recent session log under ~/.codex/sessions
    #[arg(short, long)]
    latest: bool,

    /// Parent assistant session id, for hand-off correlation
    #[arg(short, long)]
    parent_session: Option<String>,

    /// Git branch to record (detected from the working directory otherwise)
    #[arg(short = 'b', long)]
    git_branch: Option<String>,

    /// Parse and show operations without delivering them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the parsed session as JSON
    #[arg(long)]
    json: bool,

    /// Skip capture after running codex
    #[arg(long, hide = true)]
    no_capture: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Arguments to pass through to codex
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    codex_args: Vec<String>,
}

#[derive(Serialize)]
struct ParsedSession<'a> {
    meta: &'a SessionMeta,
    events: &'a [CaptureEvent],
}

/// Directory holding Codex session logs
fn sessions_dir() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".codex").join("sessions"))
}

/// Most recently modified `*.jsonl` file under `dir`
fn find_latest_session(dir: &Path) -> Option<PathBuf> {
    if !dir.exists() {
        return None;
    }

    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.into_path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

fn print_operations(meta: &SessionMeta, events: &[CaptureEvent]) {
    println!("\nCodex Session: {}", meta.id.as_deref().unwrap_or("unknown"));
    println!("   CWD: {}", meta.cwd.as_deref().unwrap_or("-"));
    println!("   CLI Version: {}", meta.cli_version.as_deref().unwrap_or("-"));
    println!("   Operations: {}\n", events.len());

    for (i, event) in events.iter().enumerate() {
        let file = event.file_path.as_deref().unwrap_or("(no file)");
        println!("   [{}] {} → {}", i + 1, event.operation, file);
        if let Some(diff) = &event.diff_summary {
            println!("       {}", diff);
        }
    }
    println!();
}

/// Parse one session log and deliver its events. Returns the delivered count.
fn import_session(path: &Path, args: &Args, git_branch: Option<String>) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("File not found: {}", path.display()))?;
    let log = parse_session_log(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let context = SessionContext {
        parent_session: args.parent_session.clone(),
        git_branch,
    };
    let events = log.events(&context);

    if args.json {
        let parsed = ParsedSession {
            meta: &log.meta,
            events: &events,
        };
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(0);
    }

    if args.verbose || args.dry_run {
        print_operations(&log.meta, &events);
    }

    if args.dry_run {
        println!("Dry run - no events sent");
        return Ok(0);
    }

    if events.is_empty() {
        println!("No file operations found in session");
        return Ok(0);
    }

    // Prefer the project the session ran in
    let project_root = log
        .meta
        .cwd
        .as_deref()
        .and_then(|cwd| find_project_root(Some(Path::new(cwd))))
        .or_else(|| find_project_root(None));
    debug!("Project root: {:?}", project_root);

    let config = Config::load().context("Failed to load ~/.provtrail/config.toml")?;
    let report = DeliveryRouter::from_config(config, project_root).deliver(&events)?;

    if args.verbose {
        println!("Captured {}/{} operations", report.delivered(), events.len());
    } else {
        println!("Captured {} Codex operations", report.delivered());
    }
    Ok(report.delivered())
}

fn detect_git_branch() -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    git::current_branch(&cwd)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Import mode
    if args.jsonl.is_some() || args.latest {
        let path = match &args.jsonl {
            Some(path) => path.clone(),
            None => sessions_dir()
                .as_deref()
                .and_then(find_latest_session)
                .context("No Codex session files found")?,
        };
        if args.verbose {
            println!("Session log: {}", path.display());
        }

        let git_branch = args.git_branch.clone().or_else(detect_git_branch);
        import_session(&path, &args, git_branch)?;
        return Ok(());
    }

    // Wrapper mode: branch is read before codex can switch it
    let git_branch = args.git_branch.clone().or_else(detect_git_branch);
    debug!("Git branch: {:?}", git_branch);

    info!("Running codex with args: {:?}", args.codex_args);
    let status = Command::new("codex")
        .args(&args.codex_args)
        .status()
        .context("Failed to run codex. Is it installed?")?;

    if !args.no_capture {
        match sessions_dir().as_deref().and_then(find_latest_session) {
            Some(path) => {
                info!("Parsing session: {}", path.display());
                if let Err(e) = import_session(&path, &args, git_branch) {
                    warn!("Failed to capture Codex session: {:#}", e);
                }
            }
            None => warn!("No Codex session files found"),
        }
    }

    // Exit with codex's exit code
    std::process::exit(status.code().unwrap_or(1));
}
