//! provtrail core - provenance timeline of AI coding assistant activity
//!
//! This crate provides:
//! - The canonical event model and IPC wire types
//! - Command classification and patch parsing
//! - Normalization of hook payloads and agent session logs
//! - Session tokens and the SQLite event store
//! - Delivery routing (daemon over IPC, local store as fallback)

pub mod classify;
pub mod config;
pub mod delivery;
pub mod error;
pub mod git;
pub mod ipc;
pub mod normalize;
pub mod patch;
pub mod project;
pub mod schema;
pub mod session;
pub mod store;
pub mod time_filter;
pub mod types;

pub use classify::{classify_command, command_category};
pub use config::Config;
pub use delivery::{DeliveryReport, DeliveryRouter, Transport};
pub use error::{Error, Result};
pub use ipc::{IpcClient, IpcError};
pub use normalize::{normalize, parse_session_log, HookInput, RawInput, SessionContext, SessionLog};
pub use patch::{parse_patch, FileOperation};
pub use project::find_project_root;
pub use session::{get_or_create_session, SessionManager};
pub use store::{EventQuery, EventStore};
pub use time_filter::parse_time_filter;
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::delivery::{DeliveryRouter, Transport};
    pub use crate::error::Error;
    pub use crate::ipc::{IpcClient, IpcError};
    pub use crate::normalize::{normalize, RawInput};
    pub use crate::store::{EventQuery, EventStore};
    pub use crate::types::*;
}
