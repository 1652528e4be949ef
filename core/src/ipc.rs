//! IPC client for communicating with the provtrail daemon
//!
//! One request per connection: a single JSON line is written, exactly one
//! newline-terminated JSON line is read back. Used synchronously by the hook,
//! the CLI and the session-log importer.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::config::Config;
use crate::{CaptureEvent, IpcMessage, IpcResponse};

/// Default socket path
pub fn socket_path() -> PathBuf {
    crate::config::provtrail_home().join("provtrail.sock")
}

/// Error type for IPC operations
#[derive(Debug)]
pub enum IpcError {
    /// Daemon is not running (socket doesn't exist or connection refused)
    DaemonNotRunning,
    /// Socket connection failed
    ConnectionFailed(std::io::Error),
    /// Failed to send message
    SendFailed(std::io::Error),
    /// Failed to receive response
    ReceiveFailed(std::io::Error),
    /// Invalid response format
    InvalidResponse(String),
    /// Daemon returned an error
    DaemonError(String),
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::DaemonNotRunning => write!(f, "Daemon not running"),
            IpcError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            IpcError::SendFailed(e) => write!(f, "Send failed: {}", e),
            IpcError::ReceiveFailed(e) => write!(f, "Receive failed: {}", e),
            IpcError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            IpcError::DaemonError(msg) => write!(f, "Daemon error: {}", msg),
        }
    }
}

impl std::error::Error for IpcError {}

/// IPC client for communicating with the daemon
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    /// Create a new IPC client with default settings
    pub fn new() -> Self {
        Self::with_socket_path(socket_path())
    }

    /// Create a client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(2),
        }
    }

    /// Create a client from the `[ipc]` config section
    pub fn from_config(config: &Config) -> Self {
        Self::with_socket_path(config.socket_path()).with_timeout(config.ipc.timeout())
    }

    /// Set the connect and read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the daemon appears to be running (socket exists)
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send a message to the daemon and wait for a response
    pub fn send(&self, message: &IpcMessage) -> Result<IpcResponse, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let mut stream = self.connect()?;

        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(IpcError::ConnectionFailed)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(IpcError::ConnectionFailed)?;

        let json = serde_json::to_string(message).map_err(|e| {
            IpcError::SendFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        writeln!(stream, "{}", json).map_err(IpcError::SendFailed)?;
        stream.flush().map_err(IpcError::SendFailed)?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        let read = reader
            .read_line(&mut response_line)
            .map_err(IpcError::ReceiveFailed)?;
        if read == 0 || !response_line.ends_with('\n') {
            return Err(IpcError::InvalidResponse(
                "connection closed before a full response line".into(),
            ));
        }

        let response: IpcResponse = serde_json::from_str(response_line.trim_end())
            .map_err(|e| IpcError::InvalidResponse(e.to_string()))?;

        if let IpcResponse::Error(msg) = &response {
            return Err(IpcError::DaemonError(msg.clone()));
        }

        Ok(response)
    }

    /// Connect with the client timeout bounding the handshake
    fn connect(&self) -> Result<UnixStream, IpcError> {
        let not_running = |e: std::io::Error| match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => IpcError::DaemonNotRunning,
            _ => IpcError::ConnectionFailed(e),
        };

        let address = SockAddr::unix(&self.socket_path).map_err(IpcError::ConnectionFailed)?;
        let socket =
            Socket::new(Domain::UNIX, Type::STREAM, None).map_err(IpcError::ConnectionFailed)?;
        socket
            .connect_timeout(&address, self.timeout)
            .map_err(not_running)?;
        Ok(UnixStream::from(std::os::fd::OwnedFd::from(socket)))
    }

    /// Send a capture event; succeeds only on an explicit `Ok` response
    pub fn capture(&self, event: &CaptureEvent) -> Result<(), IpcError> {
        match self.send(&IpcMessage::Capture(event.clone()))? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error(msg) => Err(IpcError::DaemonError(msg)),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }

    /// Ping the daemon, returning `(uptime_secs, events_count)`
    pub fn ping(&self) -> Result<(u64, u64), IpcError> {
        match self.send(&IpcMessage::Ping)? {
            IpcResponse::Pong {
                uptime_secs,
                events_count,
            } => Ok((uptime_secs, events_count)),
            IpcResponse::Error(msg) => Err(IpcError::DaemonError(msg)),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }
}
