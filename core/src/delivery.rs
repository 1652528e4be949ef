//! Delivery routing
//!
//! Two stages. Stage one hands each event to the daemon on its own
//! connection. Stage two writes the whole batch to the local store, and runs
//! only when stage one delivered nothing, so a batch is never split between
//! the two paths.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ipc::{IpcClient, IpcError};
use crate::project;
use crate::store::EventStore;
use crate::types::CaptureEvent;

/// Remote hand-off of single events.
pub trait Transport {
    /// Whether an endpoint appears to exist at all.
    fn available(&self) -> bool;

    /// Deliver one event; `Ok` only on explicit acceptance.
    fn send(&self, event: &CaptureEvent) -> std::result::Result<(), IpcError>;
}

impl Transport for IpcClient {
    fn available(&self) -> bool {
        self.daemon_available()
    }

    fn send(&self, event: &CaptureEvent) -> std::result::Result<(), IpcError> {
        self.capture(event)
    }
}

/// Events accepted by each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub via_daemon: usize,
    pub via_local: usize,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.via_daemon + self.via_local
    }
}

/// Whether the local store must take the batch, given stage one's count.
pub fn needs_fallback(via_daemon: usize) -> bool {
    via_daemon == 0
}

pub struct DeliveryRouter<T: Transport = IpcClient> {
    transport: T,
    project_root: Option<PathBuf>,
    config: Config,
}

impl DeliveryRouter<IpcClient> {
    /// Router over the configured daemon socket.
    pub fn from_config(config: Config, project_root: Option<PathBuf>) -> Self {
        Self::new(IpcClient::from_config(&config), config, project_root)
    }
}

impl<T: Transport> DeliveryRouter<T> {
    pub fn new(transport: T, config: Config, project_root: Option<PathBuf>) -> Self {
        Self {
            transport,
            project_root,
            config,
        }
    }

    /// Deliver a batch. Only local storage failures are returned as errors.
    pub fn deliver(&self, events: &[CaptureEvent]) -> Result<DeliveryReport> {
        if events.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let via_daemon = self.send_all(events);
        if !needs_fallback(via_daemon) {
            debug!("Delivered {}/{} events via daemon", via_daemon, events.len());
            return Ok(DeliveryReport {
                via_daemon,
                via_local: 0,
            });
        }

        let via_local = self.store_all(events)?;
        Ok(DeliveryReport {
            via_daemon: 0,
            via_local,
        })
    }

    /// Stage one: one daemon round-trip per event. Failures are skipped.
    pub fn send_all(&self, events: &[CaptureEvent]) -> usize {
        if !self.transport.available() {
            debug!("Daemon not running, skipping IPC delivery");
            return 0;
        }

        events
            .iter()
            .filter(|event| match self.transport.send(event) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Failed to deliver {} event for {}: {}",
                        event.tool_name,
                        event.file_path.as_deref().unwrap_or("(no file)"),
                        e
                    );
                    false
                }
            })
            .count()
    }

    /// Stage two: insert every event locally. Without a project marker the
    /// batch is dropped and 0 is returned.
    pub fn store_all(&self, events: &[CaptureEvent]) -> Result<usize> {
        let root = match &self.project_root {
            Some(root) if project::project_dir(root).is_dir() => root,
            _ => {
                debug!("No project marker, dropping {} events", events.len());
                return Ok(0);
            }
        };

        let store = EventStore::open(root, &self.config)?;
        for event in events {
            store.insert(event)?;
        }
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;

    /// Transport answering from a scripted list of outcomes.
    struct FakeTransport {
        available: bool,
        outcomes: RefCell<VecDeque<bool>>,
        sent: RefCell<usize>,
    }

    impl FakeTransport {
        fn new(available: bool, outcomes: &[bool]) -> Self {
            Self {
                available,
                outcomes: RefCell::new(outcomes.iter().copied().collect()),
                sent: RefCell::new(0),
            }
        }
    }

    impl Transport for FakeTransport {
        fn available(&self) -> bool {
            self.available
        }

        fn send(&self, _event: &CaptureEvent) -> std::result::Result<(), IpcError> {
            *self.sent.borrow_mut() += 1;
            match self.outcomes.borrow_mut().pop_front() {
                Some(true) => Ok(()),
                _ => Err(IpcError::DaemonError("rejected".into())),
            }
        }
    }

    fn batch(n: usize) -> Vec<CaptureEvent> {
        (0..n)
            .map(|i| {
                let mut event = CaptureEvent::new("Write", Operation::Create);
                event.file_path = Some(format!("src/{}.rs", i));
                event
            })
            .collect()
    }

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(project::PROJECT_DIR)).unwrap();
        tmp
    }

    fn local_count(root: &std::path::Path) -> u64 {
        EventStore::open(root, &Config::default())
            .unwrap()
            .event_count()
            .unwrap()
    }

    #[test]
    fn test_needs_fallback() {
        assert!(needs_fallback(0));
        assert!(!needs_fallback(1));
    }

    #[test]
    fn test_daemon_takes_whole_batch() {
        let tmp = project();
        let router = DeliveryRouter::new(
            FakeTransport::new(true, &[true, true, true]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        let report = router.deliver(&batch(3)).unwrap();
        assert_eq!(report, DeliveryReport { via_daemon: 3, via_local: 0 });
        assert!(!project::db_path(tmp.path()).exists());
    }

    #[test]
    fn test_partial_daemon_success_is_not_replayed() {
        let tmp = project();
        let router = DeliveryRouter::new(
            FakeTransport::new(true, &[false, true, false]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        let report = router.deliver(&batch(3)).unwrap();
        assert_eq!(report, DeliveryReport { via_daemon: 1, via_local: 0 });
        assert_eq!(*router.transport.sent.borrow(), 3);
        assert!(!project::db_path(tmp.path()).exists());
    }

    #[test]
    fn test_unavailable_daemon_falls_back() {
        let tmp = project();
        let router = DeliveryRouter::new(
            FakeTransport::new(false, &[]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        let report = router.deliver(&batch(2)).unwrap();
        assert_eq!(report, DeliveryReport { via_daemon: 0, via_local: 2 });
        assert_eq!(*router.transport.sent.borrow(), 0);
        assert_eq!(local_count(tmp.path()), 2);
    }

    #[test]
    fn test_all_rejected_falls_back() {
        let tmp = project();
        let router = DeliveryRouter::new(
            FakeTransport::new(true, &[false, false]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        let report = router.deliver(&batch(2)).unwrap();
        assert_eq!(report.via_local, 2);
        assert_eq!(local_count(tmp.path()), 2);
    }

    #[test]
    fn test_no_marker_drops_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let router = DeliveryRouter::new(
            FakeTransport::new(false, &[]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        assert_eq!(router.deliver(&batch(2)).unwrap().delivered(), 0);
        assert!(!project::project_dir(tmp.path()).exists());

        let rootless = DeliveryRouter::new(FakeTransport::new(false, &[]), Config::default(), None);
        assert_eq!(rootless.deliver(&batch(1)).unwrap().delivered(), 0);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let tmp = project();
        // A directory where the database file should be
        fs::create_dir(project::db_path(tmp.path())).unwrap();
        let router = DeliveryRouter::new(
            FakeTransport::new(false, &[]),
            Config::default(),
            Some(tmp.path().to_path_buf()),
        );

        assert!(router.deliver(&batch(1)).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let router = DeliveryRouter::new(FakeTransport::new(true, &[]), Config::default(), None);
        assert_eq!(router.deliver(&[]).unwrap(), DeliveryReport::default());
        assert_eq!(*router.transport.sent.borrow(), 0);
    }
}
