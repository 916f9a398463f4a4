use super::normalize_root;
use super::restorer::{restore_file, RestoreReport};
use crate::error::Result;
use crate::shutdown::CancelToken;
use crate::store::{lock_store, MirrorStore, NotificationSource, SharedStore};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Restores files announced on the new-file channel.
///
/// Each batch of events is handled in one store transaction: the file row is
/// looked up by id, its ancestors give the disk path, and the file is written
/// unless something already exists there.
pub struct NotificationListener<S, N> {
    store: SharedStore<S>,
    notifications: N,
    disk_root: PathBuf,
    poll_interval: Duration,
}

impl<S, N> NotificationListener<S, N>
where
    S: MirrorStore + Send + 'static,
    N: NotificationSource + Send + 'static,
{
    pub fn new(store: SharedStore<S>, notifications: N, disk_root: impl Into<PathBuf>) -> Result<Self> {
        let disk_root = normalize_root(&disk_root.into())?;
        Ok(NotificationListener {
            store,
            notifications,
            disk_root,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Drains pending notifications and restores the announced files.
    pub fn poll_once(&mut self) -> Result<RestoreReport> {
        let events = self.notifications.poll()?;
        let mut report = RestoreReport::default();
        if events.is_empty() {
            return Ok(report);
        }
        debug!("Handling {} notifications", events.len());

        let disk_root = &self.disk_root;
        let mut store = lock_store(&self.store)?;
        store.transaction(|store| {
            for event in &events {
                match store.locate_file(event.file_id)? {
                    Some(file) => {
                        let outcome = restore_file(store, disk_root, &file);
                        debug!(id = file.id, path = %file.relative_path(), ?outcome, "Notified file");
                        report.record(outcome);
                    }
                    None => {
                        warn!("Notified file {} is not in the store, skipping", event.file_id);
                    }
                }
            }
            Ok(())
        })?;

        Ok(report)
    }

    /// Polls until `cancel` is set. Any error ends the loop and is returned.
    pub fn run(mut self, cancel: &CancelToken) -> Result<()> {
        info!(
            "Notification listener started for {} (poll every {:?})",
            self.disk_root.display(),
            self.poll_interval
        );

        while !cancel.is_cancelled() {
            match self.poll_once() {
                Ok(report) if report.files_restored > 0 => {
                    info!("Restored {} notified files", report.files_restored);
                }
                Ok(_) => {}
                Err(err) => {
                    error!("Notification listener stopped: {}", err);
                    return Err(err);
                }
            }
            if cancel.sleep(self.poll_interval) {
                break;
            }
        }

        info!("Notification listener stopped");
        Ok(())
    }

    pub fn spawn(self, cancel: CancelToken) -> Result<JoinHandle<Result<()>>> {
        let handle = thread::Builder::new()
            .name("notification-listener".to_string())
            .spawn(move || self.run(&cancel))?;
        Ok(handle)
    }
}
