//! Long-running mirror: startup restore and import, then the notification
//! listener and (optionally) the disk watcher on their own threads.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::shutdown::CancelToken;
use crate::store::{MirrorStore, NotificationSource, SharedStore};
use crate::sync::{
    listener, normalize_root, DiskWatcher, ImportResult, Importer, NotificationListener,
    RestoreReport, Restorer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub watch: bool,
    pub watch_debounce: Duration,
    pub ignore_patterns: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval: listener::DEFAULT_POLL_INTERVAL,
            watch: true,
            watch_debounce: Duration::from_millis(500),
            ignore_patterns: Vec::new(),
        }
    }
}

impl From<&AppConfig> for SyncSettings {
    fn from(config: &AppConfig) -> Self {
        SyncSettings {
            poll_interval: config.poll_interval(),
            watch: config.app.watch,
            watch_debounce: config.watch_debounce(),
            ignore_patterns: config.app.ignore_patterns.clone(),
        }
    }
}

#[derive(Debug)]
pub struct InitialSync {
    pub restored: RestoreReport,
    /// `None` when the import scan failed; whatever it queued was still saved.
    pub imported: Option<ImportResult>,
}

pub struct Daemon<S> {
    store: SharedStore<S>,
    root: PathBuf,
    settings: SyncSettings,
}

impl<S> Daemon<S>
where
    S: MirrorStore + Send + 'static,
{
    pub fn new(store: SharedStore<S>, root: &Path, settings: SyncSettings) -> Result<Self> {
        let root = normalize_root(root)?;
        Ok(Daemon {
            store,
            root,
            settings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn importer(&self) -> Importer<S> {
        Importer::new(Arc::clone(&self.store)).with_ignore_patterns(&self.settings.ignore_patterns)
    }

    pub fn restorer(&self) -> Restorer<S> {
        Restorer::new(Arc::clone(&self.store))
    }

    /// Restore first so files known only to the store land on disk, then
    /// import whatever the disk has that the store lacks.
    pub fn initial_sync(&self) -> Result<InitialSync> {
        let restored = self.restorer().restore_tree(&self.root)?;
        let imported = match self.importer().import_tree(&self.root) {
            Ok(result) => Some(result),
            Err(err @ Error::Scan { .. }) => {
                warn!("Startup import incomplete: {}", err);
                None
            }
            Err(err) => return Err(err),
        };
        Ok(InitialSync { restored, imported })
    }

    /// Runs the initial sync and starts the background threads.
    pub fn start<N>(self, notifications: N, cancel: CancelToken) -> Result<DaemonHandle>
    where
        N: NotificationSource + Send + 'static,
    {
        let initial = self.initial_sync()?;
        info!(
            "Startup sync of {}: {} files restored, {} files imported",
            self.root.display(),
            initial.restored.files_restored,
            initial.imported.as_ref().map_or(0, |result| result.files_added)
        );

        let listener = NotificationListener::new(Arc::clone(&self.store), notifications, &self.root)?
            .with_poll_interval(self.settings.poll_interval)
            .spawn(cancel.clone())?;

        let watcher = if self.settings.watch {
            let watcher = DiskWatcher::new(self.importer(), &self.root, self.settings.watch_debounce)?;
            match watcher.spawn(cancel.clone()) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    error!("Cannot start the disk watcher: {}", err);
                    cancel.cancel();
                    log_outcome("notification listener", listener);
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(DaemonHandle {
            listener,
            watcher,
            cancel,
        })
    }
}

pub struct DaemonHandle {
    listener: JoinHandle<Result<()>>,
    watcher: Option<JoinHandle<Result<()>>>,
    cancel: CancelToken,
}

impl DaemonHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_listener_finished(&self) -> bool {
        self.listener.is_finished()
    }

    /// Cancels the background threads and waits for them.
    pub fn shutdown(self) {
        info!("Shutting down");
        self.cancel.cancel();
        self.join();
    }

    /// Waits for the background threads without cancelling them.
    pub fn join(self) {
        log_outcome("notification listener", self.listener);
        if let Some(watcher) = self.watcher {
            log_outcome("disk watcher", watcher);
        }
    }
}

fn log_outcome(name: &str, handle: JoinHandle<Result<()>>) {
    match handle.join() {
        Ok(Ok(())) => info!("{} finished", name),
        Ok(Err(err)) => error!("{} failed: {}", name, err),
        Err(_) => error!("{} panicked", name),
    }
}
