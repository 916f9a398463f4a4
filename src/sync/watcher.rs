use super::importer::Importer;
use super::normalize_root;
use crate::error::{Error, Result};
use crate::shutdown::CancelToken;
use crate::store::MirrorStore;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type EventReceiver = mpsc::Receiver<notify::Result<Event>>;

const TICK: Duration = Duration::from_millis(100);
const MIN_MAX_WAIT: Duration = Duration::from_secs(2);

/// Changes seen since the last import.
#[derive(Debug, Clone, Copy)]
struct Pending {
    first: Instant,
    last: Instant,
}

impl Pending {
    fn new(now: Instant) -> Self {
        Pending { first: now, last: now }
    }

    /// Due after `debounce` of quiet, or once the first change has waited
    /// `max_wait(debounce)` while the tree kept changing.
    fn is_due(&self, now: Instant, debounce: Duration) -> bool {
        now.duration_since(self.last) >= debounce
            || now.duration_since(self.first) >= max_wait(debounce)
    }
}

fn max_wait(debounce: Duration) -> Duration {
    (debounce * 4).max(MIN_MAX_WAIT)
}

/// Re-imports the mirror root after local changes settle.
pub struct DiskWatcher<S> {
    importer: Importer<S>,
    root: PathBuf,
    debounce: Duration,
}

impl<S> DiskWatcher<S>
where
    S: MirrorStore + Send + 'static,
{
    pub fn new(importer: Importer<S>, root: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
        let root = normalize_root(&root.into())?;
        Ok(DiskWatcher {
            importer,
            root,
            debounce,
        })
    }

    /// Watches until `cancel` is set. Failed imports are logged and the
    /// watch goes on; losing the watch itself ends the loop with an error.
    pub fn run(self, cancel: &CancelToken) -> Result<()> {
        let (watcher, rx) = self.watch()?;
        self.process(watcher, rx, cancel)
    }

    /// Registers the watch on the calling thread, so a root that cannot be
    /// watched is reported here rather than from the background thread.
    pub fn spawn(self, cancel: CancelToken) -> Result<JoinHandle<Result<()>>> {
        let (watcher, rx) = self.watch()?;
        let handle = thread::Builder::new()
            .name("disk-watcher".to_string())
            .spawn(move || self.process(watcher, rx, &cancel))?;
        Ok(handle)
    }

    fn watch(&self) -> Result<(RecommendedWatcher, EventReceiver)> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // The receiver is gone once the loop has returned.
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        info!("Watching {} for changes", self.root.display());
        Ok((watcher, rx))
    }

    // `_watcher` must outlive the loop or the event channel closes.
    fn process(self, _watcher: RecommendedWatcher, rx: EventReceiver, cancel: &CancelToken) -> Result<()> {
        let mut pending: Option<Pending> = None;

        while !cancel.is_cancelled() {
            match rx.recv_timeout(TICK) {
                Ok(Ok(event)) => {
                    if is_relevant(&event) {
                        debug!(kind = ?event.kind, paths = ?event.paths, "Disk change");
                        let now = Instant::now();
                        match pending.as_mut() {
                            Some(pending) => pending.last = now,
                            None => pending = Some(Pending::new(now)),
                        }
                    }
                }
                Ok(Err(err)) => warn!("Watch error: {}", err),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    return Err(Error::Watch(notify::Error::generic(
                        "watcher channel disconnected",
                    )));
                }
            }

            if pending.is_some_and(|pending| pending.is_due(Instant::now(), self.debounce)) {
                pending = None;
                match self.importer.import_tree(&self.root) {
                    Ok(result) if !result.persisted => error!(
                        "Watch import of {} was rolled back, {} directories and {} files not saved",
                        self.root.display(),
                        result.directories_added,
                        result.files_added
                    ),
                    Ok(result) => debug!(
                        "Watch import added {} directories and {} files",
                        result.directories_added, result.files_added
                    ),
                    Err(err) => error!("Watch import of {} failed: {}", self.root.display(), err),
                }
            }
        }

        info!("Stopped watching {}", self.root.display());
        Ok(())
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    )
}
