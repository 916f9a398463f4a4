//! Store client and change-notification contracts.
//!
//! [`MirrorStore`] is the relational store the mirror is persisted into;
//! [`NotificationSource`] is the publish/subscribe channel that announces
//! newly inserted file rows. Both have a PostgreSQL implementation and an
//! in-process one.

mod memory;
mod pg;

pub use memory::{MemoryNotifications, MemoryStore};
pub use pg::{PgNotifications, PgStore};

use crate::db::models::{DirectoryRecord, FileRecord};
use crate::error::{Error, Result};
use crate::tree::{DirId, MirrorTree, SavedIds};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Store client shared by the importer, restorer and listener.
pub type SharedStore<S> = Arc<Mutex<S>>;

pub fn shared<S>(store: S) -> SharedStore<S> {
    Arc::new(Mutex::new(store))
}

pub fn lock_store<S>(store: &SharedStore<S>) -> Result<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| Error::Store("store lock poisoned".to_string()))
}

/// A persisted file together with its location below the mirror root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: i64,
    /// Directory names from below the mirror root down to the file's parent.
    pub directories: Vec<String>,
    pub name: String,
    pub size: u64,
}

impl StoredFile {
    pub fn relative_path(&self) -> String {
        self.segments().collect::<Vec<_>>().join("/")
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.directories
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
    }
}

/// One event from the change-notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationEvent {
    pub file_id: i64,
}

impl NotificationEvent {
    pub fn from_payload(payload: &str) -> Result<Self> {
        payload
            .trim()
            .parse::<i64>()
            .map(|file_id| NotificationEvent { file_id })
            .map_err(|err| Error::Notification(format!("invalid payload '{}': {}", payload, err)))
    }
}

pub trait NotificationSource {
    /// Returns whatever arrived since the previous poll without blocking.
    fn poll(&mut self) -> Result<Vec<NotificationEvent>>;
}

pub trait MirrorStore {
    fn load_directories(&mut self) -> Result<Vec<DirectoryRecord>>;

    /// File rows without content.
    fn load_files(&mut self) -> Result<Vec<FileRecord>>;

    fn insert_directory(&mut self, parent_id: Option<i64>, name: &str) -> Result<i64>;

    fn insert_file(&mut self, parent_id: i64, name: &str, size: i64, content: &[u8]) -> Result<i64>;

    fn find_directory(&mut self, id: i64) -> Result<Option<DirectoryRecord>>;

    fn find_file(&mut self, id: i64) -> Result<Option<FileRecord>>;

    fn read_content(&mut self, file_id: i64) -> Result<Vec<u8>>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn commit_transaction(&mut self) -> Result<()>;

    fn rollback_transaction(&mut self) -> Result<()>;

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction() {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Loads the mirror root and everything below it, without file content.
    /// An empty store yields a fresh, unsaved root.
    fn load_tree(&mut self) -> Result<MirrorTree> {
        let directories = self.load_directories()?;
        let files = self.load_files()?;
        debug!(
            "Loaded {} directory rows and {} file rows",
            directories.len(),
            files.len()
        );
        Ok(MirrorTree::from_records(directories, files))
    }

    /// Inserts every node of `tree` that has no store id yet, parents first.
    /// The returned ids are not applied to `tree`; see [`MirrorStore::persist_tree`].
    fn save_tree(&mut self, tree: &MirrorTree) -> Result<SavedIds> {
        let mut saved = SavedIds::default();
        let mut store_ids: HashMap<DirId, i64> = HashMap::new();

        for (id, directory) in tree.directories() {
            let store_id = match directory.store_id() {
                Some(store_id) => store_id,
                None => {
                    let parent_id = match directory.parent() {
                        Some(parent) => Some(store_ids.get(&parent).copied().ok_or_else(|| {
                            Error::Integrity(format!(
                                "parent of directory '{}' was not saved",
                                directory.name()
                            ))
                        })?),
                        None => None,
                    };
                    let store_id = self.insert_directory(parent_id, directory.name())?;
                    saved.directories.push((id, store_id));
                    store_id
                }
            };
            store_ids.insert(id, store_id);
        }

        for (id, file) in tree.files() {
            if file.store_id().is_some() {
                continue;
            }
            let parent_id = file
                .parent()
                .and_then(|parent| store_ids.get(&parent).copied())
                .ok_or_else(|| {
                    Error::Integrity(format!("file '{}' has no saved parent", file.name()))
                })?;
            let content = file.content().ok_or_else(|| {
                Error::Integrity(format!("file '{}' has no content to save", file.name()))
            })?;
            let store_id = self.insert_file(parent_id, file.name(), file.size() as i64, content)?;
            saved.files.push((id, store_id));
        }

        Ok(saved)
    }

    /// Saves `tree` in one transaction. On failure the transaction is rolled
    /// back, the error is logged and `false` is returned.
    fn persist_tree(&mut self, tree: &mut MirrorTree) -> bool
    where
        Self: Sized,
    {
        match self.transaction(|store| store.save_tree(tree)) {
            Ok(saved) => {
                debug!(
                    "Saved {} directories and {} files",
                    saved.directories.len(),
                    saved.files.len()
                );
                tree.apply_saved(&saved);
                true
            }
            Err(err) => {
                error!("Error saving mirror tree: {}", err);
                false
            }
        }
    }

    /// Primary-key lookup of a file plus the names of its ancestors.
    fn locate_file(&mut self, id: i64) -> Result<Option<StoredFile>> {
        let Some(record) = self.find_file(id)? else {
            return Ok(None);
        };

        let mut directories = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(record.parent_id);
        while let Some(directory_id) = next {
            if !visited.insert(directory_id) {
                return Err(Error::Integrity(format!(
                    "directory {} is its own ancestor",
                    directory_id
                )));
            }
            let directory = self.find_directory(directory_id)?.ok_or_else(|| {
                Error::Integrity(format!("file {} has a dangling parent {}", id, directory_id))
            })?;
            next = directory.parent_id;
            // The mirror root contributes no segment.
            if next.is_some() {
                directories.push(directory.name);
            }
        }
        directories.reverse();

        if record.size < 0 {
            warn!(id, size = record.size, "Negative size stored for file");
        }

        Ok(Some(StoredFile {
            id,
            directories,
            name: record.name,
            size: record.size.max(0) as u64,
        }))
    }
}
