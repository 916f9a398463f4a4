use super::normalize_root;
use crate::error::Result;
use crate::store::{lock_store, MirrorStore, SharedStore, StoredFile};
use crate::tree::{path, DirId, MirrorTree};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRestore {
    Restored,
    /// Something already exists at the target path; it is left untouched.
    AlreadyPresent,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub directories_created: usize,
    pub files_restored: usize,
    pub files_present: usize,
    pub failures: usize,
}

impl RestoreReport {
    pub fn record(&mut self, outcome: FileRestore) {
        match outcome {
            FileRestore::Restored => self.files_restored += 1,
            FileRestore::AlreadyPresent => self.files_present += 1,
            FileRestore::Failed => self.failures += 1,
        }
    }
}

/// Recreates on disk whatever the store holds and the disk lacks. Existing
/// disk entries are never overwritten.
pub struct Restorer<S> {
    store: SharedStore<S>,
}

impl<S> Clone for Restorer<S> {
    fn clone(&self) -> Self {
        Restorer {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MirrorStore> Restorer<S> {
    pub fn new(store: SharedStore<S>) -> Self {
        Restorer { store }
    }

    /// Full restore pass over the stored tree. Failures on single
    /// directories or files are logged and counted; only failing to load the
    /// tree is an error.
    pub fn restore_tree(&self, disk_root: &Path) -> Result<RestoreReport> {
        let start = Instant::now();
        let root = normalize_root(disk_root)?;

        let mut store = lock_store(&self.store)?;
        let tree = store.load_tree()?;
        let mut report = RestoreReport::default();

        if tree.directory(tree.root()).store_id().is_none() {
            info!("Store holds no mirror root yet, nothing to restore");
            return Ok(report);
        }

        restore_directory(&mut *store, &tree, tree.root(), &root, &mut report);

        info!(
            "Restored {} directories and {} files into {} in {:.2}s ({} already present, {} failures)",
            report.directories_created,
            report.files_restored,
            root.display(),
            start.elapsed().as_secs_f64(),
            report.files_present,
            report.failures
        );
        Ok(report)
    }

    /// Single-file restore, in its own transaction.
    pub fn restore_file(&self, disk_root: &Path, file: &StoredFile) -> Result<FileRestore> {
        let root = normalize_root(disk_root)?;
        let mut store = lock_store(&self.store)?;
        store.transaction(|store| Ok(restore_file(store, &root, file)))
    }
}

fn restore_directory<S: MirrorStore>(
    store: &mut S,
    tree: &MirrorTree,
    dir: DirId,
    root: &Path,
    report: &mut RestoreReport,
) {
    let node = tree.directory(dir);

    for (_, child) in node.subdirectories() {
        let target = path::disk_path(root, tree.segments(child));
        let existed = target.is_dir();
        match fs::create_dir_all(&target) {
            Ok(()) => {
                if !existed {
                    debug!("Created directory {}", target.display());
                    report.directories_created += 1;
                }
                restore_directory(store, tree, child, root, report);
            }
            Err(err) => {
                error!("Error creating directory {}: {}", target.display(), err);
                report.failures += 1;
            }
        }
    }

    let files: Vec<StoredFile> = node
        .files()
        .filter_map(|(_, file)| tree.stored_file(file))
        .collect();
    if files.is_empty() {
        return;
    }

    // One transaction per directory's batch of files.
    let result = store.transaction(|store| {
        for file in &files {
            report.record(restore_file(store, root, file));
        }
        Ok(())
    });
    if let Err(err) = result {
        error!(
            "Error restoring files of {}: {}",
            tree.path_with_name(dir),
            err
        );
        report.failures += 1;
    }
}

/// Writes one stored file under `disk_root` unless something already exists
/// at its path. Errors are logged and reported as [`FileRestore::Failed`].
pub fn restore_file<S: MirrorStore>(store: &mut S, disk_root: &Path, file: &StoredFile) -> FileRestore {
    let target = path::disk_path(disk_root, file.segments());
    if target.exists() {
        debug!("{} already present", target.display());
        return FileRestore::AlreadyPresent;
    }

    match write_file(store, &target, file) {
        Ok(written) => {
            debug!("Restored {} ({} bytes)", target.display(), written);
            FileRestore::Restored
        }
        Err(err) => {
            error!("Error restoring {}: {}", target.display(), err);
            FileRestore::Failed
        }
    }
}

fn write_file<S: MirrorStore>(store: &mut S, target: &Path, file: &StoredFile) -> Result<usize> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = store.read_content(file.id)?;
    if content.len() as u64 != file.size {
        warn!(
            id = file.id,
            size = file.size,
            content_len = content.len(),
            "Stored size does not match stored content"
        );
    }
    fs::write(target, &content)?;
    Ok(content.len())
}
