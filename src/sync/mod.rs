//! Disk/store synchronization: import (disk to store), restore (store to
//! disk), the change-notification listener and the disk watcher.

pub mod importer;
pub mod listener;
pub mod restorer;
pub mod watcher;

pub use importer::{ImportResult, Importer};
pub use listener::NotificationListener;
pub use restorer::{FileRestore, RestoreReport, Restorer};
pub use watcher::DiskWatcher;

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Absolute, symlink-free form of the mirrored root, which must be an
/// existing directory.
pub fn normalize_root(disk_root: &Path) -> Result<PathBuf> {
    match fs::canonicalize(disk_root) {
        Ok(root) if root.is_dir() => Ok(root),
        _ => Err(Error::MirrorRootMissing(disk_root.to_path_buf())),
    }
}
