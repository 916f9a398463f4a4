use super::normalize_root;
use crate::error::{Error, Result};
use crate::store::{lock_store, MirrorStore, SharedStore};
use crate::tree::{path, DirectoryNode, FileNode, MirrorTree};
use glob::Pattern;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct ImportResult {
    pub tree: MirrorTree,
    pub directories_added: usize,
    pub files_added: usize,
    pub bytes_added: u64,
    /// Whether the final save committed.
    pub persisted: bool,
    pub duration: Duration,
}

/// Scans a disk subtree and adds every directory and file the store does not
/// know yet. Entries are identified by their path below the mirror root;
/// files already in the store are never re-read.
pub struct Importer<S> {
    store: SharedStore<S>,
    ignore_patterns: Vec<Pattern>,
}

impl<S> Clone for Importer<S> {
    fn clone(&self) -> Self {
        Importer {
            store: Arc::clone(&self.store),
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }
}

impl<S: MirrorStore> Importer<S> {
    pub fn new(store: SharedStore<S>) -> Self {
        Importer {
            store,
            ignore_patterns: Vec::new(),
        }
    }

    /// Entries whose absolute path matches one of `globs` are skipped along
    /// with everything below them. Invalid patterns are logged and ignored.
    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    error!("Invalid glob pattern '{}': {}", glob, err);
                    None
                }
            })
            .collect();
        self
    }

    /// Runs one import pass against `disk_root`.
    ///
    /// The additions are saved in a single transaction at the end. When an
    /// entry cannot be scanned the pass stops there, whatever was queued
    /// before it is still saved, and the scan error is returned.
    pub fn import_tree(&self, disk_root: &Path) -> Result<ImportResult> {
        let start = Instant::now();
        let root = normalize_root(disk_root)?;

        let mut store = lock_store(&self.store)?;
        let mut tree = store.load_tree()?;
        let directories_before = tree.directory_count();
        let files_before = tree.file_count();

        let mut bytes_added = 0u64;
        let scanned = self.scan(&root, &mut tree, &mut bytes_added);

        let persisted = store.persist_tree(&mut tree);
        let directories_added = tree.directory_count() - directories_before;
        let files_added = tree.file_count() - files_before;

        if let Err(err) = scanned {
            error!(
                "Import of {} aborted after queuing {} directories and {} files: {}",
                root.display(),
                directories_added,
                files_added,
                err
            );
            return Err(err);
        }

        let duration = start.elapsed();
        info!(
            "Imported {} directories and {} files ({} bytes) from {} in {:.2}s",
            directories_added,
            files_added,
            bytes_added,
            root.display(),
            duration.as_secs_f64()
        );

        Ok(ImportResult {
            tree,
            directories_added,
            files_added,
            bytes_added,
            persisted,
            duration,
        })
    }

    fn scan(&self, root: &Path, tree: &mut MirrorTree, bytes_added: &mut u64) -> Result<()> {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry.path()));

        for entry in walker {
            let entry = entry.map_err(|err| Error::Scan {
                path: err.path().unwrap_or(root).to_path_buf(),
                reason: err.to_string(),
            })?;

            // The root itself has no relative path.
            let Some(relative_path) = path::relative_to(root, entry.path()) else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if !tree.exists_directory(&relative_path)
                    && tree
                        .add_directory(&relative_path, DirectoryNode::new(name))
                        .is_some()
                {
                    debug!("New directory {}", relative_path);
                }
            } else if file_type.is_file() {
                if tree.exists_file(&relative_path) {
                    continue;
                }
                let content = fs::read(entry.path()).map_err(|err| Error::Scan {
                    path: entry.path().to_path_buf(),
                    reason: err.to_string(),
                })?;
                let size = content.len() as u64;
                if tree
                    .add_file(&relative_path, FileNode::new(name, content))
                    .is_some()
                {
                    *bytes_added += size;
                    debug!("New file {} ({} bytes)", relative_path, size);
                }
            } else {
                return Err(Error::Scan {
                    path: entry.path().to_path_buf(),
                    reason: "neither a directory nor a file".to_string(),
                });
            }
        }

        Ok(())
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}
