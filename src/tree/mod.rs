//! In-memory model of the mirrored hierarchy.
//!
//! Nodes live in two arenas owned by [`MirrorTree`]; parent and child links
//! are arena indices, so a child refers to its parent without owning it.
//! Store identifiers are kept on the nodes and stay `None` until the node has
//! been persisted.

pub mod path;

use crate::db::models::{DirectoryRecord, FileRecord};
use crate::store::StoredFile;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::warn;

pub use path::ROOT_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

#[derive(Debug, Clone)]
pub struct DirectoryNode {
    store_id: Option<i64>,
    name: String,
    parent: Option<DirId>,
    subdirectories: BTreeMap<String, DirId>,
    files: BTreeMap<String, FileId>,
}

impl DirectoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        DirectoryNode {
            store_id: None,
            name: name.into(),
            parent: None,
            subdirectories: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn store_id(&self) -> Option<i64> {
        self.store_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    pub fn subdirectories(&self) -> impl Iterator<Item = (&str, DirId)> + '_ {
        self.subdirectories
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, FileId)> + '_ {
        self.files.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn subdirectory(&self, name: &str) -> Option<DirId> {
        self.subdirectories.get(name).copied()
    }

    pub fn file(&self, name: &str) -> Option<FileId> {
        self.files.get(name).copied()
    }

    /// Number of direct children, directories and files together.
    pub fn size(&self) -> usize {
        self.subdirectories.len() + self.files.len()
    }
}

#[derive(Debug, Clone)]
pub struct FileNode {
    store_id: Option<i64>,
    name: String,
    size: u64,
    content: Option<Vec<u8>>,
    parent: Option<DirId>,
}

impl FileNode {
    /// A detached file holding its full content; `size` is the content length.
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        FileNode {
            store_id: None,
            name: name.into(),
            size: content.len() as u64,
            content: Some(content),
            parent: None,
        }
    }

    /// Metadata-only node for a row already in the store.
    fn from_record(record: FileRecord) -> Self {
        FileNode {
            store_id: Some(record.id),
            name: record.name,
            size: record.size.max(0) as u64,
            content: None,
            parent: None,
        }
    }

    pub fn store_id(&self) -> Option<i64> {
        self.store_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Content read at import time. `None` for nodes loaded from the store,
    /// whose content is fetched on demand.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }
}

/// Store identifiers handed out by one save, applied once it has committed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SavedIds {
    pub directories: Vec<(DirId, i64)>,
    pub files: Vec<(FileId, i64)>,
}

impl SavedIds {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MirrorTree {
    // Parents always precede their children in `directories`.
    directories: Vec<DirectoryNode>,
    files: Vec<FileNode>,
}

impl Default for MirrorTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorTree {
    /// A tree holding only an unsaved mirror root.
    pub fn new() -> Self {
        MirrorTree {
            directories: vec![DirectoryNode::new(ROOT_NAME)],
            files: Vec::new(),
        }
    }

    /// Rebuilds the hierarchy from store rows. The parentless directory with
    /// the lowest id becomes the mirror root; rows that cannot be reached
    /// from it are skipped.
    pub fn from_records(directories: Vec<DirectoryRecord>, files: Vec<FileRecord>) -> Self {
        let mut tree = MirrorTree::new();

        let mut children: HashMap<Option<i64>, Vec<DirectoryRecord>> = HashMap::new();
        for record in directories {
            children.entry(record.parent_id).or_default().push(record);
        }

        let mut roots = children.remove(&None).unwrap_or_default();
        roots.sort_by_key(|record| record.id);
        let mut roots = roots.into_iter();
        let root_record = match roots.next() {
            Some(record) => record,
            None => {
                if !files.is_empty() {
                    warn!("{} file rows found without a mirror root", files.len());
                }
                return tree;
            }
        };
        for extra in roots {
            warn!(id = extra.id, name = %extra.name, "Ignoring additional parentless directory");
        }

        let root = tree.root();
        tree.directories[root.0].store_id = Some(root_record.id);
        tree.directories[root.0].name = root_record.name;

        let mut by_store_id: HashMap<i64, DirId> = HashMap::new();
        by_store_id.insert(root_record.id, root);

        let mut queue = VecDeque::from([(root_record.id, root)]);
        while let Some((store_id, dir)) = queue.pop_front() {
            let Some(mut records) = children.remove(&Some(store_id)) else {
                continue;
            };
            records.sort_by(|a, b| a.name.cmp(&b.name));
            for record in records {
                let mut node = DirectoryNode::new(record.name);
                node.store_id = Some(record.id);
                match tree.attach_directory(dir, node) {
                    Some(child) => {
                        by_store_id.insert(record.id, child);
                        queue.push_back((record.id, child));
                    }
                    None => warn!(id = record.id, "Duplicate directory name under one parent"),
                }
            }
        }

        let unreachable: usize = children.values().map(Vec::len).sum();
        if unreachable > 0 {
            warn!(unreachable, "Directory rows unreachable from the mirror root");
        }

        for record in files {
            let id = record.id;
            match by_store_id.get(&record.parent_id) {
                Some(&dir) => {
                    if tree.attach_file(dir, FileNode::from_record(record)).is_none() {
                        warn!(id, "Duplicate file name under one parent");
                    }
                }
                None => warn!(id, "File row has no reachable parent directory"),
            }
        }

        tree
    }

    pub fn root(&self) -> DirId {
        DirId(0)
    }

    pub fn directory(&self, id: DirId) -> &DirectoryNode {
        &self.directories[id.0]
    }

    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.0]
    }

    pub fn directories(&self) -> impl Iterator<Item = (DirId, &DirectoryNode)> + '_ {
        self.directories
            .iter()
            .enumerate()
            .map(|(index, node)| (DirId(index), node))
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &FileNode)> + '_ {
        self.files
            .iter()
            .enumerate()
            .map(|(index, node)| (FileId(index), node))
    }

    /// Directories including the mirror root.
    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Attaches `file` under the directory named by every segment of
    /// `relative_path` except the last, creating intermediate directories on
    /// the way. Nothing is attached when the target directory already holds
    /// a file called `file.name()`.
    pub fn add_file(&mut self, relative_path: &str, file: FileNode) -> Option<FileId> {
        let segments = path::split_relative(relative_path);
        let parent = match segments.split_last() {
            Some((_, ancestors)) => self.descend_or_create(ancestors),
            None => self.root(),
        };
        self.attach_file(parent, file)
    }

    /// Directory counterpart of [`MirrorTree::add_file`].
    pub fn add_directory(&mut self, relative_path: &str, directory: DirectoryNode) -> Option<DirId> {
        let segments = path::split_relative(relative_path);
        let parent = match segments.split_last() {
            Some((_, ancestors)) => self.descend_or_create(ancestors),
            None => self.root(),
        };
        self.attach_directory(parent, directory)
    }

    pub fn exists_file(&self, relative_path: &str) -> bool {
        self.find_file(relative_path).is_some()
    }

    pub fn exists_directory(&self, relative_path: &str) -> bool {
        let segments = path::split_relative(relative_path);
        !segments.is_empty() && self.find_directory(relative_path).is_some()
    }

    pub fn find_file(&self, relative_path: &str) -> Option<FileId> {
        let segments = path::split_relative(relative_path);
        let (name, ancestors) = segments.split_last()?;
        let parent = self.walk(ancestors)?;
        self.directory(parent).file(name)
    }

    /// An empty path resolves to the mirror root.
    pub fn find_directory(&self, relative_path: &str) -> Option<DirId> {
        self.walk(&path::split_relative(relative_path))
    }

    /// Path of the directory holding `dir`, e.g. `/a/` for `/a/b`.
    pub fn path(&self, dir: DirId) -> String {
        match self.directory(dir).parent {
            Some(parent) => path::child_path(&self.path_with_name(parent)),
            None => String::new(),
        }
    }

    pub fn path_with_name(&self, dir: DirId) -> String {
        format!("{}{}", self.path(dir), self.directory(dir).name)
    }

    pub fn file_path(&self, file: FileId) -> String {
        match self.file(file).parent {
            Some(parent) => path::child_path(&self.path_with_name(parent)),
            None => String::new(),
        }
    }

    pub fn file_path_with_name(&self, file: FileId) -> String {
        format!("{}{}", self.file_path(file), self.file(file).name)
    }

    /// Names from below the mirror root down to `dir` itself.
    pub fn segments(&self, dir: DirId) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut current = dir;
        while let Some(parent) = self.directory(current).parent {
            segments.push(self.directory(current).name.as_str());
            current = parent;
        }
        segments.reverse();
        segments
    }

    pub fn file_segments(&self, file: FileId) -> Vec<&str> {
        let node = self.file(file);
        let mut segments = match node.parent {
            Some(parent) => self.segments(parent),
            None => Vec::new(),
        };
        segments.push(node.name.as_str());
        segments
    }

    pub fn relative_path(&self, dir: DirId) -> String {
        self.segments(dir).join("/")
    }

    pub fn file_relative_path(&self, file: FileId) -> String {
        self.file_segments(file).join("/")
    }

    /// Store-side view of a persisted file, used by the restore path.
    pub fn stored_file(&self, file: FileId) -> Option<StoredFile> {
        let node = self.file(file);
        let id = node.store_id?;
        let directories = match node.parent {
            Some(parent) => self.segments(parent).into_iter().map(String::from).collect(),
            None => Vec::new(),
        };
        Some(StoredFile {
            id,
            directories,
            name: node.name.clone(),
            size: node.size,
        })
    }

    pub fn apply_saved(&mut self, saved: &SavedIds) {
        for &(dir, store_id) in &saved.directories {
            self.directories[dir.0].store_id = Some(store_id);
        }
        for &(file, store_id) in &saved.files {
            self.files[file.0].store_id = Some(store_id);
        }
    }

    fn walk(&self, segments: &[&str]) -> Option<DirId> {
        let mut current = self.root();
        for segment in segments {
            current = self.directory(current).subdirectory(segment)?;
        }
        Some(current)
    }

    fn descend_or_create(&mut self, segments: &[&str]) -> DirId {
        let mut current = self.root();
        for segment in segments {
            current = match self.directory(current).subdirectory(segment) {
                Some(existing) => existing,
                None => self.push_directory(current, DirectoryNode::new(*segment)),
            };
        }
        current
    }

    fn attach_directory(&mut self, parent: DirId, directory: DirectoryNode) -> Option<DirId> {
        if self.directory(parent).subdirectories.contains_key(&directory.name) {
            return None;
        }
        Some(self.push_directory(parent, directory))
    }

    fn attach_file(&mut self, parent: DirId, mut file: FileNode) -> Option<FileId> {
        if self.directory(parent).files.contains_key(&file.name) {
            return None;
        }
        let id = FileId(self.files.len());
        file.parent = Some(parent);
        self.directories[parent.0]
            .files
            .insert(file.name.clone(), id);
        self.files.push(file);
        Some(id)
    }

    // Setting the parent and registering in the parent's map happen together.
    fn push_directory(&mut self, parent: DirId, mut directory: DirectoryNode) -> DirId {
        let id = DirId(self.directories.len());
        directory.parent = Some(parent);
        directory.subdirectories.clear();
        directory.files.clear();
        self.directories[parent.0]
            .subdirectories
            .insert(directory.name.clone(), id);
        self.directories.push(directory);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::MAIN_SEPARATOR;

    fn sep(path: &str) -> String {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }

    #[test]
    fn test_new_tree_has_unsaved_root() {
        let tree = MirrorTree::new();
        let root = tree.directory(tree.root());
        assert_eq!(root.name(), ROOT_NAME);
        assert_eq!(root.store_id(), None);
        assert_eq!(root.parent(), None);
        assert_eq!(root.size(), 0);
    }

    #[test]
    fn test_add_file_creates_intermediate_directories() {
        let mut tree = MirrorTree::new();
        let file = tree
            .add_file("a/b/c.txt", FileNode::new("c.txt", b"hello".to_vec()))
            .unwrap();

        assert!(tree.exists_directory("a"));
        assert!(tree.exists_directory("a/b"));
        assert!(tree.exists_file("a/b/c.txt"));
        assert_eq!(tree.file(file).size(), 5);
        assert_eq!(tree.file_relative_path(file), "a/b/c.txt");
        assert_eq!(tree.file_path_with_name(file), sep("/a/b/c.txt"));
        assert_eq!(tree.file_path(file), sep("/a/b/"));
    }

    #[test]
    fn test_add_file_existing_name_is_noop() {
        let mut tree = MirrorTree::new();
        let first = tree.add_file("a/x.txt", FileNode::new("x.txt", b"one".to_vec()));
        let second = tree.add_file("a/x.txt", FileNode::new("x.txt", b"second".to_vec()));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.file(first.unwrap()).content(), Some(&b"one"[..]));
    }

    #[test]
    fn test_add_directory_existing_name_is_noop() {
        let mut tree = MirrorTree::new();
        let first = tree.add_directory("a/b", DirectoryNode::new("b"));
        let second = tree.add_directory("a/b", DirectoryNode::new("b"));

        assert!(first.is_some());
        assert!(second.is_none());
        // root, a, b
        assert_eq!(tree.directory_count(), 3);
    }

    #[test]
    fn test_file_and_directory_may_share_a_name() {
        let mut tree = MirrorTree::new();
        tree.add_directory("x", DirectoryNode::new("x"));
        tree.add_file("x", FileNode::new("x", Vec::new()));

        assert!(tree.exists_directory("x"));
        assert!(tree.exists_file("x"));
        assert_eq!(tree.directory(tree.root()).size(), 2);
    }

    #[test]
    fn test_exists_directory_missing_child() {
        let mut tree = MirrorTree::new();
        tree.add_directory("x", DirectoryNode::new("x"));

        assert!(!tree.exists_directory("x/y"));
        assert!(!tree.exists_file("x/y"));
        assert!(!tree.exists_directory("missing/y"));
    }

    #[test]
    fn test_exists_directory_does_not_match_files() {
        let mut tree = MirrorTree::new();
        tree.add_file("x/y", FileNode::new("y", Vec::new()));

        assert!(tree.exists_file("x/y"));
        assert!(!tree.exists_directory("x/y"));
    }

    #[test]
    fn test_empty_path_is_not_a_directory() {
        let tree = MirrorTree::new();
        assert!(!tree.exists_directory(""));
        assert!(!tree.exists_file(""));
        assert_eq!(tree.find_directory(""), Some(tree.root()));
    }

    #[test]
    fn test_platform_separator_accepted() {
        let mut tree = MirrorTree::new();
        tree.add_file(&sep("a/b.txt"), FileNode::new("b.txt", vec![1, 2, 3]));
        assert!(tree.exists_file("a/b.txt"));
        assert!(tree.exists_file(&sep("a/b.txt")));
    }

    #[test]
    fn test_size_counts_direct_children_only() {
        let mut tree = MirrorTree::new();
        tree.add_file("a/one.txt", FileNode::new("one.txt", Vec::new()));
        tree.add_file("a/deep/two.txt", FileNode::new("two.txt", Vec::new()));
        tree.add_directory("a/empty", DirectoryNode::new("empty"));

        let a = tree.find_directory("a").unwrap();
        assert_eq!(tree.directory(a).size(), 3);
        assert_eq!(tree.directory(tree.root()).size(), 1);
    }

    #[test]
    fn test_directory_paths() {
        let mut tree = MirrorTree::new();
        let b = tree.add_directory("a/b", DirectoryNode::new("b")).unwrap();
        let a = tree.find_directory("a").unwrap();

        assert_eq!(tree.path(tree.root()), "");
        assert_eq!(tree.path_with_name(tree.root()), ROOT_NAME);
        assert_eq!(tree.path(a), ROOT_NAME);
        assert_eq!(tree.path_with_name(a), sep("/a"));
        assert_eq!(tree.path_with_name(b), sep("/a/b"));
        assert_eq!(tree.segments(b), vec!["a", "b"]);
    }

    #[test]
    fn test_path_round_trip() {
        let mut tree = MirrorTree::new();
        tree.add_file("docs/notes/today.md", FileNode::new("today.md", b"#".to_vec()));
        tree.add_file("docs/readme.txt", FileNode::new("readme.txt", b"r".to_vec()));
        tree.add_directory("music/empty", DirectoryNode::new("empty"));

        for (id, _) in tree.directories().skip(1) {
            let relative = tree.relative_path(id);
            assert!(tree.exists_directory(&relative), "{}", relative);
            assert_eq!(tree.find_directory(&relative), Some(id));

            let via_path_with_name = tree.path_with_name(id);
            assert_eq!(tree.find_directory(&via_path_with_name), Some(id));
        }
        for (id, _) in tree.files() {
            let via_path_with_name = tree.file_path_with_name(id);
            assert!(tree.exists_file(&via_path_with_name));
            assert_eq!(tree.find_file(&via_path_with_name), Some(id));
        }
    }

    #[test]
    fn test_from_records_rebuilds_hierarchy() {
        let directories = vec![
            DirectoryRecord { id: 3, parent_id: Some(2), name: "b".to_string() },
            DirectoryRecord { id: 1, parent_id: None, name: ROOT_NAME.to_string() },
            DirectoryRecord { id: 2, parent_id: Some(1), name: "a".to_string() },
        ];
        let files = vec![
            FileRecord { id: 10, parent_id: 3, name: "c.txt".to_string(), size: 4 },
            FileRecord { id: 11, parent_id: 1, name: "top.txt".to_string(), size: 0 },
        ];
        let tree = MirrorTree::from_records(directories, files);

        assert_eq!(tree.directory(tree.root()).store_id(), Some(1));
        let c = tree.find_file("a/b/c.txt").unwrap();
        assert_eq!(tree.file(c).store_id(), Some(10));
        assert_eq!(tree.file(c).size(), 4);
        assert_eq!(tree.file(c).content(), None);
        assert!(tree.exists_file("top.txt"));

        let stored = tree.stored_file(c).unwrap();
        assert_eq!(stored.id, 10);
        assert_eq!(stored.directories, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_from_records_picks_lowest_root_and_skips_orphans() {
        let directories = vec![
            DirectoryRecord { id: 5, parent_id: None, name: ROOT_NAME.to_string() },
            DirectoryRecord { id: 4, parent_id: None, name: ROOT_NAME.to_string() },
            DirectoryRecord { id: 6, parent_id: Some(5), name: "orphan".to_string() },
        ];
        let files = vec![FileRecord { id: 1, parent_id: 6, name: "lost".to_string(), size: 1 }];
        let tree = MirrorTree::from_records(directories, files);

        assert_eq!(tree.directory(tree.root()).store_id(), Some(4));
        assert_eq!(tree.directory_count(), 1);
        assert_eq!(tree.file_count(), 0);
    }

    #[test]
    fn test_apply_saved_sets_store_ids() {
        let mut tree = MirrorTree::new();
        let file = tree.add_file("a/b.txt", FileNode::new("b.txt", vec![0; 3])).unwrap();
        let a = tree.find_directory("a").unwrap();
        assert!(tree.stored_file(file).is_none());

        tree.apply_saved(&SavedIds {
            directories: vec![(tree.root(), 1), (a, 2)],
            files: vec![(file, 7)],
        });

        assert_eq!(tree.directory(a).store_id(), Some(2));
        assert_eq!(tree.stored_file(file).unwrap().id, 7);
    }
}
