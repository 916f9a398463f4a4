//! Read-only views of a loaded mirror tree for the `tree` and `ls` commands.

use crate::tree::{DirId, MirrorTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    /// 1 for the root's direct subdirectories.
    pub depth: usize,
    pub name: String,
    /// Subdirectories plus files directly inside.
    pub children: usize,
    pub relative_path: String,
}

/// Every directory below the root, pre-order, siblings by name.
pub fn outline(tree: &MirrorTree) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    let mut stack: Vec<(DirId, usize)> = tree
        .directory(tree.root())
        .subdirectories()
        .map(|(_, id)| (id, 1))
        .collect();
    stack.reverse();

    while let Some((id, depth)) = stack.pop() {
        let node = tree.directory(id);
        entries.push(OutlineEntry {
            depth,
            name: node.name().to_string(),
            children: node.size(),
            relative_path: tree.relative_path(id),
        });
        let mut children: Vec<(DirId, usize)> =
            node.subdirectories().map(|(_, child)| (child, depth + 1)).collect();
        children.reverse();
        stack.extend(children);
    }

    entries
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub name: String,
    pub size: u64,
}

/// Files directly inside `relative_dir`, or `None` if there is no such
/// directory. An empty path lists the root.
pub fn file_table(tree: &MirrorTree, relative_dir: &str) -> Option<Vec<FileRow>> {
    let dir = tree.find_directory(relative_dir)?;
    Some(
        tree.directory(dir)
            .files()
            .map(|(name, id)| FileRow {
                name: name.to_string(),
                size: tree.file(id).size(),
            })
            .collect(),
    )
}
