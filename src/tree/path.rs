use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

/// Name given to the mirror root when the store does not hold one yet.
pub const ROOT_NAME: &str = MAIN_SEPARATOR_STR;

/// Splits a relative path on `/` and on the platform separator. Empty
/// segments (leading, trailing or doubled separators) are dropped.
pub fn split_relative(relative_path: &str) -> Vec<&str> {
    relative_path
        .split(|c| c == '/' || c == MAIN_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Relative path of `path` below `root`, as `/`-joined segments.
///
/// Returns `None` when `path` is not inside `root` or is `root` itself.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Disk location of a node given its segments below the mirror root.
pub fn disk_path<'a, I>(disk_root: &Path, segments: I) -> PathBuf
where
    I: IntoIterator<Item = &'a str>,
{
    let mut path = disk_root.to_path_buf();
    for segment in segments {
        path.push(segment);
    }
    path
}

/// Path string of a child given its parent's path-with-name: the root's
/// children hang directly off the separator, everything else gets one
/// appended.
pub(crate) fn child_path(parent_path_with_name: &str) -> String {
    if parent_path_with_name == MAIN_SEPARATOR_STR {
        parent_path_with_name.to_string()
    } else {
        format!("{}{}", parent_path_with_name, MAIN_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_relative_drops_empty_segments() {
        assert_eq!(split_relative("a/b/c.txt"), vec!["a", "b", "c.txt"]);
        assert_eq!(split_relative("/a//b/"), vec!["a", "b"]);
        assert!(split_relative("").is_empty());
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/srv/drive");
        assert_eq!(
            relative_to(root, Path::new("/srv/drive/a/b.txt")),
            Some("a/b.txt".to_string())
        );
        assert_eq!(relative_to(root, Path::new("/srv/drive")), None);
        assert_eq!(relative_to(root, Path::new("/srv/other/a")), None);
    }

    #[test]
    fn test_disk_path() {
        let path = disk_path(Path::new("/srv/drive"), ["a", "b.txt"]);
        assert_eq!(path, Path::new("/srv/drive").join("a").join("b.txt"));
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path(ROOT_NAME), MAIN_SEPARATOR_STR);
        assert_eq!(
            child_path(&format!("{}a", MAIN_SEPARATOR)),
            format!("{}a{}", MAIN_SEPARATOR, MAIN_SEPARATOR)
        );
    }
}
