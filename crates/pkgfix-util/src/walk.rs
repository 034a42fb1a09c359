//! Directory walking.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One entry found below a walked directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the walked directory.
    pub relative_path: PathBuf,
    /// Absolute (or root-relative, if the root was relative) path.
    pub full_path: PathBuf,
    /// Whether the entry is a directory (after following symlinks).
    pub is_dir: bool,
}

/// Enumerate every entry below `root`, parents before their children.
///
/// Directories whose name is in `ignore` are skipped along with their whole
/// subtree, at any depth. Symlinks are followed. Entries within a directory
/// come in name order.
///
/// # Errors
/// Returns the first error hit while reading the tree.
pub fn entries(root: &Path, ignore: &[&str]) -> io::Result<Vec<WalkEntry>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !e.file_name()
                .to_str()
                .is_some_and(|name| ignore.contains(&name))
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative_path = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        found.push(WalkEntry {
            relative_path,
            full_path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
        });
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_entries_lists_dirs_before_children() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/inner")).unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();
        fs::write(dir.path().join("lib/inner/a.js"), "").unwrap();

        let found = entries(dir.path(), &[]).unwrap();
        let rel: Vec<_> = found.iter().map(|e| e.relative_path.clone()).collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("index.js"),
                PathBuf::from("lib"),
                PathBuf::from("lib/inner"),
                PathBuf::from("lib/inner/a.js"),
            ]
        );
        assert!(found[1].is_dir);
        assert!(!found[3].is_dir);
        assert_eq!(found[3].full_path, dir.path().join("lib/inner/a.js"));
    }

    #[test]
    fn test_entries_skips_ignored_subtrees() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::create_dir_all(dir.path().join("lib/node_modules/x")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "").unwrap();

        let found = entries(dir.path(), &["node_modules"]).unwrap();
        assert!(found
            .iter()
            .all(|e| !e.relative_path.to_string_lossy().contains("node_modules")));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_entries_missing_root_is_error() {
        let dir = tempdir().unwrap();
        assert!(entries(&dir.path().join("missing"), &[]).is_err());
    }
}
