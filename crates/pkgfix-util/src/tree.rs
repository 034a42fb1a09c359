//! In-memory file trees and their on-disk serialization.
//!
//! A [`DirJson`] maps entry names to either file text or a nested directory.
//! In JSON a string is a file and an object is a directory, so a tree can be
//! written inline in a fixture description:
//!
//! ```json
//! { "index.js": "module.exports = 1;", "lib": { "util.js": "" } }
//! ```

use crate::fs::read_to_string_lossy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};

/// A directory: entry name → file or subdirectory.
pub type DirJson = BTreeMap<String, FileEntry>;

/// One entry of a [`DirJson`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    /// File content.
    File(String),
    /// Nested directory.
    Dir(DirJson),
}

impl FileEntry {
    /// Create a file entry.
    pub fn file(content: impl Into<String>) -> Self {
        Self::File(content.into())
    }

    /// File content, if this is a file.
    #[must_use]
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Self::File(content) => Some(content),
            Self::Dir(_) => None,
        }
    }

    /// Directory entries, if this is a directory.
    #[must_use]
    pub fn as_dir(&self) -> Option<&DirJson> {
        match self {
            Self::Dir(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    /// Consume the entry, returning the directory if it is one.
    #[must_use]
    pub fn into_dir(self) -> Option<DirJson> {
        match self {
            Self::Dir(dir) => Some(dir),
            Self::File(_) => None,
        }
    }
}

impl From<&str> for FileEntry {
    fn from(content: &str) -> Self {
        Self::File(content.to_string())
    }
}

impl From<String> for FileEntry {
    fn from(content: String) -> Self {
        Self::File(content)
    }
}

impl From<DirJson> for FileEntry {
    fn from(dir: DirJson) -> Self {
        Self::Dir(dir)
    }
}

/// Write a file tree under `base`, creating directories as needed.
///
/// Existing files are overwritten; entries on disk that are not in the tree
/// are left alone.
///
/// # Errors
/// Returns `InvalidInput` for entry names that are not a single normal path
/// component, or any IO error from creating directories and writing files.
pub fn write_tree(base: &Path, tree: &DirJson) -> io::Result<()> {
    fs::create_dir_all(base)?;

    for (name, entry) in tree {
        check_entry_name(name)?;
        let path = base.join(name);
        match entry {
            FileEntry::File(content) => fs::write(&path, content)?,
            FileEntry::Dir(dir) => write_tree(&path, dir)?,
        }
    }

    Ok(())
}

/// Read the tree under `base` into memory.
///
/// Symlinks are followed. Top-level entries whose name is in `ignore` are
/// skipped. File content is decoded as UTF-8, lossily.
///
/// # Errors
/// Returns an error if `base` or any entry below it cannot be read.
pub fn read_tree(base: &Path, ignore: &[&str]) -> io::Result<DirJson> {
    let mut tree = DirJson::new();

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignore.contains(&name.as_str()) {
            continue;
        }

        let path = entry.path();
        let metadata = fs::metadata(&path)?;
        let value = if metadata.is_dir() {
            FileEntry::Dir(read_tree(&path, &[])?)
        } else {
            FileEntry::File(read_to_string_lossy(&path)?)
        };
        tree.insert(name, value);
    }

    Ok(tree)
}

/// Deep-merge `overlay` into `base`.
///
/// Directories present on both sides are merged recursively; in every other
/// case the overlay entry wins.
pub fn merge_trees(base: &mut DirJson, overlay: DirJson) {
    for (name, entry) in overlay {
        match (base.get_mut(&name), entry) {
            (Some(FileEntry::Dir(existing)), FileEntry::Dir(incoming)) => {
                merge_trees(existing, incoming);
            }
            (_, entry) => {
                base.insert(name, entry);
            }
        }
    }
}

fn check_entry_name(name: &str) -> io::Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(|c: char| c == '/' || c == '\\') => {
            Ok(())
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid file tree entry name: {name:?}"),
        )),
    }
}
