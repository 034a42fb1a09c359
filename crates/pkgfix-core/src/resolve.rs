//! Upward `node_modules` package lookup.
//!
//! Mirrors how Node finds a bare package: starting at a directory, check
//! `<dir>/node_modules/<name>/package.json`, then repeat in each ancestor.

use crate::manifest::MANIFEST_FILE;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Name of the installation directory.
pub const NODE_MODULES: &str = "node_modules";

/// Memoized lookups, keyed by `(name, starting directory)`.
///
/// Misses are cached too. A cache must not outlive the tree it was filled
/// from; the materializer creates one per write.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    realpaths: HashMap<PathBuf, PathBuf>,
    lookups: HashMap<(String, PathBuf), Option<PathBuf>>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized lookups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    fn realpath(&mut self, dir: &Path) -> PathBuf {
        self.realpaths
            .entry(dir.to_path_buf())
            .or_insert_with(|| dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()))
            .clone()
    }
}

/// Where a package named `name` is installed below `base`.
///
/// Scoped names nest: `@scope/pkg` lives at `node_modules/@scope/pkg`.
#[must_use]
pub fn install_dir(base: &Path, name: &str) -> PathBuf {
    let mut dir = base.join(NODE_MODULES);
    for part in name.split('/') {
        dir.push(part);
    }
    dir
}

/// Split `@scope/name` into its scope and bare name.
#[must_use]
pub fn parse_scoped(name: &str) -> Option<(&str, &str)> {
    let (scope, rest) = name.split_once('/')?;
    if scope.len() > 1 && scope.starts_with('@') && !rest.is_empty() {
        Some((scope, rest))
    } else {
        None
    }
}

/// Locate the manifest of package `name`, searching from `from` upward.
///
/// The starting directory is canonicalized first, so a lookup from inside a
/// symlinked package searches the package's real ancestry. Directories named
/// `node_modules` are not themselves searched.
///
/// Returns the path of the located `package.json`, or `None`.
pub fn resolve_package_path(
    name: &str,
    from: &Path,
    cache: &mut ResolutionCache,
) -> Option<PathBuf> {
    let key = (name.to_string(), from.to_path_buf());
    if let Some(hit) = cache.lookups.get(&key) {
        return hit.clone();
    }

    let start = cache.realpath(from);
    let mut found = None;
    for dir in start.ancestors() {
        if dir.file_name().is_some_and(|n| n == NODE_MODULES) {
            continue;
        }
        let candidate = install_dir(dir, name).join(MANIFEST_FILE);
        if candidate.is_file() {
            found = Some(candidate);
            break;
        }
    }

    trace!(name, from = %from.display(), found = ?found, "resolve package");
    cache.lookups.insert(key, found.clone());
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn install(base: &Path, name: &str) -> PathBuf {
        let dir = install_dir(base, name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_install_dir_scoped() {
        let base = Path::new("/p");
        assert_eq!(install_dir(base, "a"), PathBuf::from("/p/node_modules/a"));
        assert_eq!(
            install_dir(base, "@types/node"),
            PathBuf::from("/p/node_modules/@types/node")
        );
    }

    #[test]
    fn test_parse_scoped() {
        assert_eq!(parse_scoped("@scope/pkg"), Some(("@scope", "pkg")));
        assert_eq!(parse_scoped("pkg"), None);
        assert_eq!(parse_scoped("@scope/"), None);
        assert_eq!(parse_scoped("scope/pkg"), None);
    }

    #[test]
    fn test_resolves_from_ancestor() {
        let tmp = tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        let pkg = install(&root, "left-pad");
        let nested = root.join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        let mut cache = ResolutionCache::new();
        let found = resolve_package_path("left-pad", &nested, &mut cache).unwrap();
        assert_eq!(found, pkg.join(MANIFEST_FILE));
    }

    #[test]
    fn test_nearest_copy_wins() {
        let tmp = tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        install(&root, "dep");
        let parent = install(&root, "parent");
        let nested_dep = install(&parent, "dep");

        let mut cache = ResolutionCache::new();
        let found = resolve_package_path("dep", &parent, &mut cache).unwrap();
        assert_eq!(found, nested_dep.join(MANIFEST_FILE));
    }

    #[test]
    fn test_scoped_lookup() {
        let tmp = tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        let pkg = install(&root, "@scope/pkg");

        let mut cache = ResolutionCache::new();
        let found = resolve_package_path("@scope/pkg", &root, &mut cache).unwrap();
        assert_eq!(found, pkg.join(MANIFEST_FILE));
    }

    #[test]
    fn test_miss_is_cached() {
        let root = tempdir().unwrap();
        let mut cache = ResolutionCache::new();

        assert!(resolve_package_path("nope", root.path(), &mut cache).is_none());
        assert_eq!(cache.len(), 1);

        // A later install is not seen through the same cache
        install(root.path(), "nope");
        assert!(resolve_package_path("nope", root.path(), &mut cache).is_none());
        assert!(resolve_package_path("nope", root.path(), &mut ResolutionCache::new()).is_some());
    }
}
