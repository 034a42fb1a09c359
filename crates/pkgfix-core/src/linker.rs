//! Peer-aware materialization of linked packages.
//!
//! A linked package without peer dependencies becomes a directory symlink
//! (a junction on Windows). A package with peers is expanded into a real
//! directory instead: its files are hard-linked (or copied) and its non-peer
//! dependencies are expanded below it, so peers resolve against the linking
//! project's tree rather than the package's own ancestry.

use crate::error::{Error, IoResultExt, Result};
use crate::manifest::{sections, Manifest};
use crate::resolve::{install_dir, resolve_package_path, ResolutionCache, NODE_MODULES};
use pkgfix_util::fs::{copy_exclusive, is_cross_device};
use pkgfix_util::walk;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Creates hard links. Tests swap this out to simulate cross-device failures.
pub trait HardLinker: fmt::Debug + Send + Sync {
    /// Create `dst` as a hard link to `src`. Must fail if `dst` exists.
    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// [`HardLinker`] backed by [`std::fs::hard_link`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHardLinker;

impl HardLinker for StdHardLinker {
    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::hard_link(src, dst)
    }
}

/// Writes linked packages into `node_modules`.
///
/// Holds the session's hard-link capability: it starts enabled and is turned
/// off for good the first time a hard link fails across devices.
#[derive(Debug)]
pub struct LinkWriter {
    hard_linker: Box<dyn HardLinker>,
    hard_links: bool,
}

impl Default for LinkWriter {
    fn default() -> Self {
        Self::new(Box::new(StdHardLinker))
    }
}

impl LinkWriter {
    #[must_use]
    pub fn new(hard_linker: Box<dyn HardLinker>) -> Self {
        Self {
            hard_linker,
            hard_links: true,
        }
    }

    /// Start with hard links disabled, copying every file.
    #[must_use]
    pub fn copy_only(mut self) -> Self {
        self.hard_links = false;
        self
    }

    /// Whether file duplication still tries hard links first.
    #[must_use]
    pub fn uses_hard_links(&self) -> bool {
        self.hard_links
    }

    /// Materialize package `name` located at `target` at `destination`.
    ///
    /// # Errors
    /// Fails if the target manifest cannot be read, if a non-peer dependency
    /// of an expanded package cannot be resolved, or on any filesystem error
    /// other than a cross-device hard link.
    pub fn write_linked_package(
        &mut self,
        name: &str,
        target: &Path,
        destination: &Path,
        cache: &mut ResolutionCache,
    ) -> Result<()> {
        let manifest = Manifest::read_dir(target)?;
        let peers = manifest.peer_dependency_names();

        if peers.is_empty() {
            return ensure_dir_symlink(target, destination);
        }

        debug!(
            name,
            target = %target.display(),
            peers = ?peers,
            "Expanding package with peer dependencies"
        );
        remove_stale_link(destination)?;
        self.duplicate_tree(target, destination)?;

        // Peers stay unresolved here; the consumer's tree provides them.
        let deps = manifest
            .section_names(sections::DEPENDENCIES)
            .into_iter()
            .chain(manifest.section_names(sections::PEER_DEPENDENCIES))
            .filter(|dep| !peers.contains(dep));

        for dep in deps {
            let located = resolve_package_path(&dep, target, cache).ok_or_else(|| {
                Error::LinkDependencyUnresolved {
                    name: dep.clone(),
                    package: name.to_string(),
                    dir: target.to_path_buf(),
                }
            })?;
            let dep_dir = located.parent().unwrap_or(&located).to_path_buf();
            self.write_linked_package(&dep, &dep_dir, &install_dir(destination, &dep), cache)?;
        }
        Ok(())
    }

    /// Duplicate every entry below `src` into `dst`, skipping `node_modules`.
    pub fn duplicate_tree(&mut self, src: &Path, dst: &Path) -> Result<()> {
        fs::create_dir_all(dst).at(dst)?;
        for entry in walk::entries(src, &[NODE_MODULES]).at(src)? {
            let out = dst.join(&entry.relative_path);
            if entry.is_dir {
                fs::create_dir_all(&out).at(&out)?;
            } else {
                self.duplicate_file(&entry.full_path, &out)?;
            }
        }
        Ok(())
    }

    /// Hard-link `src` to `dst`, falling back to an exclusive copy once
    /// hard links are known not to work.
    pub fn duplicate_file(&mut self, src: &Path, dst: &Path) -> Result<()> {
        if self.hard_links {
            match self.hard_linker.hard_link(src, dst) {
                Ok(()) => return Ok(()),
                Err(e) if is_cross_device(&e) => {
                    warn!(
                        src = %src.display(),
                        dst = %dst.display(),
                        "Hard links unavailable across devices, copying from now on"
                    );
                    self.hard_links = false;
                }
                Err(e) => return Err(Error::io(dst, e)),
            }
        }
        copy_exclusive(src, dst).at(dst)?;
        Ok(())
    }
}

/// Point `destination` at `target` with a directory link.
///
/// An existing link to the same place is kept, a link elsewhere is replaced,
/// and anything else at `destination` is an error.
fn ensure_dir_symlink(target: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }

    match fs::symlink_metadata(destination) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if same_dir(destination, target) {
                debug!(path = %destination.display(), "Link already in place");
                return Ok(());
            }
            remove_link(destination)?;
        }
        Ok(_) => {
            return Err(Error::LinkDestinationOccupied {
                path: destination.to_path_buf(),
                target: target.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(destination, e)),
    }

    create_dir_link(target, destination)?;
    debug!(
        path = %destination.display(),
        target = %target.display(),
        "Linked package"
    );
    Ok(())
}

/// Drop a symlink left at `path` by an earlier write.
fn remove_stale_link(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => remove_link(path),
        _ => Ok(()),
    }
}

fn same_dir(link: &Path, target: &Path) -> bool {
    match (dunce::canonicalize(link), dunce::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_link(path: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        // Junctions and directory symlinks are removed as directories
        if fs::remove_dir(path).is_ok() {
            return Ok(());
        }
    }
    fs::remove_file(path).at(path)
}

/// Create a directory link (symlink on Unix, junction on Windows).
fn create_dir_link(src: &Path, dst: &Path) -> Result<()> {
    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(src, dst);

    #[cfg(windows)]
    let created = junction::create(src, dst);

    #[cfg(not(any(unix, windows)))]
    let created: io::Result<()> = Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("directory links are not supported (target {})", src.display()),
    ));

    created.at(dst)
}
