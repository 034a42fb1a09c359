//! Reading an installed layout back into a project graph.

use crate::error::{Error, IoResultExt, Result};
use crate::link::Link;
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::project::{DepKind, Project};
use crate::resolve::{install_dir, NODE_MODULES};
use pkgfix_util::tree::read_tree;
use pkgfix_util::{DirJson, FileEntry};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How [`Project::from_dir`] treats dependencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadDirOptions {
    /// Register dependencies as by-name links instead of reading them.
    pub link_deps: bool,
    /// Also register dev-dependencies as links. Implies link mode.
    pub link_dev_deps: bool,
}

impl ReadDirOptions {
    fn link_mode(self) -> bool {
        self.link_deps || self.link_dev_deps
    }
}

impl Project {
    /// Rebuild a project from an installed directory.
    ///
    /// Without link options, every listed dependency is read from
    /// `node_modules` recursively and becomes an owned child; anything in
    /// `node_modules` the manifests do not list is never read. A listed
    /// dependency that leads back to a directory already being read (a link
    /// to an ancestor) becomes a target link instead. With link options,
    /// `node_modules` is not read at all and each listed dependency becomes a
    /// link resolved by name from `root`, which keeps hoisted layouts from
    /// being duplicated.
    ///
    /// # Errors
    /// Fails if a manifest is missing or invalid, or (outside link mode) if a
    /// listed dependency is absent from `node_modules`.
    pub fn from_dir(root: impl AsRef<Path>, options: ReadDirOptions) -> Result<Project> {
        let root = root.as_ref();
        debug!(path = %root.display(), ?options, "Reading project from disk");

        if options.link_mode() {
            return from_dir_linked(root, options);
        }

        let mut ancestors = Vec::new();
        from_dir_owned(root, &mut ancestors)
    }
}

fn from_dir_linked(root: &Path, options: ReadDirOptions) -> Result<Project> {
    let mut files = read_tree(root, &[NODE_MODULES]).at(root)?;
    let manifest = take_manifest(&mut files, root)?;

    let deps = manifest.section_names(DepKind::Prod.section());
    let dev_deps = manifest.section_names(DepKind::Dev.section());
    let mut project = Project::from_parts(manifest, files);

    for name in deps {
        project.link_dependency(name, Link::resolve(root));
    }
    if options.link_dev_deps {
        for name in dev_deps {
            project.link_dev_dependency(name, Link::resolve(root));
        }
    }
    Ok(project)
}

/// Read the package at `dir`, then each dependency its manifest lists.
///
/// `ancestors` holds the canonical dirs of the packages being read above
/// this one.
fn from_dir_owned(dir: &Path, ancestors: &mut Vec<PathBuf>) -> Result<Project> {
    let mut files = read_tree(dir, &[NODE_MODULES]).at(dir)?;
    let manifest = take_manifest(&mut files, dir)?;

    let mut listed = Vec::new();
    for kind in [DepKind::Prod, DepKind::Dev] {
        for name in manifest.section_names(kind.section()) {
            let range = manifest
                .section_range(kind.section(), &name)
                .map(str::to_string);
            listed.push((name, kind, range));
        }
    }
    let mut project = Project::from_parts(manifest, files);

    ancestors.push(dunce::canonicalize(dir).at(dir)?);
    for (name, kind, range) in listed {
        let child_dir = install_dir(dir, &name);
        if !child_dir.is_dir() {
            return Err(Error::DependencyMissing {
                name,
                dir: dir.to_path_buf(),
            });
        }

        let real = dunce::canonicalize(&child_dir).at(&child_dir)?;
        if ancestors.contains(&real) {
            debug!(name = %name, target = %real.display(), "Dependency leads back to an ancestor");
            let link = match range {
                Some(range) => Link::target(real).with_requested_range(range),
                None => Link::target(real),
            };
            match kind {
                DepKind::Prod => project.link_dependency(name, link),
                DepKind::Dev => project.link_dev_dependency(name, link),
            }
            continue;
        }

        let mut child = from_dir_owned(&child_dir, ancestors)?;
        if let Some(range) = range {
            child.set_requested_range(range);
        }
        project.insert_owned(name, kind, child);
    }
    ancestors.pop();

    Ok(project)
}

fn take_manifest(files: &mut DirJson, dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let manifest = match files.remove(MANIFEST_FILE) {
        Some(FileEntry::File(content)) => Manifest::parse(&content, &path)?,
        Some(FileEntry::Dir(_)) => {
            return Err(Error::ManifestInvalid {
                path,
                message: "package.json is a directory".into(),
            })
        }
        None => return Err(Error::io(path, io::Error::from(io::ErrorKind::NotFound))),
    };
    manifest.version()?;
    Ok(manifest)
}
