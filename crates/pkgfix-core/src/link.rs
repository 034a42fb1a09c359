//! Link declarations and their resolution.
//!
//! A link says "this dependency lives somewhere else". At write time every
//! link is resolved to a concrete directory and a requested range.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::project::{DepKind, Project, ProjectRef};
use crate::resolve::{resolve_package_path, ResolutionCache};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a linked dependency comes from.
#[derive(Debug, Clone)]
pub enum Link {
    /// Look the package up by name, searching upward from `base_dir`.
    ByName {
        base_dir: PathBuf,
        /// Name to look up when it differs from the dependency name.
        resolve_name: Option<String>,
        requested_range: Option<String>,
    },
    /// Use the package at `target`.
    Target {
        target: PathBuf,
        requested_range: Option<String>,
    },
    /// Use another project of the same graph.
    Project {
        project: ProjectRef,
        requested_range: Option<String>,
    },
}

impl Link {
    /// Resolve by the dependency's own name, starting at `base_dir`.
    pub fn resolve(base_dir: impl Into<PathBuf>) -> Self {
        Self::ByName {
            base_dir: base_dir.into(),
            resolve_name: None,
            requested_range: None,
        }
    }

    /// Point at an explicit package directory.
    pub fn target(target: impl Into<PathBuf>) -> Self {
        Self::Target {
            target: target.into(),
            requested_range: None,
        }
    }

    /// Point at another project; its base dir and version are read at write
    /// time.
    #[must_use]
    pub fn project(project: &Project) -> Self {
        Self::Project {
            project: project.to_ref(),
            requested_range: None,
        }
    }

    /// Look up `name` instead of the dependency name. Only meaningful for
    /// [`Link::ByName`].
    #[must_use]
    pub fn with_resolve_name(mut self, name: impl Into<String>) -> Self {
        if let Self::ByName { resolve_name, .. } = &mut self {
            *resolve_name = Some(name.into());
        }
        self
    }

    /// Override the range recorded in the linking manifest.
    #[must_use]
    pub fn with_requested_range(mut self, range: impl Into<String>) -> Self {
        let slot = match &mut self {
            Self::ByName {
                requested_range, ..
            }
            | Self::Target {
                requested_range, ..
            }
            | Self::Project {
                requested_range, ..
            } => requested_range,
        };
        *slot = Some(range.into());
        self
    }

    #[must_use]
    pub fn requested_range(&self) -> Option<&str> {
        match self {
            Self::ByName {
                requested_range, ..
            }
            | Self::Target {
                requested_range, ..
            }
            | Self::Project {
                requested_range, ..
            } => requested_range.as_deref(),
        }
    }
}

/// A link pinned to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Dependency name in the linking project.
    pub name: String,
    pub kind: DepKind,
    pub requested_range: String,
    /// Directory of the linked package.
    pub dir: PathBuf,
}

/// Resolve one link declared under `name`.
///
/// Without an override, the requested range is the linked package's own
/// version, read from its manifest (or from the referenced project).
///
/// # Errors
/// `LINK_UNRESOLVED` when a by-name lookup finds nothing, and manifest errors
/// when the linked package's version cannot be read.
pub fn resolve_link(
    name: &str,
    kind: DepKind,
    link: &Link,
    cache: &mut ResolutionCache,
) -> Result<ResolvedLink> {
    let (dir, range) = match link {
        Link::ByName {
            base_dir,
            resolve_name,
            requested_range,
        } => {
            let lookup = resolve_name.as_deref().unwrap_or(name);
            let manifest_path = resolve_package_path(lookup, base_dir, cache).ok_or_else(|| {
                Error::LinkUnresolved {
                    name: lookup.to_string(),
                    dir: base_dir.clone(),
                }
            })?;
            let dir = parent_dir(&manifest_path);
            let range = match requested_range {
                Some(range) => range.clone(),
                None => Manifest::read(&manifest_path)?.version()?.to_string(),
            };
            (dir, range)
        }
        Link::Target {
            target,
            requested_range,
        } => {
            let range = match requested_range {
                Some(range) => range.clone(),
                None => Manifest::read_dir(target)?.version()?.to_string(),
            };
            (target.clone(), range)
        }
        Link::Project {
            project,
            requested_range,
        } => {
            let range = match requested_range {
                Some(range) => range.clone(),
                None => project.version()?,
            };
            (project.base_dir()?, range)
        }
    };

    debug!(name, dir = %dir.display(), range = %range, "Resolved link");
    Ok(ResolvedLink {
        name: name.to_string(),
        kind,
        requested_range: range,
        dir,
    })
}

/// Resolve every link a project declares, in insertion order.
pub fn resolve_links(project: &Project, cache: &mut ResolutionCache) -> Result<Vec<ResolvedLink>> {
    project
        .links()
        .map(|(name, link, kind)| resolve_link(name, kind, link, cache))
        .collect()
}

fn parent_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .map_or_else(|| manifest_path.to_path_buf(), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::install_dir;
    use std::fs;
    use tempfile::tempdir;

    fn install(base: &Path, name: &str, version: &str) -> PathBuf {
        let dir = install_dir(base, name);
        Manifest::new(name, version).write_to(&dir).unwrap();
        dir
    }

    #[test]
    fn test_by_name_uses_located_version() {
        let tmp = tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        let pkg = install(&root, "left-pad", "1.3.0");

        let resolved = resolve_link(
            "left-pad",
            DepKind::Prod,
            &Link::resolve(&root),
            &mut ResolutionCache::new(),
        )
        .unwrap();
        assert_eq!(resolved.dir, pkg);
        assert_eq!(resolved.requested_range, "1.3.0");
    }

    #[test]
    fn test_by_name_with_resolve_name() {
        let tmp = tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        let pkg = install(&root, "real-name", "2.0.0");

        let link = Link::resolve(&root)
            .with_resolve_name("real-name")
            .with_requested_range("^2.0.0");
        let resolved =
            resolve_link("alias", DepKind::Dev, &link, &mut ResolutionCache::new()).unwrap();
        assert_eq!(resolved.name, "alias");
        assert_eq!(resolved.dir, pkg);
        assert_eq!(resolved.requested_range, "^2.0.0");
    }

    #[test]
    fn test_by_name_miss_is_error() {
        let tmp = tempdir().unwrap();
        let err = resolve_link(
            "ghost",
            DepKind::Prod,
            &Link::resolve(tmp.path()),
            &mut ResolutionCache::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::LinkUnresolved { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_target_reads_version() {
        let tmp = tempdir().unwrap();
        Manifest::new("local", "0.4.0").write_to(tmp.path()).unwrap();

        let resolved = resolve_link(
            "local",
            DepKind::Prod,
            &Link::target(tmp.path()),
            &mut ResolutionCache::new(),
        )
        .unwrap();
        assert_eq!(resolved.dir, tmp.path());
        assert_eq!(resolved.requested_range, "0.4.0");
    }

    #[test]
    fn test_target_without_manifest_is_error() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let err = resolve_link(
            "empty",
            DepKind::Prod,
            &Link::target(tmp.path().join("empty")),
            &mut ResolutionCache::new(),
        )
        .unwrap_err();
        assert!(err.io_error().is_some());
    }

    #[test]
    fn test_project_link_sees_later_changes() {
        let mut target = Project::new("shared", "1.0.0");
        let link = Link::project(&target);
        target.set_version("1.5.0");

        let resolved =
            resolve_link("shared", DepKind::Prod, &link, &mut ResolutionCache::new()).unwrap();
        assert_eq!(resolved.requested_range, "1.5.0");
        assert_eq!(resolved.dir, target.base_dir().unwrap());
        target.dispose().unwrap();
    }
}
