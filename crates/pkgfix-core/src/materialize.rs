//! Writing a project graph to disk.
//!
//! A write runs three passes over the owned tree:
//!
//! 1. **assign**: every owned child gets `<parent>/node_modules/<name>` as its
//!    base dir, so every location is known before anything is written.
//! 2. **content**: files are written, children first, then links are resolved
//!    and `package.json` is emitted with `dependencies`/`devDependencies`.
//! 3. **finalize**: every resolved link is materialized, parents first.
//!
//! Finalization only starts once every manifest in the tree exists, so the
//! lookups made while expanding a linked package see the whole tree.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::link::{resolve_links, ResolvedLink};
use crate::linker::{HardLinker, LinkWriter};
use crate::manifest::{sections, Manifest};
use crate::project::{DepKind, Project};
use crate::resolve::{install_dir, ResolutionCache};
use pkgfix_util::tree::write_tree;
use serde_json::{Map, Value};
use std::io;
use tracing::debug;

/// One write of a project tree.
///
/// The session owns the resolution cache and the hard-link capability flag;
/// neither is shared with other sessions.
#[derive(Debug, Default)]
pub struct Materializer {
    cache: ResolutionCache,
    links: LinkWriter,
}

/// Links resolved during the content pass, mirroring the owned tree.
#[derive(Debug)]
struct Written {
    links: Vec<ResolvedLink>,
    children: Vec<Written>,
}

impl Materializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `hard_linker` for file duplication in peer expansions.
    #[must_use]
    pub fn with_hard_linker(hard_linker: impl HardLinker + 'static) -> Self {
        Self {
            cache: ResolutionCache::new(),
            links: LinkWriter::new(Box::new(hard_linker)),
        }
    }

    /// A session honoring the configured hard-link policy.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut session = Self::new();
        if !config.hard_links {
            session.links = session.links.copy_only();
        }
        session
    }

    /// Whether file duplication still tries hard links first.
    #[must_use]
    pub fn uses_hard_links(&self) -> bool {
        self.links.uses_hard_links()
    }

    /// Write `project` and every owned descendant into their base dirs.
    ///
    /// Executable entry points are not installed; [`Project::write`] does that
    /// after calling this.
    ///
    /// # Errors
    /// Returns the first error hit. Nothing is rolled back.
    pub fn write(&mut self, project: &Project) -> Result<()> {
        assign_base_dirs(project)?;
        let written = self.write_content(project)?;
        self.finalize(project, &written)
    }

    fn write_content(&mut self, project: &Project) -> Result<Written> {
        let base = project.base_dir()?;
        debug!(name = %project.name()?, path = %base.display(), "Writing project");

        write_tree(&base, project.files()).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput => Error::FileTreeInvalid(e.to_string()),
            _ => Error::io(&base, e),
        })?;

        let children = project
            .owned_children()
            .map(|child| self.write_content(child))
            .collect::<Result<Vec<_>>>()?;

        let links = resolve_links(project, &mut self.cache)?;
        emitted_manifest(project, &links)?.write_to(&base)?;

        Ok(Written { links, children })
    }

    fn finalize(&mut self, project: &Project, written: &Written) -> Result<()> {
        let base = project.base_dir()?;
        for link in &written.links {
            let destination = install_dir(&base, &link.name);
            self.links
                .write_linked_package(&link.name, &link.dir, &destination, &mut self.cache)?;
        }
        for (child, written) in project.owned_children().zip(&written.children) {
            self.finalize(child, written)?;
        }
        Ok(())
    }
}

/// Place every owned descendant below its parent, parents first.
fn assign_base_dirs(project: &Project) -> Result<()> {
    let base = project.base_dir()?;
    for child in project.owned_children() {
        let name = child.name()?;
        child.place_at(&install_dir(&base, &name), &name)?;
        assign_base_dirs(child)?;
    }
    Ok(())
}

/// The manifest as written: the project's own manifest with both dependency
/// sections replaced by the owned children and resolved links.
fn emitted_manifest(project: &Project, links: &[ResolvedLink]) -> Result<Manifest> {
    let mut manifest = project.pkg().clone();
    // Name and version must be readable before anything is emitted
    manifest.version()?;

    let mut deps = Map::new();
    let mut dev_deps = Map::new();
    for child in project.dependency_projects() {
        deps.insert(child.name()?, Value::String(child.requested_range()?));
    }
    for child in project.dev_dependency_projects() {
        dev_deps.insert(child.name()?, Value::String(child.requested_range()?));
    }
    for link in links {
        let section = match link.kind {
            DepKind::Prod => &mut deps,
            DepKind::Dev => &mut dev_deps,
        };
        section.insert(link.name.clone(), Value::String(link.requested_range.clone()));
    }

    manifest.insert(sections::DEPENDENCIES, Value::Object(deps));
    manifest.insert(sections::DEV_DEPENDENCIES, Value::Object(dev_deps));
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Link;
    use crate::manifest::MANIFEST_FILE;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn read_json(path: &std::path::Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_children_are_placed_below_parent() {
        let tmp = tempdir().unwrap();
        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        root.add_dependency("a", "1.0.0").add_dependency("@s/b", "2.0.0");
        root.add_dev_dependency("c", "3.0.0");

        assign_base_dirs(&root).unwrap();

        let a = root.dependency_project("a").unwrap();
        assert_eq!(a.base_dir().unwrap(), tmp.path().join("node_modules/a"));
        assert_eq!(
            a.dependency_project("@s/b").unwrap().base_dir().unwrap(),
            tmp.path().join("node_modules/a/node_modules/@s/b")
        );
        assert_eq!(
            root.dependency_project("c").unwrap().base_dir().unwrap(),
            tmp.path().join("node_modules/c")
        );
    }

    #[test]
    fn test_child_placed_elsewhere_conflicts() {
        let tmp = tempdir().unwrap();
        let mut child = Project::new("child", "1.0.0");
        child.set_base_dir(tmp.path().join("elsewhere")).unwrap();

        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        root.add_dependency_project(child).unwrap();

        let err = Materializer::new().write(&root).unwrap_err();
        assert!(matches!(err, Error::BaseDirConflict { ref name, .. } if name == "child"));
    }

    #[test]
    fn test_emitted_manifest_routes_links_by_kind() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("target");
        Manifest::new("t", "4.0.0").write_to(&target).unwrap();

        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path().join("root")).unwrap();
        root.add_dependency("a", "1.0.0").set_requested_range("^1.0.0");
        root.link_dev_dependency("t", Link::target(&target));

        Materializer::new().write(&root).unwrap();

        let written = read_json(&tmp.path().join("root").join(MANIFEST_FILE));
        assert_eq!(written["dependencies"], json!({"a": "^1.0.0"}));
        assert_eq!(written["devDependencies"], json!({"t": "4.0.0"}));
        // The in-memory manifest is untouched
        assert!(root.pkg().get(sections::DEPENDENCIES).is_none());
    }

    #[test]
    fn test_empty_sections_are_written() {
        let tmp = tempdir().unwrap();
        let root = Project::new("lonely", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        Materializer::new().write(&root).unwrap();

        let written = read_json(&tmp.path().join(MANIFEST_FILE));
        assert_eq!(written["dependencies"], json!({}));
        assert_eq!(written["devDependencies"], json!({}));
        assert_eq!(written["keywords"], json!([]));
    }

    #[test]
    fn test_missing_version_stops_write() {
        let tmp = tempdir().unwrap();
        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        root.pkg_mut().remove("version");

        let err = Materializer::new().write(&root).unwrap_err();
        assert!(matches!(err, Error::ManifestVersionMissing { .. }));
        assert!(!tmp.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_link_to_sibling_added_earlier_resolves() {
        let tmp = tempdir().unwrap();
        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        // Children are written in the order they were added, so "z-lib" is on
        // disk by the time "a-consumer" resolves its links
        root.add_dependency("z-lib", "2.0.0");
        root.add_dependency("a-consumer", "1.0.0")
            .link_dependency("z-lib", Link::resolve(tmp.path()));

        Materializer::new().write(&root).unwrap();

        let consumer = read_json(&tmp.path().join("node_modules/a-consumer").join(MANIFEST_FILE));
        assert_eq!(consumer["dependencies"], json!({"z-lib": "2.0.0"}));
        assert!(tmp
            .path()
            .join("node_modules/a-consumer/node_modules/z-lib/package.json")
            .exists());
    }

    #[test]
    fn test_manifest_keys_keep_their_order() {
        let tmp = tempdir().unwrap();
        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        root.pkg_mut().insert("main", Value::String("index.js".into()));
        root.add_dependency("b", "1.0.0");
        root.add_dependency("a", "1.0.0");

        Materializer::new().write(&root).unwrap();

        let text = fs::read_to_string(tmp.path().join(MANIFEST_FILE)).unwrap();
        let at = |needle: &str| text.find(needle).unwrap();
        assert!(at("\"name\"") < at("\"version\""));
        assert!(at("\"version\"") < at("\"keywords\""));
        assert!(at("\"keywords\"") < at("\"main\""));
        assert!(at("\"main\"") < at("\"dependencies\""));
        assert!(at("\"b\"") < at("\"a\""));
    }

    #[test]
    fn test_rewrite_is_accepted() {
        let tmp = tempdir().unwrap();
        let mut root = Project::new("root", "1.0.0");
        root.set_base_dir(tmp.path()).unwrap();
        root.add_dependency("a", "1.0.0");

        Materializer::new().write(&root).unwrap();
        root.dependency_project_mut("a").unwrap().set_version("1.1.0");
        Materializer::new().write(&root).unwrap();

        let a = read_json(&tmp.path().join("node_modules/a").join(MANIFEST_FILE));
        assert_eq!(a["version"], "1.1.0");
    }
}
