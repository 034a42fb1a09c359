//! Fixture descriptions: a project graph as JSON.
//!
//! ```json
//! {
//!   "name": "demo",
//!   "version": "1.0.0",
//!   "files": { "index.js": "require('left-pad');" },
//!   "dependencies": { "left-pad": { "version": "1.3.0" } },
//!   "links": { "local": { "target": "../local" } }
//! }
//! ```
//!
//! A nested description takes its name from its key when it has none.

use crate::error::{Error, Result};
use crate::link::Link;
use crate::manifest::{sections, MANIFEST_FILE};
use crate::project::{DepKind, Project, ProjectOptions};
use indexmap::IndexMap;
use pkgfix_util::{DirJson, FileEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A project graph description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_range: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: DirJson,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, FixtureSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dev_dependencies: IndexMap<String, FixtureSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub links: IndexMap<String, LinkSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dev_links: IndexMap<String, LinkSpec>,
}

/// A link in a fixture description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkSpec {
    /// Resolve by name from `baseDir`.
    #[serde(rename_all = "camelCase")]
    Resolve {
        base_dir: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolve_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requested_range: Option<String>,
    },
    /// An explicit package directory.
    #[serde(rename_all = "camelCase")]
    Target {
        target: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requested_range: Option<String>,
    },
}

impl LinkSpec {
    fn to_link(&self) -> Link {
        match self {
            Self::Resolve {
                base_dir,
                resolve_name,
                requested_range,
            } => {
                let mut link = Link::resolve(base_dir);
                if let Some(name) = resolve_name {
                    link = link.with_resolve_name(name);
                }
                with_range(link, requested_range.as_deref())
            }
            Self::Target {
                target,
                requested_range,
            } => with_range(Link::target(target), requested_range.as_deref()),
        }
    }

    fn from_link(link: &Link) -> Result<Self> {
        Ok(match link {
            Link::ByName {
                base_dir,
                resolve_name,
                requested_range,
            } => Self::Resolve {
                base_dir: base_dir.clone(),
                resolve_name: resolve_name.clone(),
                requested_range: requested_range.clone(),
            },
            Link::Target {
                target,
                requested_range,
            } => Self::Target {
                target: target.clone(),
                requested_range: requested_range.clone(),
            },
            Link::Project {
                project,
                requested_range,
            } => Self::Target {
                target: project.base_dir()?,
                requested_range: requested_range.clone(),
            },
        })
    }

    fn rebase(&mut self, dir: &Path) {
        let path = match self {
            Self::Resolve { base_dir, .. } => base_dir,
            Self::Target { target, .. } => target,
        };
        if path.is_relative() {
            *path = dir.join(&*path);
        }
    }
}

fn with_range(link: Link, range: Option<&str>) -> Link {
    match range {
        Some(range) => link.with_requested_range(range),
        None => link,
    }
}

impl FixtureSpec {
    /// Parse a description from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::FixtureInvalid(e.to_string()))
    }

    /// Serialize with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::FixtureInvalid(e.to_string()))
    }

    /// Make relative link paths, at every depth, relative to `dir`.
    pub fn rebase_paths(&mut self, dir: &Path) {
        for link in self.links.values_mut().chain(self.dev_links.values_mut()) {
            link.rebase(dir);
        }
        for child in self
            .dependencies
            .values_mut()
            .chain(self.dev_dependencies.values_mut())
        {
            child.rebase_paths(dir);
        }
    }

    /// Every dependency name must appear in exactly one section.
    fn check_unique_names(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        let names = self
            .dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.links.keys())
            .chain(self.dev_links.keys());
        for name in names {
            if !seen.insert(name) {
                return Err(Error::FixtureInvalid(format!(
                    "{name} is declared more than once"
                )));
            }
        }
        Ok(())
    }
}

impl Project {
    /// Build a project graph from a description.
    ///
    /// # Errors
    /// `FIXTURE_INVALID` when a name is declared twice or a nested name
    /// contradicts its key, plus any error from building the projects.
    pub fn from_fixture(spec: &FixtureSpec) -> Result<Project> {
        build(spec, None)
    }

    /// Describe this project graph.
    ///
    /// Manifest fields beyond name and version are kept as an embedded
    /// `package.json` file. Project-reference links become target links at
    /// the referenced project's base dir.
    pub fn to_fixture(&self) -> Result<FixtureSpec> {
        let mut files = self.files().clone();
        let mut extra = self.pkg().as_map().clone();
        for key in ["name", "version", sections::DEPENDENCIES, sections::DEV_DEPENDENCIES] {
            extra.remove(key);
        }
        if extra.get("keywords").is_some_and(|k| k == &Value::Array(Vec::new())) {
            extra.remove("keywords");
        }
        if !extra.is_empty() {
            let mut manifest = self.pkg().clone();
            manifest.remove(sections::DEPENDENCIES);
            manifest.remove(sections::DEV_DEPENDENCIES);
            files.insert(MANIFEST_FILE.into(), FileEntry::File(manifest.to_json_pretty()));
        }

        let mut spec = FixtureSpec {
            name: Some(self.name()?),
            version: Some(self.version()?),
            requested_range: self.requested_range_override().map(str::to_string),
            files,
            ..FixtureSpec::default()
        };

        for (name, dep) in self.dependencies() {
            match (dep.project(), dep.link(), dep.kind) {
                (Some(child), _, DepKind::Prod) => {
                    spec.dependencies.insert(name.to_string(), child.to_fixture()?);
                }
                (Some(child), _, DepKind::Dev) => {
                    spec.dev_dependencies.insert(name.to_string(), child.to_fixture()?);
                }
                (None, Some(link), DepKind::Prod) => {
                    spec.links.insert(name.to_string(), LinkSpec::from_link(link)?);
                }
                (None, Some(link), DepKind::Dev) => {
                    spec.dev_links.insert(name.to_string(), LinkSpec::from_link(link)?);
                }
                (None, None, _) => {}
            }
        }
        Ok(spec)
    }
}

fn build(spec: &FixtureSpec, key: Option<&str>) -> Result<Project> {
    spec.check_unique_names()?;
    if let (Some(name), Some(key)) = (&spec.name, key) {
        if name != key {
            return Err(Error::FixtureInvalid(format!(
                "dependency {key} is described with name {name}"
            )));
        }
    }

    let options = ProjectOptions {
        name: spec.name.clone().or_else(|| key.map(str::to_string)),
        version: spec.version.clone(),
        files: Some(spec.files.clone()),
        requested_range: spec.requested_range.clone(),
        setup: None,
    };
    let mut project = Project::with_options(options)?;

    for (name, child) in &spec.dependencies {
        let child = build(child, Some(name))?;
        project.insert_owned(name.clone(), DepKind::Prod, child);
    }
    for (name, child) in &spec.dev_dependencies {
        let child = build(child, Some(name))?;
        project.insert_owned(name.clone(), DepKind::Dev, child);
    }
    for (name, link) in &spec.links {
        project.link_dependency(name.clone(), link.to_link());
    }
    for (name, link) in &spec.dev_links {
        project.link_dev_dependency(name.clone(), link.to_link());
    }
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DEFAULT_ENTRY;

    const DEMO: &str = r#"{
        "name": "demo",
        "version": "1.0.0",
        "files": { "index.js": "require('left-pad');", "lib": { "a.js": "" } },
        "dependencies": { "left-pad": { "version": "1.3.0" } },
        "devDependencies": { "tool": { "version": "2.0.0", "requestedRange": "^2.0.0" } },
        "links": { "local": { "target": "../local", "requestedRange": "*" } },
        "devLinks": { "shared": { "baseDir": "/repo", "resolveName": "shared-impl" } }
    }"#;

    #[test]
    fn test_parse_and_build() {
        let spec = FixtureSpec::from_json(DEMO).unwrap();
        let project = Project::from_fixture(&spec).unwrap();

        assert_eq!(project.name().unwrap(), "demo");
        assert_eq!(project.files()[DEFAULT_ENTRY].as_file(), Some("require('left-pad');"));
        let left_pad = project.dependency_project("left-pad").unwrap();
        assert_eq!(left_pad.name().unwrap(), "left-pad");
        assert_eq!(left_pad.version().unwrap(), "1.3.0");
        assert_eq!(
            project.dependency_project("tool").unwrap().requested_range().unwrap(),
            "^2.0.0"
        );

        let links: Vec<_> = project.links().map(|(n, _, k)| (n, k)).collect();
        assert_eq!(links, vec![("local", DepKind::Prod), ("shared", DepKind::Dev)]);
        match project.dependency("shared").and_then(|d| d.link()) {
            Some(Link::ByName { resolve_name, .. }) => {
                assert_eq!(resolve_name.as_deref(), Some("shared-impl"));
            }
            other => panic!("unexpected link {other:?}"),
        }
    }

    #[test]
    fn test_rebase_paths() {
        let mut spec = FixtureSpec::from_json(DEMO).unwrap();
        spec.rebase_paths(Path::new("/fixtures/demo"));
        assert_eq!(
            spec.links["local"],
            LinkSpec::Target {
                target: PathBuf::from("/fixtures/demo/../local"),
                requested_range: Some("*".into()),
            }
        );
        // Absolute paths are left alone
        assert!(matches!(
            &spec.dev_links["shared"],
            LinkSpec::Resolve { base_dir, .. } if base_dir == Path::new("/repo")
        ));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let spec = FixtureSpec::from_json(
            r#"{"dependencies": {"a": {}}, "links": {"a": {"target": "/a"}}}"#,
        )
        .unwrap();
        let err = Project::from_fixture(&spec).unwrap_err();
        assert!(matches!(err, Error::FixtureInvalid(_)));
    }

    #[test]
    fn test_name_must_match_key() {
        let spec =
            FixtureSpec::from_json(r#"{"dependencies": {"a": {"name": "b"}}}"#).unwrap();
        assert!(matches!(
            Project::from_fixture(&spec),
            Err(Error::FixtureInvalid(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_fixture_error() {
        let err = FixtureSpec::from_json(r#"{"dependencies": []}"#).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::FIXTURE_INVALID);
    }

    #[test]
    fn test_to_fixture_keeps_extra_manifest_fields() {
        let mut project = Project::new("plugin", "1.0.0");
        project
            .pkg_mut()
            .insert("peerDependencies", serde_json::json!({"host": "*"}));
        project.add_dependency("helper", "1.0.0");
        let target = Project::new("target", "1.0.0");
        project.link_dependency("target", Link::project(&target));

        let spec = project.to_fixture().unwrap();
        let embedded = spec.files[MANIFEST_FILE].as_file().unwrap();
        assert!(embedded.contains("peerDependencies"));
        assert!(spec.dependencies.contains_key("helper"));
        assert!(spec.dependencies["helper"].files.get(MANIFEST_FILE).is_none());
        assert_eq!(
            spec.links["target"],
            LinkSpec::Target {
                target: target.base_dir().unwrap(),
                requested_range: None,
            }
        );

        let rebuilt = Project::from_fixture(&spec).unwrap();
        assert!(rebuilt.pkg().peer_dependency_names().contains("host"));
        target.dispose().unwrap();
    }
}
