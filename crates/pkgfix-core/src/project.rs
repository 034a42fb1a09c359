//! The project graph.
//!
//! A [`Project`] is one package: its manifest, its files, and one slot per
//! dependency name holding either an owned child project or a [`Link`] to a
//! package that lives somewhere else.

use crate::bin::link_bins;
use crate::error::{Error, IoResultExt, Result};
use crate::link::Link;
use crate::manifest::{sections, Manifest, MANIFEST_FILE};
use crate::materialize::Materializer;
use crate::resolve::NODE_MODULES;
use indexmap::IndexMap;
use pkgfix_util::tree::merge_trees;
use pkgfix_util::{DirJson, FileEntry};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::TempDir;
use tracing::debug;

/// Name given to projects created without one.
pub const DEFAULT_NAME: &str = "a-fixturified-project";

/// Version given to projects created without one.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Stub entry point every new project carries unless overridden.
pub const DEFAULT_ENTRY: &str = "index.js";

const DEFAULT_ENTRY_CONTENT: &str = "'use strict';\nmodule.exports = {};\n";

/// The files a new project starts with.
#[must_use]
pub fn default_files() -> DirJson {
    let mut files = DirJson::new();
    files.insert(DEFAULT_ENTRY.into(), FileEntry::file(DEFAULT_ENTRY_CONTENT));
    files
}

/// Which manifest section a dependency is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    Prod,
    Dev,
}

impl DepKind {
    /// The manifest section for this kind.
    #[must_use]
    pub fn section(self) -> &'static str {
        match self {
            Self::Prod => sections::DEPENDENCIES,
            Self::Dev => sections::DEV_DEPENDENCIES,
        }
    }
}

/// What a dependency slot holds.
#[derive(Debug, Clone)]
pub enum DepSource {
    /// A child project materialized inside this project's `node_modules`.
    Owned(Box<Project>),
    /// A package located elsewhere, linked in at write time.
    Linked(Link),
}

impl DepSource {
    /// Make this an owned slot holding `project`.
    fn own(&mut self, project: Project) -> &mut Project {
        match self {
            Self::Owned(child) => {
                **child = project;
                &mut **child
            }
            Self::Linked(_) => {
                *self = Self::Owned(Box::default());
                self.own(project)
            }
        }
    }
}

/// One dependency slot.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub kind: DepKind,
    pub source: DepSource,
}

impl Dependency {
    /// The owned child project, if this slot owns one.
    #[must_use]
    pub fn project(&self) -> Option<&Project> {
        match &self.source {
            DepSource::Owned(project) => Some(project.as_ref()),
            DepSource::Linked(_) => None,
        }
    }

    /// The link declaration, if this slot is a link.
    #[must_use]
    pub fn link(&self) -> Option<&Link> {
        match &self.source {
            DepSource::Linked(link) => Some(link),
            DepSource::Owned(_) => None,
        }
    }
}

/// Post-construction hook run on a freshly built project.
pub type SetupFn = Box<dyn FnOnce(&mut Project) + Send>;

/// Options for building a project.
///
/// Every field is optional. A `package.json` entry in `files` is parsed and
/// becomes the manifest; explicit `name`/`version` take precedence over it.
#[derive(Default)]
pub struct ProjectOptions {
    pub name: Option<String>,
    pub version: Option<String>,
    pub files: Option<DirJson>,
    pub requested_range: Option<String>,
    pub setup: Option<SetupFn>,
}

impl ProjectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn files(mut self, files: DirJson) -> Self {
        self.files = Some(files);
        self
    }

    #[must_use]
    pub fn requested_range(mut self, range: impl Into<String>) -> Self {
        self.requested_range = Some(range.into());
        self
    }

    #[must_use]
    pub fn setup(mut self, setup: impl FnOnce(&mut Project) + Send + 'static) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }
}

impl fmt::Debug for ProjectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("files", &self.files)
            .field("requested_range", &self.requested_range)
            .field("setup", &self.setup.is_some())
            .finish()
    }
}

/// Where a node lives on disk.
#[derive(Debug, Default)]
struct Location {
    base_dir: Option<PathBuf>,
    tmp: Option<TempDir>,
}

/// Identity of a project shared with links that reference it.
#[derive(Debug)]
pub(crate) struct Node {
    manifest: RwLock<Manifest>,
    location: Mutex<Location>,
}

impl Node {
    fn new(manifest: Manifest) -> Self {
        Self {
            manifest: RwLock::new(manifest),
            location: Mutex::new(Location::default()),
        }
    }

    fn manifest(&self) -> RwLockReadGuard<'_, Manifest> {
        self.manifest.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn manifest_mut(&self) -> RwLockWriteGuard<'_, Manifest> {
        self.manifest.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn base_dir(&self) -> Result<PathBuf> {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dir) = &location.base_dir {
            return Ok(dir.clone());
        }

        let tmp = tempfile::Builder::new()
            .prefix("pkgfix-")
            .tempdir()
            .at(&std::env::temp_dir())?;
        let dir = dunce::canonicalize(tmp.path()).at(tmp.path())?;
        debug!(path = %dir.display(), "Allocated temp base dir");
        location.base_dir = Some(dir.clone());
        location.tmp = Some(tmp);
        Ok(dir)
    }

    fn set_base_dir(&self, dir: PathBuf) -> Result<()> {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = &location.base_dir {
            return Err(Error::BaseDirAlreadySet {
                current: current.clone(),
            });
        }
        location.base_dir = Some(dir);
        Ok(())
    }

    /// Place the node at `dir`, accepting a repeat of the same placement.
    fn place_at(&self, dir: &Path, name: &str) -> Result<()> {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        match &location.base_dir {
            Some(current) if current == dir => Ok(()),
            Some(current) => Err(Error::BaseDirConflict {
                name: name.to_string(),
                current: current.clone(),
                requested: dir.to_path_buf(),
            }),
            None => {
                location.base_dir = Some(dir.to_path_buf());
                Ok(())
            }
        }
    }

    fn dispose(&self) -> Result<()> {
        let tmp = self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tmp
            .take();
        if let Some(tmp) = tmp {
            let path = tmp.path().to_path_buf();
            tmp.close().at(&path)?;
            debug!(path = %path.display(), "Released temp base dir");
        }
        Ok(())
    }
}

/// A shared handle on a project, used by project-reference links.
///
/// The handle sees the project's current version and base dir, so a link can
/// be declared before the referenced project has been placed on disk.
#[derive(Debug, Clone)]
pub struct ProjectRef(Arc<Node>);

impl ProjectRef {
    /// The referenced project's base dir, allocating a temp dir if unset.
    pub fn base_dir(&self) -> Result<PathBuf> {
        self.0.base_dir()
    }

    pub fn name(&self) -> Result<String> {
        self.0.manifest().name().map(str::to_string)
    }

    pub fn version(&self) -> Result<String> {
        self.0.manifest().version().map(str::to_string)
    }

    /// Whether this handle refers to `project`.
    #[must_use]
    pub fn refers_to(&self, project: &Project) -> bool {
        Arc::ptr_eq(&self.0, &project.node)
    }
}

/// A package and its dependency graph.
#[derive(Debug)]
pub struct Project {
    node: Arc<Node>,
    files: DirJson,
    requested_range: Option<String>,
    deps: IndexMap<String, Dependency>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_VERSION)
    }
}

impl Clone for Project {
    /// Deep clone: manifest, files and owned children are copied, links are
    /// shared, and the clone has no base dir yet.
    fn clone(&self) -> Self {
        Self {
            node: Arc::new(Node::new(self.pkg().clone())),
            files: self.files.clone(),
            requested_range: self.requested_range.clone(),
            deps: self.deps.clone(),
        }
    }
}

impl Project {
    /// Create a project with the default stub files.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let mut manifest = Manifest::new(name, version);
        manifest.insert("keywords", Value::Array(Vec::new()));
        Self::from_parts(manifest, default_files())
    }

    /// Build a project from options.
    ///
    /// # Errors
    /// Fails if an embedded `package.json` is not a file or not a JSON object.
    pub fn with_options(options: ProjectOptions) -> Result<Self> {
        let ProjectOptions {
            name,
            version,
            files,
            requested_range,
            setup,
        } = options;

        let mut files = files.unwrap_or_default();
        let mut manifest = match files.remove(MANIFEST_FILE) {
            Some(FileEntry::File(content)) => Manifest::parse(&content, Path::new(MANIFEST_FILE))?,
            Some(FileEntry::Dir(_)) => {
                return Err(Error::FileTreeInvalid(
                    "package.json must be a file, not a directory".into(),
                ))
            }
            None => Manifest::default(),
        };

        let name = name
            .or_else(|| manifest.name().ok().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let version = version
            .or_else(|| manifest.version().ok().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        manifest.set_name(name);
        manifest.set_version(version);
        if !matches!(manifest.get("keywords"), Some(Value::Array(_))) {
            manifest.insert("keywords", Value::Array(Vec::new()));
        }

        let mut all_files = default_files();
        all_files.extend(files);

        let mut project = Self::from_parts(manifest, all_files);
        project.requested_range = requested_range;
        if let Some(setup) = setup {
            setup(&mut project);
        }
        Ok(project)
    }

    pub(crate) fn from_parts(manifest: Manifest, files: DirJson) -> Self {
        Self {
            node: Arc::new(Node::new(manifest)),
            files,
            requested_range: None,
            deps: IndexMap::new(),
        }
    }

    // ---- manifest ----

    /// Read access to the manifest.
    pub fn pkg(&self) -> RwLockReadGuard<'_, Manifest> {
        self.node.manifest()
    }

    /// Write access to the manifest.
    pub fn pkg_mut(&mut self) -> RwLockWriteGuard<'_, Manifest> {
        self.node.manifest_mut()
    }

    /// The package name.
    ///
    /// # Errors
    /// Fails if the manifest has no usable `name`.
    pub fn name(&self) -> Result<String> {
        self.pkg().name().map(str::to_string)
    }

    /// The package version.
    ///
    /// # Errors
    /// Fails if the manifest has no usable `version`.
    pub fn version(&self) -> Result<String> {
        self.pkg().version().map(str::to_string)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.pkg_mut().set_name(name);
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.pkg_mut().set_version(version);
    }

    /// The range a parent records for this project: the explicit override,
    /// else the project's own version.
    pub fn requested_range(&self) -> Result<String> {
        match &self.requested_range {
            Some(range) => Ok(range.clone()),
            None => self.version(),
        }
    }

    pub fn set_requested_range(&mut self, range: impl Into<String>) {
        self.requested_range = Some(range.into());
    }

    /// The explicit range override, if any.
    pub(crate) fn requested_range_override(&self) -> Option<&str> {
        self.requested_range.as_deref()
    }

    // ---- files ----

    #[must_use]
    pub fn files(&self) -> &DirJson {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut DirJson {
        &mut self.files
    }

    /// Deep-merge a directory description into the project's files.
    pub fn merge_files(&mut self, files: DirJson) {
        merge_trees(&mut self.files, files);
    }

    // ---- location ----

    /// The directory this project materializes into.
    ///
    /// If no base dir was set, a fresh temp dir is created and its canonical
    /// path is used from then on.
    pub fn base_dir(&self) -> Result<PathBuf> {
        self.node.base_dir()
    }

    /// Set the base dir. A project can be placed only once.
    ///
    /// # Errors
    /// Fails with `BASE_DIR_ALREADY_SET` if a base dir is already known,
    /// including a temp dir allocated by an earlier [`Project::base_dir`] call.
    pub fn set_base_dir(&self, dir: impl Into<PathBuf>) -> Result<()> {
        self.node.set_base_dir(dir.into())
    }

    pub(crate) fn place_at(&self, dir: &Path, name: &str) -> Result<()> {
        self.node.place_at(dir, name)
    }

    /// A shared handle for project-reference links.
    #[must_use]
    pub fn to_ref(&self) -> ProjectRef {
        ProjectRef(Arc::clone(&self.node))
    }

    /// Remove the temp dir backing this project, if one was allocated.
    ///
    /// Calling it again, or on a project placed at an explicit path, does
    /// nothing.
    pub fn dispose(&self) -> Result<()> {
        self.node.dispose()
    }

    // ---- dependencies ----

    /// Add a dependency with default files and return it.
    pub fn add_dependency(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> &mut Project {
        let name = name.into();
        let child = Project::new(name.clone(), version);
        self.insert_owned(name, DepKind::Prod, child)
    }

    /// Add a dependency built from options.
    pub fn add_dependency_with(&mut self, options: ProjectOptions) -> Result<&mut Project> {
        let child = Project::with_options(options)?;
        self.add_dependency_project(child)
    }

    /// Add an existing project as a dependency, keyed by its name.
    pub fn add_dependency_project(&mut self, project: Project) -> Result<&mut Project> {
        let name = project.name()?;
        Ok(self.insert_owned(name, DepKind::Prod, project))
    }

    /// Add a dev-dependency with default files and return it.
    pub fn add_dev_dependency(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> &mut Project {
        let name = name.into();
        let child = Project::new(name.clone(), version);
        self.insert_owned(name, DepKind::Dev, child)
    }

    /// Add a dev-dependency built from options.
    pub fn add_dev_dependency_with(&mut self, options: ProjectOptions) -> Result<&mut Project> {
        let child = Project::with_options(options)?;
        self.add_dev_dependency_project(child)
    }

    /// Add an existing project as a dev-dependency, keyed by its name.
    pub fn add_dev_dependency_project(&mut self, project: Project) -> Result<&mut Project> {
        let name = project.name()?;
        Ok(self.insert_owned(name, DepKind::Dev, project))
    }

    pub(crate) fn insert_owned(
        &mut self,
        name: String,
        kind: DepKind,
        project: Project,
    ) -> &mut Project {
        let slot = self.deps.entry(name).or_insert_with(|| Dependency {
            kind,
            source: DepSource::Owned(Box::default()),
        });
        slot.kind = kind;
        slot.source.own(project)
    }

    /// Remove an owned dependency, or a link of either kind, named `name`.
    pub fn remove_dependency(&mut self, name: &str) -> Option<Dependency> {
        self.remove_where(name, DepKind::Prod)
    }

    /// Remove an owned dev-dependency, or a link of either kind, named `name`.
    pub fn remove_dev_dependency(&mut self, name: &str) -> Option<Dependency> {
        self.remove_where(name, DepKind::Dev)
    }

    fn remove_where(&mut self, name: &str, kind: DepKind) -> Option<Dependency> {
        let removable = self.deps.get(name).is_some_and(|dep| match dep.source {
            DepSource::Owned(_) => dep.kind == kind,
            DepSource::Linked(_) => true,
        });
        if removable {
            self.deps.shift_remove(name)
        } else {
            None
        }
    }

    /// Declare `name` as a link, replacing whatever the slot held.
    pub fn link_dependency(&mut self, name: impl Into<String>, link: Link) {
        self.deps.insert(
            name.into(),
            Dependency {
                kind: DepKind::Prod,
                source: DepSource::Linked(link),
            },
        );
    }

    /// Declare `name` as a link recorded under `devDependencies`.
    pub fn link_dev_dependency(&mut self, name: impl Into<String>, link: Link) {
        self.deps.insert(
            name.into(),
            Dependency {
                kind: DepKind::Dev,
                source: DepSource::Linked(link),
            },
        );
    }

    /// The slot for `name`.
    #[must_use]
    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.deps.get(name)
    }

    /// Every slot, in the order the names were first added.
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &Dependency)> {
        self.deps.iter().map(|(name, dep)| (name.as_str(), dep))
    }

    /// The owned child named `name`, of either kind.
    #[must_use]
    pub fn dependency_project(&self, name: &str) -> Option<&Project> {
        self.deps.get(name).and_then(Dependency::project)
    }

    /// Mutable access to the owned child named `name`, of either kind.
    pub fn dependency_project_mut(&mut self, name: &str) -> Option<&mut Project> {
        match self.deps.get_mut(name).map(|dep| &mut dep.source) {
            Some(DepSource::Owned(project)) => Some(project.as_mut()),
            _ => None,
        }
    }

    /// Owned dependencies, in insertion order.
    pub fn dependency_projects(&self) -> impl Iterator<Item = &Project> {
        self.owned_of(DepKind::Prod)
    }

    /// Owned dev-dependencies, in insertion order.
    pub fn dev_dependency_projects(&self) -> impl Iterator<Item = &Project> {
        self.owned_of(DepKind::Dev)
    }

    /// Declared links with their kind, in insertion order.
    pub fn links(&self) -> impl Iterator<Item = (&str, &Link, DepKind)> {
        self.deps.iter().filter_map(|(name, dep)| {
            dep.link().map(|link| (name.as_str(), link, dep.kind))
        })
    }

    /// Owned dependencies, then owned dev-dependencies.
    pub(crate) fn owned_children(&self) -> impl Iterator<Item = &Project> {
        self.dependency_projects()
            .chain(self.dev_dependency_projects())
    }

    fn owned_of(&self, kind: DepKind) -> impl Iterator<Item = &Project> {
        self.deps
            .values()
            .filter(move |dep| dep.kind == kind)
            .filter_map(Dependency::project)
    }

    // ---- writing ----

    /// Materialize the project tree into its base dir, then install the
    /// executables of every package in the root `node_modules`.
    ///
    /// # Errors
    /// Returns the first error hit; whatever was written before it stays on
    /// disk.
    pub async fn write(&self) -> Result<()> {
        self.write_using(&mut Materializer::new()).await
    }

    /// [`write`](Self::write) through a caller-provided session.
    pub async fn write_using(&self, materializer: &mut Materializer) -> Result<()> {
        materializer.write(self)?;
        let base = self.base_dir()?;
        link_bins(&base.join(NODE_MODULES)).await?;
        Ok(())
    }

    /// Merge `files` into the project's files, then [`write`](Self::write).
    pub async fn write_with(&mut self, files: DirJson) -> Result<()> {
        self.merge_files(files);
        self.write().await
    }
}
