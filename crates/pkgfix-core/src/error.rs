use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const MANIFEST_NAME_MISSING: &str = "MANIFEST_NAME_MISSING";
    pub const MANIFEST_VERSION_MISSING: &str = "MANIFEST_VERSION_MISSING";
    pub const MANIFEST_INVALID: &str = "MANIFEST_INVALID";
    pub const FILE_TREE_INVALID: &str = "FILE_TREE_INVALID";
    pub const BASE_DIR_ALREADY_SET: &str = "BASE_DIR_ALREADY_SET";
    pub const BASE_DIR_CONFLICT: &str = "BASE_DIR_CONFLICT";
    pub const LINK_UNRESOLVED: &str = "LINK_UNRESOLVED";
    pub const LINK_DEPENDENCY_UNRESOLVED: &str = "LINK_DEPENDENCY_UNRESOLVED";
    pub const LINK_DESTINATION_OCCUPIED: &str = "LINK_DESTINATION_OCCUPIED";
    pub const RECONSTRUCT_DEPENDENCY_MISSING: &str = "RECONSTRUCT_DEPENDENCY_MISSING";
    pub const FIXTURE_INVALID: &str = "FIXTURE_INVALID";
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Core error type for pkgfix operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("package.json is missing a name")]
    ManifestNameMissing,

    #[error("{name}'s package.json is missing a version")]
    ManifestVersionMissing { name: String },

    #[error("invalid package.json at {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("invalid file tree: {0}")]
    FileTreeInvalid(String),

    #[error("this project already has a baseDir ({current})")]
    BaseDirAlreadySet { current: PathBuf },

    #[error("{name} is already placed at {current}, cannot move it to {requested}")]
    BaseDirConflict {
        name: String,
        current: PathBuf,
        requested: PathBuf,
    },

    #[error("failed to locate {name} in {dir}")]
    LinkUnresolved { name: String, dir: PathBuf },

    #[error("package {package} in {dir} depends on {name} but it could not be resolved")]
    LinkDependencyUnresolved {
        name: String,
        package: String,
        dir: PathBuf,
    },

    #[error("cannot link {target} at {path}: something else is already there")]
    LinkDestinationOccupied { path: PathBuf, target: PathBuf },

    #[error("{name} is listed in {dir}/package.json but missing from node_modules")]
    DependencyMissing { name: String, dir: PathBuf },

    #[error("invalid fixture: {0}")]
    FixtureInvalid(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ManifestNameMissing => codes::MANIFEST_NAME_MISSING,
            Self::ManifestVersionMissing { .. } => codes::MANIFEST_VERSION_MISSING,
            Self::ManifestInvalid { .. } => codes::MANIFEST_INVALID,
            Self::FileTreeInvalid(_) => codes::FILE_TREE_INVALID,
            Self::BaseDirAlreadySet { .. } => codes::BASE_DIR_ALREADY_SET,
            Self::BaseDirConflict { .. } => codes::BASE_DIR_CONFLICT,
            Self::LinkUnresolved { .. } => codes::LINK_UNRESOLVED,
            Self::LinkDependencyUnresolved { .. } => codes::LINK_DEPENDENCY_UNRESOLVED,
            Self::LinkDestinationOccupied { .. } => codes::LINK_DESTINATION_OCCUPIED,
            Self::DependencyMissing { .. } => codes::RECONSTRUCT_DEPENDENCY_MISSING,
            Self::FixtureInvalid(_) => codes::FIXTURE_INVALID,
            Self::Io { .. } => codes::IO_ERROR,
        }
    }

    /// The underlying IO error, for filesystem failures.
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for pkgfix operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach the offending path to an IO result.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
