//! `package.json` model.
//!
//! A manifest is an arbitrary JSON object. Only `name` and `version` are
//! required, and their absence is reported when they are read rather than
//! when the manifest is parsed.

use crate::error::{Error, IoResultExt, Result};
use pkgfix_util::fs::atomic_write;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// File name of every manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Dependency sections of a manifest.
pub mod sections {
    pub const DEPENDENCIES: &str = "dependencies";
    pub const DEV_DEPENDENCIES: &str = "devDependencies";
    pub const PEER_DEPENDENCIES: &str = "peerDependencies";
}

/// A parsed `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Create a manifest holding just a name and a version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(name.into()));
        map.insert("version".into(), Value::String(version.into()));
        Self(map)
    }

    /// Parse manifest text. `path` is only used for error reporting.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| Error::ManifestInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(Error::ManifestInvalid {
                path: path.to_path_buf(),
                message: "package.json must be a JSON object".into(),
            }),
        }
    }

    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).at(path)?;
        Self::parse(&content, path)
    }

    /// Read `<dir>/package.json`.
    pub fn read_dir(dir: &Path) -> Result<Self> {
        Self::read(&dir.join(MANIFEST_FILE))
    }

    /// The package name.
    ///
    /// # Errors
    /// Fails if `name` is absent, not a string, or empty.
    pub fn name(&self) -> Result<&str> {
        match self.0.get("name") {
            Some(Value::String(name)) if !name.is_empty() => Ok(name),
            _ => Err(Error::ManifestNameMissing),
        }
    }

    /// The package version.
    ///
    /// # Errors
    /// Fails if the name is missing, or if `version` is absent, not a string, or empty.
    pub fn version(&self) -> Result<&str> {
        let name = self.name()?;
        match self.0.get("version") {
            Some(Value::String(version)) if !version.is_empty() => Ok(version),
            _ => Err(Error::ManifestVersionMissing {
                name: name.to_string(),
            }),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.0.insert("name".into(), Value::String(name.into()));
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.0.insert("version".into(), Value::String(version.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove `key`, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Names listed in a dependency section, in key order.
    ///
    /// A missing section, or one that is not an object, lists nothing.
    #[must_use]
    pub fn section_names(&self, section: &str) -> Vec<String> {
        self.0
            .get(section)
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The range a section records for `name`, if it is a string.
    #[must_use]
    pub fn section_range(&self, section: &str, name: &str) -> Option<&str> {
        self.0
            .get(section)
            .and_then(Value::as_object)
            .and_then(|deps| deps.get(name))
            .and_then(Value::as_str)
    }

    /// Names of the declared peer dependencies.
    #[must_use]
    pub fn peer_dependency_names(&self) -> BTreeSet<String> {
        self.section_names(sections::PEER_DEPENDENCIES)
            .into_iter()
            .collect()
    }

    /// Serialize with two-space indentation and a trailing newline.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        // A map of JSON values always serializes
        let mut out = serde_json::to_string_pretty(&self.0).unwrap_or_default();
        out.push('\n');
        out
    }

    /// Write `<dir>/package.json` atomically.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        atomic_write(&path, self.to_json_pretty().as_bytes()).at(&path)
    }
}

impl From<Map<String, Value>> for Manifest {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
