use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration for the pkgfix CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Whether peer expansions may hard-link files. When off, files are
    /// always copied.
    pub hard_links: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            hard_links: true,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Allow or forbid hard links.
    #[must_use]
    pub fn with_hard_links(mut self, hard_links: bool) -> Self {
        self.hard_links = hard_links;
        self
    }

    /// Resolve `path` against the working directory.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = Config::new(PathBuf::from("/work"))
            .with_verbosity(2)
            .with_json_logs(true)
            .with_hard_links(false);
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
        assert!(!config.hard_links);
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::new(PathBuf::from("/work"));
        assert_eq!(
            config.resolve_path(Path::new("fixture.json")),
            PathBuf::from("/work/fixture.json")
        );
        assert_eq!(config.resolve_path(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
