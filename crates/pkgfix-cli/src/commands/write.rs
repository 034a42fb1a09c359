//! `pkgfix write` command implementation.
//!
//! Load a fixture description and materialize it on disk.

use super::{fail, fail_with, FIXTURE_READ_FAILED};
use miette::{IntoDiagnostic, Result};
use pkgfix_core::{Config, FixtureSpec, Materializer, Project};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Run the write command.
pub fn run(config: &Config, fixture: &Path, dir: Option<&Path>, json: bool) -> Result<()> {
    let fixture_path = config.resolve_path(fixture);
    let content = match fs::read_to_string(&fixture_path) {
        Ok(content) => content,
        Err(e) => fail(
            FIXTURE_READ_FAILED,
            format!("failed to read {}: {e}", fixture_path.display()),
            json,
        ),
    };

    let mut spec = FixtureSpec::from_json(&content).unwrap_or_else(|e| fail_with(&e, json));
    // Relative link paths are relative to the fixture file
    if let Some(fixture_dir) = fixture_path.parent() {
        spec.rebase_paths(fixture_dir);
    }
    let project = Project::from_fixture(&spec).unwrap_or_else(|e| fail_with(&e, json));

    let root = match dir {
        Some(dir) => config.resolve_path(dir),
        None => kept_temp_dir()?,
    };
    debug!(root = %root.display(), "Writing fixture");
    if let Err(e) = project.set_base_dir(&root) {
        fail_with(&e, json);
    }

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let mut session = Materializer::from_config(config);
    if let Err(e) = runtime.block_on(project.write_using(&mut session)) {
        fail_with(&e, json);
    }

    let name = project.name().unwrap_or_else(|e| fail_with(&e, json));
    let version = project.version().unwrap_or_else(|e| fail_with(&e, json));
    info!(name = %name, root = %root.display(), "Fixture written");

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "root": root.to_string_lossy(),
                "name": name,
                "version": version,
                "hard_links": session.uses_hard_links()
            })
        );
    } else {
        println!("{}", root.display());
    }
    Ok(())
}

/// A fresh directory under the system temp dir that outlives the process,
/// as its canonical path.
fn kept_temp_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("pkgfix-")
        .keep(true)
        .tempdir()
        .into_diagnostic()?;
    dunce::canonicalize(dir.path()).into_diagnostic()
}
