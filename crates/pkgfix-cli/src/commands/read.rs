//! `pkgfix read` command implementation.
//!
//! Reconstruct a project graph from an installed directory and print it as a
//! fixture description.

use super::fail_with;
use miette::Result;
use pkgfix_core::{Config, Project, ReadDirOptions};
use std::path::Path;

/// Run the read command.
pub fn run(
    config: &Config,
    dir: &Path,
    link_deps: bool,
    link_dev_deps: bool,
    json: bool,
) -> Result<()> {
    let root = config.resolve_path(dir);
    let options = ReadDirOptions {
        link_deps,
        link_dev_deps,
    };

    let project = Project::from_dir(&root, options).unwrap_or_else(|e| fail_with(&e, json));
    let spec = project.to_fixture().unwrap_or_else(|e| fail_with(&e, json));

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "root": root.to_string_lossy(),
                "fixture": spec
            })
        );
    } else {
        let text = spec.to_json_pretty().unwrap_or_else(|e| fail_with(&e, json));
        println!("{text}");
    }
    Ok(())
}
