//! Executable entry points in `node_modules/.bin`.

use crate::error::{Error, IoResultExt, Result};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::resolve::parse_scoped;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Directory holding executable entry points.
pub const BIN_DIR: &str = ".bin";

/// Install the `bin` entries of every package directly inside `node_modules`.
///
/// Packages are processed one at a time in sorted order, scoped packages
/// included. Existing entries in `.bin` are replaced. Returns the number of
/// entries installed; a missing `node_modules` installs nothing.
///
/// # Errors
/// Fails on unreadable directories or manifests, or if an entry cannot be
/// created.
pub async fn link_bins(node_modules: &Path) -> Result<usize> {
    let mut installed = 0;
    for package in installed_packages(node_modules).await? {
        installed += link_package_bins(node_modules, &package).await?;
    }
    if installed > 0 {
        debug!(path = %node_modules.display(), count = installed, "Linked bins");
    }
    Ok(installed)
}

/// Package directories directly inside `node_modules`, sorted.
async fn installed_packages(node_modules: &Path) -> Result<Vec<PathBuf>> {
    let mut packages = Vec::new();
    for (name, path) in list_dirs(node_modules).await? {
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            packages.extend(list_dirs(&path).await?.into_iter().map(|(_, p)| p));
        } else {
            packages.push(path);
        }
    }
    packages.sort();
    Ok(packages)
}

/// Subdirectories of `dir` (following symlinks). Missing `dir` lists nothing.
async fn list_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.at(dir)? {
        let path = entry.path();
        if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    Ok(dirs)
}

async fn link_package_bins(node_modules: &Path, package: &Path) -> Result<usize> {
    let manifest_path = package.join(MANIFEST_FILE);
    let content = match fs::read_to_string(&manifest_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io(manifest_path, e)),
    };
    let manifest = Manifest::parse(&content, &manifest_path)?;

    let mut installed = 0;
    for (bin_name, relative) in bin_entries(&manifest) {
        if !is_plain_name(&bin_name) {
            warn!(package = %package.display(), bin = %bin_name, "Skipping bin with unsafe name");
            continue;
        }
        let target = package.join(&relative);
        if !fs::try_exists(&target).await.unwrap_or(false) {
            warn!(bin = %bin_name, target = %target.display(), "Skipping bin with missing target");
            continue;
        }

        let bin_dir = node_modules.join(BIN_DIR);
        fs::create_dir_all(&bin_dir).await.at(&bin_dir)?;
        let from_bin_dir = Path::new("..")
            .join(package.strip_prefix(node_modules).unwrap_or(package))
            .join(&relative);
        install_entry(&bin_dir, &bin_name, &from_bin_dir, &target).await?;
        installed += 1;
    }
    Ok(installed)
}

/// `(bin name, path relative to the package)` pairs a manifest declares.
fn bin_entries(manifest: &Manifest) -> Vec<(String, String)> {
    match manifest.get("bin") {
        Some(Value::String(path)) => manifest
            .name()
            .map(|name| {
                let bare = parse_scoped(name).map_or(name, |(_, bare)| bare);
                vec![(bare.to_string(), path.clone())]
            })
            .unwrap_or_default(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, path)| Some((name.clone(), path.as_str()?.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\')
}

#[cfg(unix)]
async fn install_entry(bin_dir: &Path, name: &str, relative: &Path, target: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let link = bin_dir.join(name);
    remove_existing(&link).await?;
    fs::symlink(relative, &link).await.at(&link)?;

    let mut permissions = fs::metadata(target).await.at(target)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(target, permissions).await.at(target)
}

#[cfg(not(unix))]
async fn install_entry(bin_dir: &Path, name: &str, relative: &Path, _target: &Path) -> Result<()> {
    let shim = bin_dir.join(format!("{name}.cmd"));
    remove_existing(&shim).await?;
    let script = format!(
        "@ECHO off\r\nnode \"%~dp0\\{}\" %*\r\n",
        relative.display().to_string().replace('/', "\\")
    );
    fs::write(&shim, script).await.at(&shim)
}

async fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(_) => fs::remove_file(path).await.at(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
