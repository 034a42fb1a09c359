//! Integration tests for `pkgfix write` and `pkgfix read`.
//!
//! These tests drive the built binary against fixture files in temp dirs.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn pkgfix() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pkgfix"))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

const DEMO: &str = r#"{
    "name": "demo",
    "version": "1.0.0",
    "files": { "index.js": "require('left-pad');" },
    "dependencies": {
        "left-pad": { "version": "1.3.0" }
    },
    "links": {
        "local": { "target": "local" }
    }
}"#;

/// Write the demo fixture plus the local package it links to.
fn demo_fixture(dir: &Path) -> std::path::PathBuf {
    let local = dir.join("local");
    fs::create_dir_all(&local).unwrap();
    fs::write(
        local.join("package.json"),
        r#"{"name": "local", "version": "0.2.0"}"#,
    )
    .unwrap();
    let fixture = dir.join("demo.json");
    fs::write(&fixture, DEMO).unwrap();
    fixture
}

#[test]
fn test_version_prints_name() {
    let output = pkgfix().arg("version").output().expect("Failed to run pkgfix");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("pkgfix "), "{stdout}");
}

#[test]
fn test_write_json_output() {
    let work = tempdir().unwrap();
    let fixture = demo_fixture(work.path());
    let out = work.path().join("out");

    let output = pkgfix()
        .args(["--json", "write"])
        .arg(&fixture)
        .arg("--dir")
        .arg(&out)
        .output()
        .expect("Failed to run pkgfix write");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = stdout_json(&output);
    assert_eq!(result["ok"], true);
    assert_eq!(result["name"], "demo");

    let root = read_json(&out.join("package.json"));
    assert_eq!(root["dependencies"]["left-pad"], "1.3.0");
    assert_eq!(root["dependencies"]["local"], "0.2.0");
    assert!(out.join("node_modules/left-pad/package.json").is_file());
    assert!(out.join("node_modules/local/package.json").is_file());
}

#[test]
fn test_write_default_dir_is_canonical() {
    let work = tempdir().unwrap();
    let fixture = demo_fixture(work.path());

    let output = pkgfix()
        .args(["--json", "write"])
        .arg(&fixture)
        .output()
        .expect("Failed to run pkgfix write");
    assert!(output.status.success());

    let result = stdout_json(&output);
    let root = Path::new(result["root"].as_str().unwrap()).to_path_buf();
    let canonical = dunce::canonicalize(&root).unwrap();
    fs::remove_dir_all(&root).unwrap();
    assert_eq!(root, canonical);
}

#[test]
fn test_write_relative_paths_use_cwd() {
    let work = tempdir().unwrap();
    demo_fixture(work.path());

    let output = pkgfix()
        .arg("--cwd")
        .arg(work.path())
        .args(["write", "demo.json", "--dir", "out"])
        .output()
        .expect("Failed to run pkgfix write");
    assert!(output.status.success());
    assert!(work.path().join("out/node_modules/left-pad").is_dir());
}

#[test]
fn test_write_invalid_fixture_reports_code() {
    let work = tempdir().unwrap();
    let fixture = work.path().join("bad.json");
    fs::write(&fixture, r#"{"dependencies": []}"#).unwrap();

    let output = pkgfix()
        .args(["--json", "write"])
        .arg(&fixture)
        .output()
        .expect("Failed to run pkgfix write");
    assert!(!output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["ok"], false);
    assert_eq!(result["error"]["code"], "FIXTURE_INVALID");
}

#[test]
fn test_write_unresolvable_link_fails() {
    let work = tempdir().unwrap();
    let fixture = work.path().join("ghost.json");
    fs::write(
        &fixture,
        r#"{"name": "app", "version": "1.0.0", "links": {"ghost": {"baseDir": "."}}}"#,
    )
    .unwrap();

    let output = pkgfix()
        .args(["--json", "write"])
        .arg(&fixture)
        .arg("--dir")
        .arg(work.path().join("out"))
        .output()
        .expect("Failed to run pkgfix write");
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error"]["code"], "LINK_UNRESOLVED");
}

#[test]
fn test_read_after_write() {
    let work = tempdir().unwrap();
    let fixture = demo_fixture(work.path());
    let out = work.path().join("out");
    let status = pkgfix()
        .arg("write")
        .arg(&fixture)
        .arg("--dir")
        .arg(&out)
        .status()
        .expect("Failed to run pkgfix write");
    assert!(status.success());

    let output = pkgfix()
        .args(["--json", "read"])
        .arg(&out)
        .arg("--link-deps")
        .output()
        .expect("Failed to run pkgfix read");
    assert!(output.status.success());

    let result = stdout_json(&output);
    let spec = &result["fixture"];
    assert_eq!(spec["name"], "demo");
    assert_eq!(spec["version"], "1.0.0");
    assert!(spec["links"]["left-pad"]["baseDir"].is_string());
    assert!(spec["links"]["local"]["baseDir"].is_string());
    assert!(spec.get("dependencies").is_none());
}

#[test]
fn test_read_missing_dependency_fails() {
    let work = tempdir().unwrap();
    fs::write(
        work.path().join("package.json"),
        r#"{"name": "app", "version": "1.0.0", "dependencies": {"gone": "1.0.0"}}"#,
    )
    .unwrap();

    let output = pkgfix()
        .args(["--json", "read"])
        .arg(work.path())
        .output()
        .expect("Failed to run pkgfix read");
    assert!(!output.status.success());
    assert_eq!(
        stdout_json(&output)["error"]["code"],
        "RECONSTRUCT_DEPENDENCY_MISSING"
    );
}
