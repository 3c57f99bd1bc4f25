//! Integration tests for the `chai` binary.
//!
//! Every test points `CHAI_HOME` at a scratch directory and only exercises
//! paths that need no network.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn chai(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_chai"));
    cmd.env("CHAI_HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("CHAI_CONCURRENCY");
    cmd
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"))
}

#[test]
fn test_version() {
    let home = tempdir().unwrap();
    let output = chai(home.path()).arg("version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("chai "));

    let output = chai(home.path()).args(["--json", "version"]).output().unwrap();
    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert!(json["version"].is_string());
}

#[test]
fn test_list_empty_sandbox() {
    let home = tempdir().unwrap();
    let output = chai(home.path()).args(["--json", "list"]).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["packages"], serde_json::json!([]));
}

#[test]
fn test_list_shows_store_contents() {
    let home = tempdir().unwrap();
    fs::create_dir_all(home.path().join("packages/npm/chalk/5.3.0")).unwrap();
    fs::create_dir_all(home.path().join("packages/github/user/repo/latest")).unwrap();

    let output = chai(home.path()).arg("list").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("npm:chalk@5.3.0"));
    assert!(stdout.contains("gh:user/repo@latest"));
}

#[test]
fn test_clean_all() {
    let home = tempdir().unwrap();
    fs::create_dir_all(home.path().join("cache/npm")).unwrap();
    fs::write(home.path().join("cache/npm/a-1.0.0.tgz"), vec![0u8; 64]).unwrap();
    fs::create_dir_all(home.path().join("tmp")).unwrap();
    fs::write(home.path().join("tmp/scratch"), vec![0u8; 16]).unwrap();

    let output = chai(home.path())
        .args(["--json", "clean", "--all"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["freed_bytes"], 80);
    assert_eq!(json["cleaned"][0]["name"], "cache");
    assert_eq!(json["cleaned"][1]["name"], "tmp");
    assert!(!home.path().join("cache/npm").exists());
    assert!(home.path().join("cache").is_dir());
}

#[test]
fn test_invalid_identifier_json_error() {
    let home = tempdir().unwrap();
    let output = chai(home.path())
        .args(["--json", "install", "gh:not-a-repo"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "PKG_INVALID_IDENTIFIER");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("gh:not-a-repo"));
}

#[test]
fn test_unknown_source_is_rejected() {
    let home = tempdir().unwrap();
    let output = chai(home.path())
        .args(["--json", "install", "chalk", "--from", "cargo"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(
        stdout_json(&output)["error"]["code"],
        "PKG_INVALID_IDENTIFIER"
    );
}

#[test]
fn test_system_install_records_dependency() {
    let home = tempdir().unwrap();
    let project = tempdir().unwrap();
    fs::write(
        project.path().join("manifest.chai.json"),
        r#"{"name":"app","version":"0.1.0"}"#,
    )
    .unwrap();

    let output = chai(home.path())
        .args(["--json", "install", "curl", "--from", "sys", "--yes", "--cwd"])
        .arg(project.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["nodes"][0]["status"], "recorded");

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(project.path().join("manifest.chai.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["dependencies"]["sys:curl"], "*");
    assert_eq!(manifest["name"], "app");
    assert!(project.path().join("chai.lock").is_file());
}

#[test]
fn test_info_reads_local_manifest() {
    let home = tempdir().unwrap();
    let project = tempdir().unwrap();
    fs::write(
        project.path().join("package.json"),
        r#"{"name":"local-pkg","version":"2.0.0","dependencies":{"chalk":"^5"},"bin":"cli.js"}"#,
    )
    .unwrap();

    let output = chai(home.path())
        .args(["--json", "info", ".", "--cwd"])
        .arg(project.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["manifest"]["name"], "local-pkg");
    assert_eq!(json["manifest"]["version"], "2.0.0");
    assert_eq!(json["manifest"]["dependencies"]["chalk"], "^5");
}

#[test]
fn test_info_missing_manifest() {
    let home = tempdir().unwrap();
    let project = tempdir().unwrap();
    fs::create_dir(project.path().join("empty")).unwrap();

    let output = chai(home.path())
        .args(["--json", "info", "empty", "--cwd"])
        .arg(project.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error"]["code"], "PKG_MISSING_MANIFEST");
}
