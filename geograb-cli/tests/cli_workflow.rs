//! Integration tests for the geograb binary.
//!
//! These tests run the built CLI against a temporary home directory and
//! verify:
//! - Help and version output
//! - Config file creation and listing
//! - Region listing and detection from the built-in registry
//! - Exit codes for bad arguments

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run a CLI command with `home` as the home directory and capture output.
fn run_cli(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_geograb"))
        .args(args)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Assert a command succeeded.
fn assert_success(output: &Output, context: &str) {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "{} failed:\nstdout: {}\nstderr: {}",
            context,
            stdout(output),
            stderr
        );
    }
}

// ============================================================================
// Help and config
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &["--help"]);
    assert_success(&output, "--help");

    let text = stdout(&output);
    for command in ["detect", "services", "dir", "layers", "check", "download", "config"] {
        assert!(text.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_config_init_then_list() {
    let home = TempDir::new().unwrap();

    let output = run_cli(home.path(), &["config", "path"]);
    assert_success(&output, "config path");
    let path = stdout(&output).trim().to_string();
    assert!(path.ends_with("config.ini"));
    assert!(!Path::new(&path).exists());

    let output = run_cli(home.path(), &["config", "init"]);
    assert_success(&output, "config init");
    assert!(Path::new(&path).exists());

    let output = run_cli(home.path(), &["config", "init"]);
    assert_success(&output, "second config init");
    assert!(stdout(&output).contains("already exists"));

    let output = run_cli(home.path(), &["config", "list"]);
    assert_success(&output, "config list");
    let text = stdout(&output);
    assert!(text.contains("[fetch]"));
    assert!(text.contains("[safety]"));
    assert!(text.contains("block_feature_count = 100000"));
}

// ============================================================================
// Registry commands
// ============================================================================

#[test]
fn test_services_lists_builtin_regions() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &["services"]);
    assert_success(&output, "services");

    let text = stdout(&output);
    assert!(text.contains("charleston_county"));
    assert!(text.contains("site_survey"));
}

#[test]
fn test_detect_point() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &["detect", "--point=-79.93,32.78"]);
    assert_success(&output, "detect");
    assert!(stdout(&output).contains("(charleston_county)"));

    let output = run_cli(home.path(), &["detect", "--point=-100.0,40.0"]);
    assert_success(&output, "detect outside");
    assert!(stdout(&output).contains("No region matched."));
}

#[test]
fn test_unknown_region_fails() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &["services", "atlantis"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_download_rejects_bad_layer_url() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out.gpkg");
    let output = run_cli(
        home.path(),
        &[
            "download",
            "--layer",
            "https://gis.example.com/MapServer",
            "--bbox=-80.1,32.9,-79.9,33.1",
            "--output",
            out.to_str().unwrap(),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid layer URL"));
    assert!(!out.exists());
}
