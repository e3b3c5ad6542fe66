use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn atlas_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("atlas");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Nothing here matches the extension allow-list.
    let project = root.join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("README.md"), "# Project\n\nNo code yet.\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/atlas.sqlite"

[backend]
provider = "ollama"
url = "http://127.0.0.1:9"
timeout_secs = 2
max_retries = 0

[scan]
step_size = 100
workers = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("atlas.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_atlas(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = atlas_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run atlas binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_atlas(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));
    assert!(tmp.path().join("data/atlas.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_atlas(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_atlas(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_scan_without_sources() {
    let (tmp, config_path) = setup_test_env();
    let project = tmp.path().join("project");

    let (stdout, stderr, success) =
        run_atlas(&config_path, &["scan", project.to_str().unwrap(), "--progress", "off"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files found: 0"));
    assert!(stdout.contains("functions saved: 0"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_scan_needs_a_directory() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_atlas(&config_path, &["scan"]);
    assert!(!success);
    assert!(stderr.contains("root"), "stderr={}", stderr);
}

#[test]
fn test_scan_missing_directory_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("does-not-exist");

    let (_, stderr, success) =
        run_atlas(&config_path, &["scan", missing.to_str().unwrap(), "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("cannot walk"), "stderr={}", stderr);
}

#[test]
fn test_scan_rejects_unknown_progress_mode() {
    let (tmp, config_path) = setup_test_env();
    let project = tmp.path().join("project");

    let (_, stderr, success) =
        run_atlas(&config_path, &["scan", project.to_str().unwrap(), "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("unknown progress mode"));
}

#[test]
fn test_json_progress_goes_to_stderr() {
    let (tmp, config_path) = setup_test_env();
    let project = tmp.path().join("project");

    let (stdout, stderr, success) =
        run_atlas(&config_path, &["scan", project.to_str().unwrap(), "--progress", "json"]);
    assert!(success, "scan failed: stderr={}", stderr);
    assert!(stderr.contains(r#""phase":"discovered""#));
    assert!(!stdout.contains("progress"));
}

#[test]
fn test_listings_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_atlas(&config_path, &["init"]);

    let (stdout, _, success) = run_atlas(&config_path, &["files"]);
    assert!(success);
    assert!(stdout.starts_with("ID"));

    let (stdout, _, success) = run_atlas(&config_path, &["functions", "--json"]);
    assert!(success);
    assert_eq!(stdout.trim(), "[]");

    let (stdout, _, success) = run_atlas(&config_path, &["functions"]);
    assert!(success);
    assert!(stdout.contains("no functions"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[db]\npath = \"x.sqlite\"\n[scan]\nworkers = 0\n").unwrap();

    let (_, stderr, success) = run_atlas(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("workers"));
}
