//! End-to-end tests of the crawlgrid binary

use std::process::{Command, Output};
use tempfile::TempDir;

fn crawlgrid(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_crawlgrid"))
        .args(["-c", "/dev/null", "--no-color", "-l", "warn"])
        .arg("-D")
        .arg(format!("grid.storage.path={}", dir.path().display()))
        .args(args)
        .output()
        .expect("crawlgrid binary runs")
}

#[test]
fn test_send_status_clear() {
    let dir = TempDir::new().unwrap();

    assert!(crawlgrid(&dir, &["-s", "loader", "send", "webloader_00"]).status.success());
    let payload = r#"{"data":[1],"actions":[{"type":"loader","queue":"webloader_00"}]}"#;
    assert!(crawlgrid(&dir, &["-s", "loader", "send", "webloader_00", payload]).status.success());

    let status = crawlgrid(&dir, &["-s", "loader", "status"]);
    assert!(status.status.success());
    let stdout = String::from_utf8_lossy(&status.stdout);
    let line = stdout.lines().find(|l| l.contains("webloader_00")).unwrap();
    assert!(line.trim_end().ends_with('2'), "got: {}", stdout);

    assert!(crawlgrid(&dir, &["-s", "loader", "clear", "webloader_00"]).status.success());
    let stdout = String::from_utf8_lossy(&crawlgrid(&dir, &["status"]).stdout).to_string();
    assert_eq!(stdout.lines().count(), 6, "every source queue listed: {}", stdout);
    assert!(stdout.lines().all(|l| l.trim_end().ends_with('0')), "got: {}", stdout);
}

#[test]
fn test_failures_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    assert!(!crawlgrid(&dir, &["send", "webloader_00"]).status.success());
    assert!(!crawlgrid(&dir, &["-s", "loader", "send", "webloader_00", "{oops"]).status.success());
    assert!(!crawlgrid(&dir, &["-s", "mcp"]).status.success());
    assert!(!crawlgrid(&dir, &["-s", "nobody", "status"]).status.success());
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    let output = crawlgrid(&dir, &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}
