//! Integration tests for the `llrp-fleet` binary.
//!
//! These cover argument parsing, config handling and error reporting
//! without a live reader.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation.
///
/// Clears `LLRP_*` overrides and points the platform config directory
/// into `home` so tests never touch the user's real configuration.
fn fleet_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("llrp-fleet");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("LLRP_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("fleet.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = fleet_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("serve")
            .and(predicate::str::contains("read"))
            .and(predicate::str::contains("write"))
            .and(predicate::str::contains("discover")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("llrp-fleet"));
}

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("llrp-fleet"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("custom.toml");
    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("nested").join("fleet.toml");

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("command_timeout_secs = 30")
                .and(predicate::str::contains("name = \"llrp-fleet\"")),
        );
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let home = TempDir::new().unwrap();
    let path = write_config(&home, "[service]\ncommand_timeout_secs = 5\n");

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    assert!(std::fs::read_to_string(&path).unwrap().contains("= 5"));

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
    assert!(std::fs::read_to_string(&path).unwrap().contains("= 30"));
}

#[test]
fn test_config_show_json() {
    let home = TempDir::new().unwrap();
    let path = write_config(&home, "[devices.dock-door]\nhost = \"10.0.0.5\"\n");

    let output = fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["devices"]["dock-door"]["host"], "10.0.0.5");
    assert_eq!(json["devices"]["dock-door"]["port"], 5084);
}

#[test]
fn test_invalid_config_names_the_field() {
    let home = TempDir::new().unwrap();
    let path = write_config(&home, "[service]\ncommand_timeout_secs = 0\n");

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("service.command_timeout_secs"));
}

// ── Read / write ────────────────────────────────────────────────────

#[test]
fn test_malformed_param_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["write", "dock-door", "--host", "127.0.0.1", "ROSpecID", "-P", "ROSpecID"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NAME=VALUE"));
}

#[test]
fn test_unknown_device_needs_a_host() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["read", "dock-door", "ROSpec"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No address for device 'dock-door'"));
}

#[test]
fn test_unknown_resource_is_rejected_before_dialing() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["read", "dock-door", "--host", "127.0.0.1", "--port"])
        .arg(closed_port().to_string())
        .arg("Bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Bogus"));
}

#[test]
fn test_unknown_action_is_rejected_before_dialing() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["write", "dock-door", "--host", "127.0.0.1", "--port"])
        .arg(closed_port().to_string())
        .args(["ROSpecID", "-P", "ROSpecID=42:u32", "-P", "Action=Pause"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Pause"));
}

#[test]
fn test_unreachable_reader_is_a_connection_error() {
    let home = TempDir::new().unwrap();
    let port = closed_port();
    let path = write_config(
        &home,
        &format!("[service]\ndial_timeout_secs = 2\n\n[devices.dock-door]\nhost = \"127.0.0.1\"\nport = {port}\n"),
    );

    fleet_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["read", "dock-door", "ReaderCapabilities"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("dock-door"));
}

// ── Discover ────────────────────────────────────────────────────────

#[test]
fn test_discover_without_subnets() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .arg("discover")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no subnets"));
}

#[test]
fn test_discover_rejects_oversized_subnets() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["discover", "--subnet", "10.0.0.0/8"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("10.0.0.0/8"));
}

#[test]
fn test_discover_finds_nothing_on_a_closed_port() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path())
        .args(["discover", "--subnet", "127.0.0.1/32", "--probe-timeout-ms", "200", "--port"])
        .arg(closed_port().to_string())
        .args(["-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}
