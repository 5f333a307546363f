//! Integration tests for the `sprout` binary.
//!
//! Argument parsing, completions, and error exit codes run without any
//! backend; the data commands run against a wiremock backend.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// The `sprout` binary with `SPROUT_*` cleared and config directories
/// pointed at a path that does not exist.
fn sprout_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("sprout");
    cmd.env("HOME", "/tmp/sprout-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/sprout-cli-test-nonexistent")
        .env_remove("SPROUT_PROFILE")
        .env_remove("SPROUT_BACKEND")
        .env_remove("SPROUT_API_KEY")
        .env_remove("SPROUT_TOKEN")
        .env_remove("SPROUT_OUTPUT")
        .env_remove("SPROUT_INSECURE")
        .env_remove("SPROUT_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A backend where every stock channel has a last value and no
/// thresholds are stored server-side.
async fn greenhouse() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/temp/data/last"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "24.5",
            "created_at": "2026-03-01T08:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(humidity|moisture|light)/data/last$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "55",
            "created_at": "2026-03-01T08:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(pump|fan|led)/data/last$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "0",
            "created_at": "2026-03-01T08:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    server
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_usage() {
    let output = sprout_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    sprout_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("greenhouse")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("thresholds")),
    );
}

#[test]
fn version_flag() {
    sprout_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sprout"));
}

#[test]
fn completions_for_zsh() {
    sprout_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    sprout_cmd().arg("prune").assert().code(2);
}

#[test]
fn history_limit_is_range_checked() {
    sprout_cmd()
        .args(["history", "temp", "--limit", "5000"])
        .assert()
        .code(2);
}

#[test]
fn threshold_clear_conflicts_with_bounds() {
    sprout_cmd()
        .args(["thresholds", "set", "temp", "--clear", "--upper", "30"])
        .assert()
        .code(2);
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn missing_backend_exits_with_usage_code() {
    sprout_cmd()
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn config_path_prints_a_toml_file() {
    sprout_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_file_secrets_are_masked() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("sprout");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
[profiles.default]
backend = "http://gh.local:5000"
api_key = "aio_top_secret"
"#,
    )
    .unwrap();

    let output = sprout_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();

    let text = combined_output(&output);
    assert!(output.status.success(), "{text}");
    assert!(!text.contains("aio_top_secret"));
    assert!(text.contains("****"));
}

// ── Backend commands ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_every_channel_as_json() {
    let server = greenhouse().await;

    let output = sprout_cmd()
        .args(["status", "--backend", &server.uri(), "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let entries: Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 7);

    let temp = entries.iter().find(|e| e["channel"] == "temp").unwrap();
    assert_eq!(temp["kind"], "sensor");
    assert_eq!(temp["value"], json!(24.5));
    assert_eq!(temp["stale"], json!(false));

    let pump = entries.iter().find(|e| e["channel"] == "pump").unwrap();
    assert_eq!(pump["kind"], "actuator");
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_reports_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello from the greenhouse"))
        .mount(&server)
        .await;

    let output = sprout_cmd()
        .args(["ping", "--backend", &server.uri(), "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let pong: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(pong["response"], "Hello from the greenhouse");
}

#[tokio::test(flavor = "multi_thread")]
async fn history_prints_plain_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moisture/data"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "value": "41", "created_at": "2026-03-01T08:30:00Z" },
            { "value": "43", "created_at": "2026-03-01T08:25:00Z" }
        ])))
        .mount(&server)
        .await;

    let output = sprout_cmd()
        .args(["history", "moisture", "--limit", "2", "--backend", &server.uri(), "-o", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\t41"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_channel_exits_not_found() {
    let server = MockServer::start().await;

    sprout_cmd()
        .args(["history", "co2", "--backend", &server.uri()])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("co2"));
}

#[test]
fn unreachable_backend_exits_with_connection_code() {
    sprout_cmd()
        .args(["status", "--backend", "http://127.0.0.1:9", "--timeout", "2"])
        .assert()
        .code(7);
}

#[test]
fn sensors_cannot_be_set() {
    sprout_cmd()
        .args(["set", "temp", "1", "--backend", "http://127.0.0.1:9"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sensor"));
}
