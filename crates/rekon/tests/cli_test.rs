//! Integration tests for the `rekon` CLI binary.
//!
//! Offline commands run end to end against a temporary schema; device
//! commands run against a mock device.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCHEMA: &str = r"
resources:
  - name: policy
    path: firewall/policy
    id_field: policyid
    ignore: [q_origin_key]
    fields:
      - { name: policyid, type: integer }
      - { name: comments }
      - { name: action, default: deny, required: true }
      - name: session_ttl
        type: integer
        coercion:
          - { below: 6.2.4, encode: string }
      - name: srcintf
        kind: set-of-object
        key: name
        fields:
          - { name: name }
";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `rekon` binary with env isolation.
fn rekon_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rekon");
    cmd.env("HOME", "/tmp/rekon-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/rekon-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("REKON_PROFILE")
        .env_remove("REKON_CONFIG")
        .env_remove("REKON_URL")
        .env_remove("REKON_SCOPE")
        .env_remove("REKON_API_KEY")
        .env_remove("REKON_SCHEMA")
        .env_remove("REKON_OUTPUT")
        .env_remove("REKON_INSECURE")
        .env_remove("REKON_TIMEOUT");
    cmd
}

/// A scratch directory holding the schema plus any JSON inputs.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("schema.yaml"), SCHEMA).unwrap();
        Self { dir }
    }

    fn schema(&self) -> PathBuf {
        self.dir.path().join("schema.yaml")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = rekon_cmd();
        cmd.arg("--schema").arg(self.schema());
        cmd.arg("--config").arg(self.config());
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let output = rekon_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    rekon_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("flatten")
            .and(predicate::str::contains("expand"))
            .and(predicate::str::contains("plan"))
            .and(predicate::str::contains("apply")),
    );
}

#[test]
fn version_flag() {
    rekon_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rekon"));
}

#[test]
fn completions_zsh() {
    rekon_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Offline conversions ─────────────────────────────────────────────

#[test]
fn flatten_decodes_gated_values_and_sorts_sets() {
    let ws = Workspace::new();
    let wire = ws.json(
        "wire.json",
        &json!({
            "policyid": 7,
            "q_origin_key": 7,
            "action": "accept",
            "session-ttl": "300",
            "srcintf": [{ "name": "port2" }, { "name": "port1" }]
        }),
    );

    let output = ws
        .cmd()
        .args(["-o", "json", "flatten", "-r", "policy", "--api-version", "6.2.3"])
        .args(["--import-all", "--wire", path_arg(&wire)])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        stdout_json(&output),
        json!({
            "policyid": 7,
            "action": "accept",
            "session_ttl": 300,
            "srcintf": [{ "name": "port1" }, { "name": "port2" }]
        })
    );
}

#[test]
fn flatten_skips_tables_the_prior_never_had() {
    let ws = Workspace::new();
    let wire = ws.json(
        "wire.json",
        &json!({ "policyid": 7, "srcintf": [{ "name": "port1" }] }),
    );

    let output = ws
        .cmd()
        .args(["-o", "json", "flatten", "-r", "policy", "--api-version", "7.0"])
        .args(["--wire", path_arg(&wire)])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output), json!({ "policyid": 7 }));
}

#[test]
fn expand_encodes_for_old_devices_and_fills_required_defaults() {
    let ws = Workspace::new();
    let state = ws.json(
        "state.json",
        &json!({
            "policyid": 7,
            "session_ttl": 300,
            "srcintf": [{ "name": "b" }, { "name": "a" }]
        }),
    );

    let output = ws
        .cmd()
        .args(["-o", "json", "expand", "-r", "policy", "--api-version", "6.2.3"])
        .args(["--state", path_arg(&state)])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let wire = stdout_json(&output);
    assert_eq!(wire["session-ttl"], json!("300"));
    assert_eq!(wire["action"], json!("deny"));
    assert_eq!(wire["srcintf"], json!([{ "name": "a" }, { "name": "b" }]));
}

#[test]
fn plan_reports_clears_against_prior() {
    let ws = Workspace::new();
    let prior = ws.json(
        "prior.json",
        &json!({ "policyid": 7, "action": "deny", "comments": "old" }),
    );
    let state = ws.json("state.json", &json!({ "policyid": 7, "action": "deny" }));

    let output = ws
        .cmd()
        .args(["-o", "json", "plan", "-r", "policy", "--api-version", "7.0"])
        .args(["--state", path_arg(&state), "--prior", path_arg(&prior)])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let report = stdout_json(&output);
    assert_eq!(report["wire"], json!({ "comments": null }));
    assert!(
        report["decisions"]
            .as_array()
            .unwrap()
            .contains(&json!({ "path": "comments", "decision": "emit-clear" }))
    );
}

#[test]
fn plan_plain_lists_only_changes() {
    let ws = Workspace::new();
    let prior = ws.json("prior.json", &json!({ "policyid": 7, "action": "deny" }));
    let state = ws.json("state.json", &json!({ "policyid": 7, "action": "accept" }));

    ws.cmd()
        .args(["-o", "plain", "plan", "-r", "policy", "--api-version", "7.0"])
        .args(["--state", path_arg(&state), "--prior", path_arg(&prior)])
        .assert()
        .success()
        .stdout(predicate::str::diff("emit\taction\n"));
}

#[test]
fn schema_list_names_resources() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["-o", "plain", "schema", "list"])
        .assert()
        .success()
        .stdout(predicate::str::diff("policy\n"));
}

#[test]
fn schema_show_includes_nested_fields() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["-o", "plain", "schema", "show", "policy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("srcintf.name"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn unknown_resource_exits_with_schema_code() {
    let ws = Workspace::new();
    let state = ws.json("state.json", &json!({}));
    let output = ws
        .cmd()
        .args(["expand", "-r", "nope", "--api-version", "7.0"])
        .args(["--state", path_arg(&state)])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("nope"));
}

#[test]
fn offline_command_needs_a_version() {
    let ws = Workspace::new();
    let state = ws.json("state.json", &json!({}));
    let output = ws
        .cmd()
        .args(["expand", "-r", "policy", "--state", path_arg(&state)])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("api-version"));
}

#[test]
fn wrongly_typed_state_is_a_reconcile_error() {
    let ws = Workspace::new();
    let state = ws.json("state.json", &json!({ "session_ttl": "soon" }));
    let output = ws
        .cmd()
        .args(["expand", "-r", "policy", "--api-version", "7.0"])
        .args(["--state", path_arg(&state)])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6));
    assert!(combined_output(&output).contains("session_ttl"));
}

#[test]
fn missing_schema_is_reported() {
    let output = rekon_cmd().args(["schema", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("schema"));
}

#[test]
fn delete_requires_yes() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["delete", "-r", "policy", "7"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--yes"));
}

#[test]
fn read_without_profile_or_url_fails() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["read", "-r", "policy", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config init"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_init_then_profiles_and_redacted_show() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "init", "--name", "edge", "--device-url", "https://10.0.0.1"])
        .args(["--key", "s3cret", "--pin-version", "7.0.1"])
        .assert()
        .success();

    let output = ws
        .cmd()
        .args(["-o", "json", "config", "profiles"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        stdout_json(&output),
        json!([{
            "name": "edge",
            "url": "https://10.0.0.1",
            "scope": "",
            "api_version": "7.0.1",
            "default": true
        }])
    );

    ws.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********").and(predicate::str::contains("s3cret").not()));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let ws = Workspace::new();
    let init = |extra: &[&str]| {
        let mut cmd = ws.cmd();
        cmd.args(["config", "init", "--device-url", "https://10.0.0.1"])
            .args(extra);
        cmd.output().unwrap()
    };
    assert!(init(&[]).status.success());
    assert_eq!(init(&[]).status.code(), Some(2));
    assert!(init(&["--force"]).status.success());
}

#[test]
fn config_init_rejects_bad_url() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "init", "--device-url", "not a url"])
        .assert()
        .code(2);
}

#[test]
fn pinned_profile_version_drives_offline_commands() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "init", "--device-url", "https://10.0.0.1"])
        .args(["--pin-version", "6.2.0"])
        .assert()
        .success();

    let state = ws.json("state.json", &json!({ "session_ttl": 60 }));
    let output = ws
        .cmd()
        .args(["-o", "json", "expand", "-r", "policy", "--state", path_arg(&state)])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output)["session-ttl"], json!("60"));
}

// ── Device commands ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn apply_without_prior_sends_only_mentioned_changes() {
    let server = MockServer::start().await;
    let object = "/api/v2/cmdb/firewall/policy/1";

    Mock::given(method("GET"))
        .and(path(object))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "results": [{
                "policyid": 1,
                "comments": "set by someone else",
                "action": "accept",
                "session-ttl": 100
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(object))
        .and(body_json(json!({ "session-ttl": 300 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "mkey": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let state = ws.json("state.json", &json!({ "policyid": 1, "session_ttl": 300 }));
    let output = ws
        .cmd()
        .args(["--url", &server.uri(), "--api-key", "k", "-o", "json"])
        .args(["apply", "-r", "policy", "--api-version", "7.0", "--id", "1"])
        .args(["--state", path_arg(&state)])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let report = stdout_json(&output);
    assert_eq!(report["sent"], json!({ "session-ttl": 300 }));
    assert_eq!(report["id"], json!("1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn apply_to_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let state = ws.json("state.json", &json!({ "session_ttl": 300 }));
    ws.cmd()
        .args(["--url", &server.uri(), "--api-key", "k"])
        .args(["apply", "-r", "policy", "--api-version", "7.0", "--id", "9"])
        .args(["--state", path_arg(&state)])
        .assert()
        .code(4);
}
