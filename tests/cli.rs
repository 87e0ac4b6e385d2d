//! Tests for the argmatch binary.

use std::process::Command;

const SCHEMA: &str = r#"{
    "name": "deploy",
    "env_prefix": "DEPLOY_",
    "args": [
        {"flags": ["-v", "--verbose"], "action": "store_true"},
        {"flags": ["--level"], "choices": ["low", "high"], "default": "low"},
        {"name": "files", "nargs": "*"}
    ]
}"#;

fn argmatch_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_argmatch"));
    cmd.env_remove("ARGMATCH_LOG");
    cmd
}

fn parse(format: &str, extra: &[&str], args: &[&str]) -> std::process::Output {
    argmatch_cmd()
        .args(["parse", "--config", SCHEMA, "--format", format])
        .args(extra)
        .arg("--")
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_json_output() {
    let output = parse("json", &[], &["-v", "--level", "high", "a", "b"]);
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(json["namespace"]["verbose"], true);
    assert_eq!(json["namespace"]["level"], "high");
    assert_eq!(json["namespace"]["files"], serde_json::json!(["a", "b"]));
    assert_eq!(json["extras"], serde_json::json!([]));
}

#[test]
fn test_shell_output_file() {
    let output = parse("shell", &[], &["--verb", "x"]);
    assert!(output.status.success());

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let contents = std::fs::read_to_string(&path).expect("output file exists");
    assert!(contents.contains("export DEPLOY_VERBOSE=\"true\""));
    assert!(contents.contains("export DEPLOY_LEVEL=\"low\""));
    assert!(contents.contains("DEPLOY_FILES=(\"x\")"));
    assert!(contents.contains("DEPLOY_EXTRAS=()"));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_env_prefix_override() {
    let output = parse("shell", &["--env-prefix", "X_"], &[]);
    assert!(output.status.success());

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let contents = std::fs::read_to_string(&path).expect("output file exists");
    assert!(contents.contains("export X_LEVEL=\"low\""));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_parse_error_writes_error_script() {
    let output = parse("shell", &[], &["--level", "medium"]);
    assert!(output.status.success());

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let contents = std::fs::read_to_string(&path).expect("error file exists");
    assert!(contents.contains("deploy: error: argument --level: invalid choice: 'medium'"));
    assert!(contents.ends_with("exit 1\n"));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_strict_json_error_exits_with_failure() {
    let output = parse("json", &["--strict"], &["--bogus"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized arguments: --bogus"), "got: {}", stderr);
}

#[test]
fn test_check_valid_schema() {
    let output = argmatch_cmd()
        .args(["check", "--config", SCHEMA])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "deploy: 3 arguments ok");
}

#[test]
fn test_check_invalid_schema() {
    let output = argmatch_cmd()
        .args(["check", "--config", r#"{"args":[{"flags":["--x"],"choices":[]}]}"#])
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid config"));
}
