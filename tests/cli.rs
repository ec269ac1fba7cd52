//! End-to-end checks of the `envboot` binary that need no container runtime.

mod common;

use common::{run_envboot, stdout_json};

#[test]
fn config_masks_secrets_unless_asked() {
    let dir = tempfile::tempdir().expect("create temp dir");
    std::fs::write(dir.path().join(".env"), "MINIO_BUCKETS=landing,curated\n")
        .expect("write .env");
    let vars = [("POSTGRES_PASSWORD", "s3cret")];

    let output = run_envboot(dir.path(), &vars, &["config"]);
    assert!(output.status.success(), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["database"]["password"], "********");
    assert_eq!(json["object_store"]["secret_key"], "********");
    assert_eq!(json["object_store"]["buckets"][1], "curated");
    assert_eq!(json["probe"]["max_attempts"], 2);

    let output = run_envboot(dir.path(), &vars, &["config", "--show-secrets"]);
    let json = stdout_json(&output);
    assert_eq!(json["database"]["password"], "s3cret");
}

#[test]
fn up_without_compose_tool_exits_before_side_effects() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let vars = [("ENVBOOT_COMPOSE_COMMAND", "envboot-no-such-tool compose")];

    let output = run_envboot(dir.path(), &vars, &["up", "--json"]);
    assert_eq!(output.status.code(), Some(2), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["outcome"]["state"], "aborted");
    assert_eq!(json["outcome"]["phase"], "init");
    assert_eq!(json["outcome"]["kind"], "prerequisite_missing");
    assert!(!dir.path().join("dags").exists());
    assert!(!dir.path().join("data").exists());
}

#[test]
fn up_writes_report_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let report = dir.path().join("out/report.json");
    let vars = [("ENVBOOT_COMPOSE_COMMAND", "envboot-no-such-tool compose")];
    let report_arg = report.to_string_lossy().into_owned();

    let output = run_envboot(dir.path(), &vars, &["up", "--report", &report_arg]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("bootstrap: aborted at init (prerequisite missing)"));
    let text = std::fs::read_to_string(&report).expect("read report");
    let json: serde_json::Value = serde_json::from_str(&text).expect("parse report");
    assert_eq!(json["phases_completed"], serde_json::json!([]));
}

#[test]
fn logs_rejects_unknown_service() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let output = run_envboot(dir.path(), &[], &["logs", "redis"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown service redis"), "{stderr}");
}
