//! End-to-end checks of the `formstate` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, v: &Value) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, serde_json::to_string(v).unwrap()).unwrap();
    p
}

fn schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "text"},
            "rows": {
                "type": "array", "style": "table", "maxItems": 2,
                "items": {"type": "object", "properties": {"v": {"type": "quantity"}}}
            },
            "total": {"type": "quantity", "calculation": {"property_names": {"v": "rows.*.v"}, "formula": "sum(v)"}}
        }
    })
}

fn formstate() -> Command {
    let mut cmd = Command::cargo_bin("formstate").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn check_counts_declarations() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());

    let v = stdout_json(formstate().arg("--json").arg("check").arg(&schema));
    assert_eq!(v["ok"], true);
    assert_eq!(v["containers"], 1);
    assert_eq!(v["calculations"], 1);
    assert_eq!(v["wrappers"], 0);
    assert_eq!(v["cycle_policy"], "bounded");
}

#[test]
fn check_reports_configured_cycle_policy() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    let config = write(dir.path(), "config.json", &json!({"cascade": {"cycle_policy": "reject"}}));

    let v = stdout_json(formstate().arg("--json").arg("--config").arg(&config).arg("check").arg(&schema));
    assert_eq!(v["cycle_policy"], "reject");
}

#[test]
fn check_rejects_bad_schema() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &json!({"type": "text"}));
    formstate().arg("check").arg(&schema).assert().failure();
}

#[test]
fn render_lists_fields_and_buttons() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    let data = write(dir.path(), "data.json", &json!({"rows": [{"v": 2}, {"v": 3}]}));

    let v = stdout_json(formstate().arg("--json").arg("render").arg(&schema).arg("--data").arg(&data));
    let total = v["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["id"] == "object__total")
        .unwrap();
    assert_eq!(total["value"], "5");

    let rows = &v["containers"][0];
    assert_eq!(rows["id"], "object__rows");
    assert_eq!(rows["items"], 2);
    assert_eq!(rows["add"], false);
}

#[test]
fn run_replays_events_and_submits() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    let events = write(
        dir.path(),
        "events.json",
        &json!([
            {"op": "set", "id": "object__name", "value": "sample"},
            {"op": "add_item", "container": "object__rows"},
            {"op": "set", "id": "object__rows__0__v", "value": "1,5"},
            {"op": "delete_item", "container": "object__rows", "index": 7}
        ]),
    );

    let v = stdout_json(
        formstate()
            .args(["--json", "--decimal-delimiter", ","])
            .arg("run")
            .arg(&schema)
            .arg("--events")
            .arg(&events),
    );
    assert_eq!(v["submitted"], true);
    assert_eq!(v["events"], 4);
    assert_eq!(v["refused"].as_array().unwrap().len(), 1);
    assert_eq!(v["refused"][0]["index"], 3);

    let pairs: Vec<(String, String)> = v["pairs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["name"].as_str().unwrap().to_string(), p["value"].as_str().unwrap().to_string()))
        .collect();
    assert!(pairs.contains(&("object__name".to_string(), "sample".to_string())));
    assert!(pairs.contains(&("object__total__magnitude".to_string(), "1,5".to_string())));
}

#[test]
fn run_reports_blocking_errors() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    let events = write(dir.path(), "events.json", &json!([]));

    let v = stdout_json(formstate().arg("--json").arg("run").arg(&schema).arg("--events").arg(&events));
    assert_eq!(v["submitted"], false);
    assert_eq!(v["errors"][0]["name"], "object__name");
    assert!(v["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["code"] == "submit.blocked"));
}

#[test]
fn config_file_sets_root_prefix() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    let config = write(dir.path(), "config.json", &json!({"ids": {"root_prefix": "sample"}}));

    let v = stdout_json(formstate().arg("--json").arg("--config").arg(&config).arg("render").arg(&schema));
    assert!(v["fields"]
        .as_array()
        .unwrap()
        .iter()
        .all(|f| f["id"].as_str().unwrap().starts_with("sample__")));
}

#[test]
fn unsupported_delimiter_fails() {
    let dir = TempDir::new().unwrap();
    let schema = write(dir.path(), "schema.json", &schema());
    formstate()
        .args(["--decimal-delimiter", ";", "check"])
        .arg(&schema)
        .assert()
        .failure();
}
