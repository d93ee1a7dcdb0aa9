use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn decree(catalog: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_decree-engine"))
        .arg("--catalog")
        .arg(catalog)
        .args(args)
        .env("DECREE_ID_STRATEGY", "sequential")
        .env("DECREE_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG")
        .output()
        .expect("binary runs")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json on stdout")
}

#[test]
fn add_publish_and_simulate_a_score() {
    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = dir.path().join("catalog.json");
    let draft = dir.path().join("housing.json");
    std::fs::write(
        &draft,
        r#"{"name": "housing", "formula": "bonus + 500", "kind": "value", "nature": "condition",
            "category": "staff", "validity": {"from": "2024-01-01"}}"#,
    )
    .expect("draft written");

    let created = json(&decree(
        &catalog,
        &["score", "add", "--file", draft.to_str().expect("utf-8 path")],
    ));
    let id = created["id"].as_str().expect("score id").to_string();
    assert_eq!(created["status"], "draft");

    let published = json(&decree(&catalog, &["score", "publish", &id]));
    assert_eq!(published["score"]["status"], "active");

    let result = json(&decree(
        &catalog,
        &["simulate", "--date", "2024-06-01", "--value", "bonus=250"],
    ));
    assert_eq!(result["total"], 750.0);
    assert_eq!(result["items"][0]["score_name"], "housing");

    let before_validity = json(&decree(&catalog, &["simulate", "--date", "2023-06-01"]));
    assert_eq!(before_validity["items"].as_array().map(Vec::len), Some(0));
}

#[test]
fn unknown_score_exits_with_not_found_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = dir.path().join("catalog.json");

    let output = decree(&catalog, &["score", "publish", "score-missing"]);
    assert_eq!(output.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("score-missing"), "{stderr}");
}

#[test]
fn separate_runs_keep_every_score() {
    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = dir.path().join("catalog.json");
    let mut ids = Vec::new();
    for name in ["housing", "child"] {
        let draft = dir.path().join(format!("{name}.json"));
        std::fs::write(
            &draft,
            format!(r#"{{"name": "{name}", "formula": "100", "kind": "value", "nature": "condition"}}"#),
        )
        .expect("draft written");
        let created = json(&decree(
            &catalog,
            &["score", "add", "--file", draft.to_str().expect("utf-8 path")],
        ));
        ids.push(created["id"].as_str().expect("score id").to_string());
    }
    assert_ne!(ids[0], ids[1]);

    let copy = json(&decree(&catalog, &["score", "duplicate", &ids[0]]));
    let copy_id = copy["id"].as_str().expect("copy id").to_string();
    assert!(!ids.contains(&copy_id));

    let listed = json(&decree(&catalog, &["score", "list"]));
    let mut names: Vec<_> = listed
        .as_array()
        .expect("score list")
        .iter()
        .map(|score| score["name"].as_str().expect("name").to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["child", "housing", "housing"]);
}
