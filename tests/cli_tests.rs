mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use classweave_core::definition::DefinitionSet;
use common::*;

fn classweave() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("classweave").unwrap();
    cmd.env_remove("CLASSWEAVE_LOG");
    cmd
}

#[test]
fn test_hash_prints_definition_digest() {
    let dir = TempDir::new().unwrap();
    let defs = write_text(dir.path(), "defs.json", FOO_DEFINITIONS);
    let expected = DefinitionSet::from_json(FOO_DEFINITIONS).unwrap().digest().to_hex();

    classweave()
        .arg("hash")
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .success()
        .stdout(format!("{}\n", expected));

    let output = classweave()
        .args(["--json", "hash", "--definitions"])
        .arg(&defs)
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["sha256"], expected);
}

#[test]
fn test_process_then_check() {
    let dir = TempDir::new().unwrap();
    let defs = write_text(dir.path(), "defs.json", FOO_DEFINITIONS);
    let jar = write_jar(&dir.path().join("foo.jar"), &[plain_class(FOO, &[])], &[]);

    classweave()
        .arg("check")
        .arg("--input")
        .arg(&jar)
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("stale"));

    let output = classweave()
        .args(["--json", "process", "--input"])
        .arg(&jar)
        .arg("--definitions")
        .arg(&defs)
        .output()
        .unwrap();
    assert!(output.status.success());
    let summaries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summaries[0]["skipped"], false);
    assert_eq!(summaries[0]["transformed"], 1);
    assert_eq!(summaries[0]["artifacts"].as_array().unwrap().len(), 1);

    classweave()
        .arg("check")
        .arg("--input")
        .arg(&jar)
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    classweave()
        .arg("process")
        .arg("--input")
        .arg(&jar)
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    let changed = write_text(dir.path(), "changed.json", STUB_DEFINITIONS);
    classweave()
        .arg("check")
        .arg("--input")
        .arg(&jar)
        .arg("--definitions")
        .arg(&changed)
        .assert()
        .code(1);
}

#[test]
fn test_process_renames_with_mapping_file() {
    let dir = TempDir::new().unwrap();
    let defs = write_text(dir.path(), "defs.json", "{}");
    let tiny = write_text(
        dir.path(),
        "mappings.tiny",
        &tiny_classes("intermediary", "named", &[("p/class_1", "p/Entity")]),
    );
    let input = write_jar(&dir.path().join("in.jar"), &[plain_class("p/class_1", &[])], &[]);
    let output = dir.path().join("out.jar");

    classweave()
        .arg("process")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--definitions")
        .arg(&defs)
        .arg("--mappings")
        .arg(&tiny)
        .assert()
        .success();

    let names = classweave_archive::entry_names(&output).unwrap();
    assert!(names.contains(&"p/Entity.class".to_string()));
    assert!(!names.contains(&"p/class_1.class".to_string()));
}

#[test]
fn test_output_requires_single_input() {
    let dir = TempDir::new().unwrap();
    let defs = write_text(dir.path(), "defs.json", FOO_DEFINITIONS);
    let a = write_jar(&dir.path().join("a.jar"), &[plain_class(FOO, &[])], &[]);
    let b = write_jar(&dir.path().join("b.jar"), &[plain_class("b/Bar", &[])], &[]);

    classweave()
        .arg("process")
        .arg("--input")
        .arg(&a)
        .arg("--input")
        .arg(&b)
        .arg("--output")
        .arg(dir.path().join("out.jar"))
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .failure();
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let defs = write_text(dir.path(), "defs.json", FOO_DEFINITIONS);
    let missing = dir.path().join("missing.jar");

    classweave()
        .arg("process")
        .arg("--input")
        .arg(&missing)
        .arg("--definitions")
        .arg(&defs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    assert!(!missing.exists());
}
