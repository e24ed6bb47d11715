//! Integration tests for the `tmend` binary: scan, write-back commands,
//! backups and the exit-code contract.

mod util;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use util::{TOPICS, corpus_dir, topics_dir};

/// `tmend` running inside `dir`, so no stray config file is picked up.
fn tmend(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tmend").expect("tmend binary");
    cmd.current_dir(dir).env_remove("TMEND_LOG");
    cmd
}

#[test]
fn scan_reports_incomplete_topics() {
    let (tmp, _) = topics_dir();
    tmend(tmp.path())
        .args(["scan", "topics.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scanned 3 topics: 1 complete"))
        .stdout(predicate::str::contains("FAIL array-push  missing: syntax"))
        .stdout(predicate::str::contains("FAIL array-pop  duplicated: example×2"));
}

#[test]
fn strict_scan_exits_2() {
    let (tmp, _) = topics_dir();
    tmend(tmp.path())
        .args(["scan", "topics.ts", "--strict"])
        .assert()
        .code(2);
}

#[test]
fn scan_writes_json_report_file() {
    let (tmp, _) = topics_dir();
    tmend(tmp.path())
        .args(["--quiet", "scan", "topics.ts", "--report", "report.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = fs::read_to_string(tmp.path().join("report.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["summary"]["topics"], 3);
    assert_eq!(v["summary"]["missing_by_field"]["syntax"], 1);
}

#[test]
fn dry_run_prints_diff_and_leaves_file_alone() {
    let (tmp, path) = topics_dir();
    tmend(tmp.path())
        .args([
            "--dry-run",
            "insert",
            "topics.ts",
            "array-push",
            "syntax",
            "--before",
            "voiceExplanation",
            "--value",
            "array.push(item)",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("+    syntax: `array.push(item)`,"));

    assert_eq!(fs::read_to_string(path).unwrap(), TOPICS);
    tmp.child(".tmend").assert(predicate::path::missing());
}

#[test]
fn insert_writes_and_restore_brings_back_the_original() {
    let (tmp, path) = topics_dir();
    tmend(tmp.path())
        .args([
            "insert",
            "topics.ts",
            "array-push",
            "syntax",
            "--before",
            "voiceExplanation",
            "--value",
            "array.push(item)",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Repaired topics.ts (backup "));

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("    syntax: `array.push(item)`,\n    voiceExplanation: `Push appends"));

    tmend(tmp.path())
        .args(["restore", "topics.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored"));
    assert_eq!(fs::read_to_string(&path).unwrap(), TOPICS);
}

#[test]
fn strip_suffix_without_backup() {
    let (tmp, path) = topics_dir();
    tmend(tmp.path())
        .args(["strip-suffix", "topics.ts", "_alt", "--no-backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remove-suffix _alt: 2 change(s)"));

    assert!(!fs::read_to_string(&path).unwrap().contains("syntax_alt"));
    tmp.child(".tmend").assert(predicate::path::missing());
}

#[test]
fn plan_applies_every_operation_in_one_write() {
    let (tmp, path) = topics_dir();
    tmp.child("fix.toml")
        .write_str(
            r#"
[[ops]]
op = "insert-field"
topic = "array-push"
field = "syntax"
anchor = "voiceExplanation"
value = { style = "template", text = "array.push(item)" }

[[ops]]
op = "dedupe-field"
topic = "array-pop"
field = "example"

[[ops]]
op = "remove-suffix"
suffix = "_alt"

[[ops]]
op = "escape-delimiters"
field = "example"
"#,
        )
        .unwrap();

    tmend(tmp.path())
        .args(["run", "topics.ts", "--plan", "fix.toml", "--no-backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("After repair: 3/3 topics complete"));

    tmend(tmp.path())
        .args(["scan", "topics.ts", "--strict"])
        .assert()
        .success();
    assert!(fs::read_to_string(&path).unwrap().contains(r"\`Hello, \${name}!\`"));
}

#[test]
fn plan_misses_are_reported_unless_strict() {
    let (tmp, _) = topics_dir();
    tmp.child("fix.json")
        .write_str(r#"{"ops":[{"op":"dedupe-field","topic":"no-such-topic","field":"example"}]}"#)
        .unwrap();

    tmend(tmp.path())
        .args(["--dry-run", "run", "topics.ts", "--plan", "fix.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("topic `no-such-topic` not found"));

    tmend(tmp.path())
        .args(["--dry-run", "run", "topics.ts", "--plan", "fix.json", "--strict"])
        .assert()
        .code(3);
}

#[test]
fn unknown_topic_exits_3() {
    let (tmp, path) = topics_dir();
    tmend(tmp.path())
        .args(["dedupe", "topics.ts", "example", "--topic", "missing"])
        .assert()
        .code(3);
    assert_eq!(fs::read_to_string(path).unwrap(), TOPICS);
}

#[test]
fn parse_error_exits_3_without_writing() {
    let broken = "export const topics = [\n  {\n    id: \"a\",\n    example: `never closed,\n  },\n];\n";
    let (tmp, path) = corpus_dir(broken);
    tmend(tmp.path())
        .args(["strip-suffix", "topics.ts", "_alt"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("corpus parse error"));

    assert_eq!(fs::read_to_string(path).unwrap(), broken);
    tmp.child(".tmend").assert(predicate::path::missing());
}

#[test]
fn duplicate_ids_block_write_back() {
    let dup = "export const topics = [\n  {\n    id: \"a\",\n    example: `x`,\n  },\n  {\n    id: \"a\",\n    example: `y`,\n  },\n];\n";
    let (tmp, path) = corpus_dir(dup);

    tmend(tmp.path())
        .args(["scan", "topics.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a (lines 2, 6)"));

    tmend(tmp.path())
        .args(["rename", "topics.ts", "example", "sample"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("duplicate topic ids"));
    assert_eq!(fs::read_to_string(path).unwrap(), dup);
}

#[test]
fn locate_prints_span_and_value() {
    let (tmp, _) = topics_dir();
    tmend(tmp.path())
        .args(["locate", "topics.ts", "template-literals", "syntax"])
        .assert()
        .success()
        .stdout(predicate::str::contains("template-literals.syntax [1/1] line 45"))
        .stdout(predicate::str::contains("`text ${expression} text`"));

    tmend(tmp.path())
        .args(["locate", "topics.ts", "array-push", "syntax"])
        .assert()
        .code(3);
}

#[test]
fn config_file_changes_required_fields() {
    let (tmp, _) = topics_dir();
    tmp.child("tmend.toml")
        .write_str("[required]\ndefault = [\"example\", \"voiceExplanation\"]\n")
        .unwrap();

    // array-pop still duplicates `example`
    tmend(tmp.path())
        .args(["scan", "topics.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scanned 3 topics: 2 complete"));
}

#[test]
fn init_writes_default_config() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmend(tmp.path()).args(["init"]).assert().success();
    tmp.child("tmend.toml")
        .assert(predicate::str::contains("voiceExplanation"));

    tmend(tmp.path()).args(["init"]).assert().failure();
}
