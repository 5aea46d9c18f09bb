use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

// push rbp; mov rbp, rsp; ret
const BLOB: [u8; 5] = [0x55, 0x48, 0x89, 0xE5, 0xC3];

fn write(dir: &TempDir, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write fixture");
    path
}

fn blob(dir: &TempDir) -> PathBuf {
    write(dir, "blob.bin", &BLOB)
}

fn target_args(binary: &Path) -> Vec<String> {
    vec![
        "--binary".into(),
        binary.display().to_string(),
        "--arch".into(),
        "x86_64".into(),
        "--base".into(),
        "0x1000".into(),
    ]
}

#[test]
fn check_reports_ranges_per_file() {
    let temp = tempdir().unwrap();
    let file = write(&temp, "a.cov", b"# header\n0x1000-0x1003\n0x1004\n");
    cargo_bin_cmd!("covkeeper")
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Coverage files:"))
        .stdout(predicate::str::contains("ok (2 ranges, 3 lines)"));
}

#[test]
fn check_fails_on_non_printable_input() {
    let temp = tempdir().unwrap();
    let good = write(&temp, "good.cov", b"0x10\n");
    let bad = write(&temp, "bad.cov", b"0x10\n\xff\n");
    cargo_bin_cmd!("covkeeper")
        .arg("check")
        .arg(&good)
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("offset 5"))
        .stderr(predicate::str::contains("1 of 2 coverage file(s) failed to parse"));
}

#[test]
fn check_json_lists_each_file() {
    let temp = tempdir().unwrap();
    let file = write(&temp, "a.cov", b"0x10+0x10\n");
    let output = cargo_bin_cmd!("covkeeper")
        .arg("check")
        .arg(&file)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("check json");
    assert_eq!(body[0]["ok"], true);
    assert_eq!(body[0]["ranges"], 1);
    assert_eq!(body[0]["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn align_prints_instruction_hits() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let cov = write(&temp, "run.cov", b"0x1000-0x1003\n");
    cargo_bin_cmd!("covkeeper")
        .arg("align")
        .args(target_args(&binary))
        .arg(&cov)
        .assert()
        .success()
        .stdout(predicate::str::contains("Instruction hits: 2"))
        .stdout(predicate::str::contains("0x1000-0x1000"))
        .stdout(predicate::str::contains("0x1001-0x1003"));
}

#[test]
fn align_raw_prints_the_union() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let a = write(&temp, "a.cov", b"0x1000-0x1002\n");
    let b = write(&temp, "b.cov", b"0x1004\n");
    let output = cargo_bin_cmd!("covkeeper")
        .arg("align")
        .args(target_args(&binary))
        .arg(&a)
        .arg(&b)
        .args(["--raw", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("align json");
    assert_eq!(body["files"], 2);
    assert_eq!(body["raw_ranges"], 2);
    assert_eq!(body["hits"].as_array().map(Vec::len), Some(2));
}

#[test]
fn align_warns_about_bad_files_but_keeps_good_ones() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let good = write(&temp, "good.cov", b"0x1004\n");
    let bad = write(&temp, "bad.cov", b"0x1000");
    cargo_bin_cmd!("covkeeper")
        .arg("align")
        .args(target_args(&binary))
        .arg(&good)
        .arg(&bad)
        .assert()
        .success()
        .stdout(predicate::str::contains("Instruction hits: 1"))
        .stderr(predicate::str::contains("warning:"));
}

#[test]
fn align_fails_when_nothing_imports() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let bad = write(&temp, "bad.cov", b"nonsense\n");
    cargo_bin_cmd!("covkeeper")
        .arg("align")
        .args(target_args(&binary))
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No coverage file could be imported"));
}

#[test]
fn summary_without_symbols_has_no_functions() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let cov = write(&temp, "run.cov", b"0x1000+5\n");
    cargo_bin_cmd!("covkeeper")
        .arg("summary")
        .args(target_args(&binary))
        .arg(&cov)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 hit ranges"))
        .stdout(predicate::str::contains("Functions: (none)"));
}

#[test]
fn run_reads_a_yaml_session_config() {
    let temp = tempdir().unwrap();
    blob(&temp);
    write(&temp, "run.cov", b"0x1000-0x1004\n");
    let config = write(
        &temp,
        "session.yaml",
        b"binary: blob.bin\narch: x86_64\nbase_address: \"0x1000\"\ncoverage:\n  - run.cov\n",
    );
    let output = cargo_bin_cmd!("covkeeper")
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("summary json");
    assert_eq!(body["hit_ranges"], 3);
}

#[test]
fn missing_binary_is_reported() {
    let temp = tempdir().unwrap();
    let cov = write(&temp, "run.cov", b"0x1000\n");
    cargo_bin_cmd!("covkeeper")
        .arg("align")
        .arg("--binary")
        .arg(temp.path().join("absent.bin"))
        .arg(&cov)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read binary"));
}

#[test]
fn invalid_base_is_rejected() {
    let temp = tempdir().unwrap();
    let binary = blob(&temp);
    let cov = write(&temp, "run.cov", b"0x1000\n");
    cargo_bin_cmd!("covkeeper")
        .arg("align")
        .arg("--binary")
        .arg(&binary)
        .args(["--base", "zz"])
        .arg(&cov)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid base address"));
}
