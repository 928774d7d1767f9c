use std::fs;
use std::io::Cursor;

use bluebox::archive::read_entries;
use predicates::prelude::*;

mod common;

#[test]
fn test_build_with_executables_and_embeddings() {
    let ctx = common::bluebox();
    let date = ctx.file("date", b"date binary", 0o755);
    let data = ctx.file("data.bin", b"payload", 0o444);

    ctx.new_cmd()
        .arg("-e")
        .arg(format!("{}:\"+%s -u\"", date.display()))
        .arg("-r")
        .arg(&data)
        .args(["--env", "BLUEBOX_DEBUG"])
        .assert()
        .success()
        .stdout(predicate::str::contains("out.cpio"));

    let archive = fs::read(ctx.output()).unwrap();
    let entries = read_entries(Cursor::new(archive)).unwrap();
    let names: Vec<&str> = entries.iter().map(|(e, _)| e.name.as_str()).collect();
    assert_eq!(names, vec!["init", "bluebox-init", "date", "data.bin"]);
    assert_eq!(entries[3].0.permissions, 0o444);
}

#[test]
fn test_build_without_executables() {
    let ctx = common::bluebox();
    ctx.new_cmd().assert().success();
    assert!(ctx.output().is_file());
}

#[test]
fn test_reserved_name_is_rejected() {
    let ctx = common::bluebox();
    let init = ctx.file("init", b"not the real init", 0o755);

    ctx.new_cmd()
        .arg("-e")
        .arg(&init)
        .assert()
        .failure()
        .stderr(predicate::str::contains("should not be named 'init'"));
    assert!(!ctx.output().exists());
}

#[test]
fn test_missing_executable_fails() {
    let ctx = common::bluebox();

    ctx.new_cmd()
        .args(["-e", "./does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist"));
    assert!(!ctx.output().exists());
}

#[test]
fn test_duplicate_name_fails() {
    let ctx = common::bluebox();
    let date = ctx.file("date", b"date", 0o755);

    ctx.new_cmd()
        .arg("-e")
        .arg(&date)
        .arg("-r")
        .arg(&date)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already embedded"));
}

#[test]
fn test_unsupported_arch_fails() {
    let ctx = common::bluebox();

    ctx.new_cmd()
        .args(["-a", "mips"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mips"));
}

#[test]
fn test_partial_output_is_removed() {
    let ctx = common::bluebox();
    fs::remove_file(ctx.stages().join("bluebox-init")).unwrap();

    ctx.new_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("bluebox-init"));
    assert!(!ctx.output().exists());
}

#[test]
fn test_version() {
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_bluebox"));
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("bluebox "));
}
