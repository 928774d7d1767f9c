#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch directory with fake pre-built boot stages.
pub struct TestContext {
    pub dir: TempDir,
}

impl TestContext {
    /// Command using the fake stages and writing to `out.cpio`.
    pub fn new_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bluebox"));
        cmd.current_dir(self.dir.path());
        cmd.env_remove("BLUEBOX_ARCH");
        cmd.env_remove("BLUEBOX_GUEST_MANIFEST");
        cmd.arg("--stage-dir").arg(self.stages());
        cmd.arg("-o").arg(self.output());
        cmd
    }

    pub fn stages(&self) -> PathBuf {
        self.dir.path().join("stages")
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("out.cpio")
    }

    pub fn file(&self, name: &str, contents: &[u8], mode: u32) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }
}

pub fn bluebox() -> TestContext {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let stages = dir.path().join("stages");
    fs::create_dir(&stages).unwrap();
    fs::write(stages.join("init"), b"\x7fELF init").unwrap();
    fs::write(stages.join("bluebox-init"), b"\x7fELF bluebox-init").unwrap();
    TestContext { dir }
}
