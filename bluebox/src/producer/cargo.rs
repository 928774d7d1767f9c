//! Producer that compiles the guest stages with cargo.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use tracing::{debug, info};

use super::{write_with_table, BinaryProducer, Stage};
use crate::arch::Arch;

/// Environment variable overriding the guest crate manifest.
pub const GUEST_MANIFEST_ENV: &str = "BLUEBOX_GUEST_MANIFEST";

/// Compiles one stage per call with `cargo build` for the target triple.
///
/// Binaries are linked statically against musl; the matching rust target
/// must be installed.
#[derive(Clone, Debug)]
pub struct CargoProducer {
    cargo: OsString,
    manifest: PathBuf,
}

impl CargoProducer {
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            cargo: std::env::var_os("CARGO").unwrap_or_else(|| OsString::from("cargo")),
            manifest: manifest.into(),
        }
    }

    /// Use a specific cargo executable.
    pub fn with_cargo(mut self, cargo: impl Into<OsString>) -> Self {
        self.cargo = cargo.into();
        self
    }

    fn build_command(&self, stage: Stage, arch: Arch, target_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.cargo);
        cmd.arg("build")
            .arg("--release")
            .arg("--manifest-path")
            .arg(&self.manifest)
            .arg("--target")
            .arg(arch.target_triple())
            .arg("--bin")
            .arg(stage.binary_name())
            .arg("--target-dir")
            .arg(target_dir)
            .env("RUSTFLAGS", "-C target-feature=+crt-static");
        cmd
    }
}

impl Default for CargoProducer {
    /// Guest crate from `BLUEBOX_GUEST_MANIFEST`, or the one in this workspace.
    fn default() -> Self {
        let manifest = std::env::var_os(GUEST_MANIFEST_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                Path::new(env!("CARGO_MANIFEST_DIR")).join("../guest/Cargo.toml")
            });
        Self::new(manifest)
    }
}

impl BinaryProducer for CargoProducer {
    fn produce(
        &self,
        stage: Stage,
        config: &[u8],
        arch: Arch,
        workdir: &Path,
    ) -> BlueboxResult<PathBuf> {
        let target_dir = workdir.join("target");
        let mut cmd = self.build_command(stage, arch, &target_dir);

        info!(
            stage = stage.binary_name(),
            target = arch.target_triple(),
            "compiling boot stage"
        );
        debug!("running {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            BlueboxError::Generation(format!(
                "Failed to run {}: {}",
                self.cargo.to_string_lossy(),
                e
            ))
        })?;

        if !output.status.success() {
            return Err(BlueboxError::Generation(format!(
                "compiling {} for {} failed ({}):\n{}",
                stage.binary_name(),
                arch.target_triple(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            )));
        }

        let built = target_dir
            .join(arch.target_triple())
            .join("release")
            .join(stage.binary_name());
        write_with_table(&built, stage, config, workdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_cargo(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-cargo");
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn compiler_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cargo = fake_cargo(dir.path(), "echo 'error[E0425]: boom' >&2\nexit 101\n");
        let producer = CargoProducer::new("guest/Cargo.toml").with_cargo(&cargo);

        let err = producer
            .produce(Stage::Init, b"{}", Arch::X86_64, dir.path())
            .unwrap_err();
        match err {
            BlueboxError::Generation(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn builds_into_scoped_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cargo = fake_cargo(
            dir.path(),
            r#"while [ $# -gt 0 ]; do
  case "$1" in
    --target) triple="$2"; shift ;;
    --target-dir) out="$2"; shift ;;
    --bin) bin="$2"; shift ;;
  esac
  shift
done
mkdir -p "$out/$triple/release"
printf 'ELF' > "$out/$triple/release/$bin"
"#,
        );
        let producer = CargoProducer::new("guest/Cargo.toml").with_cargo(&cargo);

        let out = producer
            .produce(Stage::Supervisor, br#"{"programs":[]}"#, Arch::Aarch64, dir.path())
            .unwrap();
        assert_eq!(out, dir.path().join("bluebox-init"));
        assert!(fs::read(&out).unwrap().starts_with(b"ELF"));
        assert!(dir
            .path()
            .join("target/aarch64-unknown-linux-musl/release/bluebox-init")
            .is_file());
    }
}
