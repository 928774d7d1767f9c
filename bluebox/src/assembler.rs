//! Image assembly: registration of files and archive generation.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bluebox_shared::boot::standard_environment;
use bluebox_shared::constants::names;
use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::{EnvironmentAction, Program};
use tracing::{debug, info};

use crate::arch::Arch;
use crate::archive::{ArchiveSummary, CpioWriter};
use crate::producer::{BinaryProducer, CargoProducer, Stage};
use crate::render;

/// A file registered for the archive.
#[derive(Clone, Debug)]
struct Registered {
    /// Archive entry name (base name of `path`).
    name: String,
    path: PathBuf,
}

#[derive(Clone, Debug)]
struct Executable {
    file: Registered,
    args: Vec<String>,
}

/// Builder for one initramfs image.
///
/// Holds everything that goes into the archive. Each instance is independent;
/// a single instance is not meant to generate concurrently.
pub struct Bluebox {
    /// Target architecture of the boot stages.
    arch: Arch,

    /// Environment variables set with [`Bluebox::setenv`].
    env_vars: Vec<(String, String)>,

    /// Executables in execution order.
    executables: Vec<Executable>,

    /// Read-only files added to the archive but never executed.
    embeddings: Vec<Registered>,

    /// Boot steps stage 1 runs before the root switch.
    environment: Vec<EnvironmentAction>,

    producer: Box<dyn BinaryProducer>,
}

impl Bluebox {
    /// Construct a Bluebox for the host architecture that compiles its boot
    /// stages with cargo.
    pub fn new() -> Self {
        Self::with_producer(CargoProducer::default())
    }

    /// Construct a Bluebox that obtains its boot stages from `producer`.
    pub fn with_producer(producer: impl BinaryProducer + 'static) -> Self {
        Self {
            arch: Arch::host(),
            env_vars: Vec::new(),
            executables: Vec::new(),
            embeddings: Vec::new(),
            environment: standard_environment(),
            producer: Box::new(producer),
        }
    }

    /// Embed `executable` into the archive and run it at boot with `args`.
    ///
    /// Executables run in the order they were registered.
    pub fn execute(&mut self, executable: impl AsRef<Path>, args: Vec<String>) -> BlueboxResult<()> {
        let file = self.register(executable.as_ref())?;
        debug!(name = %file.name, ?args, "registered executable");
        self.executables.push(Executable { file, args });
        Ok(())
    }

    /// Embed `file` into the archive without executing it.
    pub fn embed(&mut self, file: impl AsRef<Path>) -> BlueboxResult<()> {
        let file = self.register(file.as_ref())?;
        debug!(name = %file.name, "registered read-only file");
        self.embeddings.push(file);
        Ok(())
    }

    /// Set the architecture of the generated boot stages.
    ///
    /// By default the architecture of the host is used.
    pub fn setarch(&mut self, arch: &str) -> BlueboxResult<()> {
        self.arch = arch.parse()?;
        Ok(())
    }

    /// Record an environment variable.
    ///
    /// Variables are kept with the configuration but not yet passed to the
    /// executables at boot.
    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_vars.push((key.into(), value.into()));
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env_vars
    }

    /// Executables with their arguments, in execution order.
    pub fn programs(&self) -> Vec<Program> {
        self.executables
            .iter()
            .map(|e| Program::new(e.file.name.clone(), e.args.clone()))
            .collect()
    }

    /// Archive names of the read-only files, in registration order.
    pub fn embeddings(&self) -> Vec<&str> {
        self.embeddings.iter().map(|e| e.name.as_str()).collect()
    }

    /// Write the configured initramfs archive to `archive`.
    ///
    /// Renders both stage configurations, produces the stage binaries and
    /// writes the archive in a fixed order: `init`, `bluebox-init`, the
    /// executables, then the read-only files. Intermediate files live in a
    /// temporary directory that is removed on every exit path.
    pub fn generate<W: Write>(&self, archive: W) -> BlueboxResult<ArchiveSummary> {
        let tmp_dir = tempfile::Builder::new().prefix("bluebox-").tempdir()?;
        info!(
            arch = %self.arch,
            executables = self.executables.len(),
            embeddings = self.embeddings.len(),
            "generating initramfs"
        );
        if !self.env_vars.is_empty() {
            debug!(
                count = self.env_vars.len(),
                "environment variables are recorded but not passed to executables"
            );
        }

        let init_config = render::render_init(&self.environment)?;
        let supervisor_config = render::render_supervisor(&self.programs())?;

        // Generate the init executable that is called by the kernel and
        // prepares the system for further use.
        let init = self
            .producer
            .produce(Stage::Init, &init_config, self.arch, tmp_dir.path())?;

        // Generate bluebox-init which calls the executables in order.
        let supervisor = self.producer.produce(
            Stage::Supervisor,
            &supervisor_config,
            self.arch,
            tmp_dir.path(),
        )?;

        let mut writer = CpioWriter::new(archive);
        writer.add_file_as(names::INIT, &init)?;
        writer.add_file_as(names::SUPERVISOR, &supervisor)?;
        for executable in &self.executables {
            writer.add_file_as(&executable.file.name, &executable.file.path)?;
        }
        for embedding in &self.embeddings {
            writer.add_file_as(&embedding.name, &embedding.path)?;
        }
        let summary = writer.finish()?;

        info!(
            entries = summary.entries.len(),
            bytes = summary.bytes,
            "initramfs written"
        );
        Ok(summary)
    }

    /// Validate `path` for registration under its base name.
    fn register(&self, path: &Path) -> BlueboxResult<Registered> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BlueboxError::Config(format!("{} does not name a file", path.display()))
            })?
            .to_string();

        if names::is_reserved(&name) {
            return Err(BlueboxError::ReservedName(name));
        }

        // Cross check executables and read-only files; both end up as
        // top-level archive entries.
        let taken = self.executables.iter().any(|e| e.file.name == name)
            || self.embeddings.iter().any(|e| e.name == name);
        if taken {
            return Err(BlueboxError::AlreadyExists(name));
        }

        let meta = fs::metadata(path).map_err(|e| {
            BlueboxError::Config(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(BlueboxError::NotRegularFile(path.to_path_buf()));
        }

        Ok(Registered {
            name,
            path: path.to_path_buf(),
        })
    }
}

impl Default for Bluebox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::PrebuiltProducer;

    fn bluebox() -> Bluebox {
        Bluebox::with_producer(PrebuiltProducer::new("/nonexistent"))
    }

    #[test]
    fn reserved_names_are_rejected_before_stat() {
        let mut b = bluebox();
        for name in ["init", "bluebox", "bluebox-init"] {
            let err = b.execute(format!("/some/dir/{name}"), vec![]).unwrap_err();
            assert!(matches!(err, BlueboxError::ReservedName(ref n) if n == name));
        }
        assert!(matches!(
            b.embed("/x/init").unwrap_err(),
            BlueboxError::ReservedName(_)
        ));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let mut b = bluebox();
        let err = b.execute("/does/not/exist", vec![]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn setarch_and_setenv() {
        let mut b = bluebox();
        b.setarch("arm64").unwrap();
        assert_eq!(b.arch(), Arch::Aarch64);
        assert!(b.setarch("mips").is_err());
        assert_eq!(b.arch(), Arch::Aarch64);

        b.setenv("key", "TRUE");
        b.setenv("key2", "value");
        assert_eq!(
            b.env_vars(),
            &[
                ("key".to_string(), "TRUE".to_string()),
                ("key2".to_string(), "value".to_string())
            ]
        );
    }
}
