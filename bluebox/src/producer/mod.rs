//! Boot stage binary producers.
//!
//! A producer turns a rendered stage configuration into a static binary for
//! the target architecture:
//! - [`CargoProducer`]: compiles the guest crate, then embeds the table
//! - [`PrebuiltProducer`]: embeds the table into an already built binary

mod cargo;
mod prebuilt;

pub use cargo::CargoProducer;
pub use prebuilt::PrebuiltProducer;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bluebox_shared::constants::names;
use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::table;

use crate::arch::Arch;

/// The two boot stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// PID 1: prepares the environment and switches root.
    Init,
    /// Runs the embedded executables and powers off.
    Supervisor,
}

impl Stage {
    /// Binary and archive entry name of the stage.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Stage::Init => names::INIT,
            Stage::Supervisor => names::SUPERVISOR,
        }
    }
}

/// Produces a stage binary carrying `config`.
pub trait BinaryProducer {
    /// Produce the binary for `stage` inside `workdir` and return its path.
    ///
    /// `workdir` is scoped to one generation pass and removed afterwards.
    fn produce(
        &self,
        stage: Stage,
        config: &[u8],
        arch: Arch,
        workdir: &Path,
    ) -> BlueboxResult<PathBuf>;
}

/// Copy `binary` to `workdir/<stage name>` and append the configuration table.
pub(crate) fn write_with_table(
    binary: &Path,
    stage: Stage,
    config: &[u8],
    workdir: &Path,
) -> BlueboxResult<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let dest = workdir.join(stage.binary_name());
    let mut src = File::open(binary).map_err(|e| {
        BlueboxError::Generation(format!(
            "Failed to open {} binary {}: {}",
            stage.binary_name(),
            binary.display(),
            e
        ))
    })?;

    let mut out = BufWriter::new(File::create(&dest)?);
    io::copy(&mut src, &mut out)?;
    table::append(&mut out, config)?;
    out.flush()?;
    drop(out);

    fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))?;

    tracing::debug!(
        stage = stage.binary_name(),
        binary = %dest.display(),
        table_bytes = config.len(),
        "embedded configuration table"
    );
    Ok(dest)
}
