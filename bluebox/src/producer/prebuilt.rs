//! Producer that reuses pre-built stage binaries.

use std::path::{Path, PathBuf};

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use tracing::info;

use super::{write_with_table, BinaryProducer, Stage};
use crate::arch::Arch;

/// Templates pre-built static stage binaries found in `stage_dir`.
///
/// The directory must contain `init` and `bluebox-init` built for the target
/// architecture. No compiler is invoked.
#[derive(Clone, Debug)]
pub struct PrebuiltProducer {
    stage_dir: PathBuf,
}

impl PrebuiltProducer {
    pub fn new(stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            stage_dir: stage_dir.into(),
        }
    }
}

impl BinaryProducer for PrebuiltProducer {
    fn produce(
        &self,
        stage: Stage,
        config: &[u8],
        arch: Arch,
        workdir: &Path,
    ) -> BlueboxResult<PathBuf> {
        let binary = self.stage_dir.join(stage.binary_name());
        if !binary.is_file() {
            return Err(BlueboxError::Generation(format!(
                "pre-built {} binary not found at {}",
                stage.binary_name(),
                binary.display()
            )));
        }

        info!(
            stage = stage.binary_name(),
            arch = %arch,
            binary = %binary.display(),
            "using pre-built stage binary"
        );
        write_with_table(&binary, stage, config, workdir)
    }
}
