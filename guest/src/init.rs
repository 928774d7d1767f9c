//! Stage 1: prepare the machine and hand over to stage 2.

use std::convert::Infallible;
use std::path::Path;

use bluebox_shared::constants::boot::{NEW_ROOT, NEW_ROOT_MODE};
use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::{table, InitConfig};
use tracing::{info, warn};

use crate::environment;
use crate::rootfs;

/// Load the stage 1 configuration table from the binary at `path`.
///
/// A missing or unreadable table is fatal; stage 1 has nothing to fall back to.
pub fn load_config(path: &Path) -> BlueboxResult<InitConfig> {
    table::load(path).map_err(|e| {
        BlueboxError::BootFatal(format!("loading configuration from {}: {}", path.display(), e))
    })
}

/// Run the stage 1 sequence: environment actions, root migration, root switch
/// and exec of `bluebox-init`.
///
/// Environment actions never fail the boot. Everything after them does, and
/// the error is returned. On success this never returns.
pub fn boot(config: &InitConfig) -> BlueboxResult<Infallible> {
    let failed = environment::apply_all(&config.environment);
    if failed > 0 {
        warn!("{} of {} environment actions failed", failed, config.environment.len());
    }

    let new_root = Path::new(NEW_ROOT);
    rootfs::mount_new_root(new_root, NEW_ROOT_MODE)?;
    rootfs::migrate(Path::new("/"), new_root)?;
    rootfs::switch_root(new_root)?;

    info!("switched root to {}", NEW_ROOT);
    rootfs::exec_supervisor()
}
