//! Machine level operations of the supervisor.

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use nix::sys::reboot::{reboot, RebootMode};
use nix::sys::statfs::{statfs, TMPFS_MAGIC};
use nix::unistd::{pause, sync};

/// Operations that affect the whole machine.
pub trait System: Send + Sync {
    /// Whether `/` is a tmpfs, i.e. we are running from the switched root.
    fn root_is_tmpfs(&self) -> BlueboxResult<bool>;

    /// Flush filesystems and power the machine off.
    fn power_off(&self) -> BlueboxResult<()>;
}

/// The running Linux kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSystem;

impl System for LinuxSystem {
    fn root_is_tmpfs(&self) -> BlueboxResult<bool> {
        let stat = statfs("/")
            .map_err(|e| BlueboxError::Shutdown(format!("statfs /: {}", e)))?;
        Ok(stat.filesystem_type() == TMPFS_MAGIC)
    }

    fn power_off(&self) -> BlueboxResult<()> {
        sync();
        match reboot(RebootMode::RB_POWER_OFF) {
            Ok(never) => match never {},
            Err(e) => Err(BlueboxError::Shutdown(format!("reboot(RB_POWER_OFF): {}", e))),
        }
    }
}

/// Park the calling process for good.
///
/// PID 1 must never exit, the kernel panics if it does.
pub fn idle_forever() -> ! {
    loop {
        pause();
    }
}
