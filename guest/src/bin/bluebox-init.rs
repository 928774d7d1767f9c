//! Stage 2, exec'd by `init` from the switched root.

use std::path::Path;

use bluebox_guest::system::{idle_forever, LinuxSystem};
use bluebox_guest::{logging, Supervisor};
use bluebox_shared::constants::{boot, names};
use bluebox_shared::{table, SupervisorConfig};
use nix::unistd::getpid;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    logging::init(names::SUPERVISOR);

    // Without a configuration there is nothing to run, but the machine is
    // still powered off.
    let config: SupervisorConfig = match table::load(Path::new(boot::SUPERVISOR_PATH)) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            SupervisorConfig::default()
        }
    };

    let summary = Supervisor::new(LinuxSystem).run(&config.programs).await;

    // Returning from PID 1 panics the kernel.
    if getpid().as_raw() == 1 && summary.machine_still_running() {
        warn!("machine was not powered off, idling");
        idle_forever();
    }
}
