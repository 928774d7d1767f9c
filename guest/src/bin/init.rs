//! Stage 1, started by the kernel as `/init`.

use std::path::Path;

use bluebox_guest::system::{idle_forever, LinuxSystem, System};
use bluebox_guest::{init, logging};
use bluebox_shared::constants::{boot, names};
use nix::unistd::getpid;
use tracing::error;

fn main() {
    if getpid().as_raw() != 1 {
        let argv0 = std::env::args().next().unwrap_or_else(|| names::INIT.to_string());
        eprintln!("{} must only run with PID 1 for safety", argv0);
        return;
    }

    // PID 1 must not exit; a panic ends in a power-off instead.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("[PANIC] init panicked: {}", panic_info);
        shutdown();
    }));

    logging::init(names::INIT);

    let config = match init::load_config(Path::new(boot::INIT_PATH)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            shutdown();
        }
    };

    match init::boot(&config) {
        Ok(never) => match never {},
        Err(e) => {
            error!("{}", e);
            shutdown();
        }
    }
}

fn shutdown() -> ! {
    if let Err(e) = LinuxSystem.power_off() {
        error!("{}", e);
    }
    idle_forever()
}
