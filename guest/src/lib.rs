//! Boot stages of a bluebox initramfs.
//!
//! `init` runs first as PID 1: it prepares the kernel environment, moves the
//! initramfs onto a fresh tmpfs and execs `bluebox-init`, which runs the
//! embedded executables one after another and powers the machine off.

#[cfg(not(target_os = "linux"))]
compile_error!("bluebox boot stages are Linux-only; build with a Linux target");

pub mod environment;
pub mod init;
pub mod logging;
pub mod rootfs;
pub mod supervisor;
pub mod system;

pub use supervisor::{CapturedOutput, ExitStatus, ProcessResult, RunSummary, Supervisor};
pub use system::{LinuxSystem, System};
