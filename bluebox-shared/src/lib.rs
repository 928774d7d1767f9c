//! Bluebox Core - Shared code for host and guest
//!
//! This crate contains the types and formats that must agree on both sides
//! of the build/boot boundary: the boot configuration model, the embedded
//! configuration table and the error taxonomy.

pub mod boot;
pub mod constants;
pub mod errors;
pub mod table;

pub use boot::{DeviceNode, EnvironmentAction, InitConfig, Mount, Program, SupervisorConfig};
pub use errors::{BlueboxError, BlueboxResult};
