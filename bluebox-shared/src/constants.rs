//! Shared constants between host and guest
//!
//! These constants must be identical on both sides of the build/boot boundary.

/// Names of the entries that make up the boot stages.
pub mod names {
    /// Stage 1, started by the kernel as PID 1.
    pub const INIT: &str = "init";

    /// Stage 2, exec'd by stage 1 after the root switch.
    pub const SUPERVISOR: &str = "bluebox-init";

    /// Name of the tool itself.
    pub const TOOL: &str = "bluebox";

    /// Names that user supplied files must not take.
    pub const RESERVED: &[&str] = &[INIT, TOOL, SUPERVISOR];

    /// Whether `name` collides with one of the boot stage names.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }
}

/// Paths used while booting.
pub mod boot {
    /// Where the kernel leaves stage 1.
    pub const INIT_PATH: &str = "/init";

    /// Where stage 2 lives once the root has been switched.
    pub const SUPERVISOR_PATH: &str = "/bluebox-init";

    /// Mount point of the fresh tmpfs that becomes the new root.
    pub const NEW_ROOT: &str = "/bluebox";

    /// Mode of [`NEW_ROOT`].
    pub const NEW_ROOT_MODE: u32 = 0o755;

    /// Kernel-provided device tree, left in place during migration.
    pub const DEV: &str = "/dev";
}

/// Console log formatting.
pub mod log {
    /// Width of the bracketed tag in front of every boot log line.
    pub const TAG_WIDTH: usize = 12;
}

/// Embedded configuration table.
pub mod table {
    /// Marks the end of a binary carrying a configuration table.
    pub const MAGIC: &[u8; 8] = b"BLUEBOX\x01";

    /// Length of the fixed footer (payload length + magic).
    pub const FOOTER_LEN: usize = 16;
}
