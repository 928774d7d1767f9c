//! Initramfs archive assembly.
//!
//! The kernel unpacks a CPIO stream in "newc" format. Every entry written
//! here is a regular file at the top level of the archive.

mod cpio;

pub use cpio::{read_entries, CpioWriter};

/// Metadata of one archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Base name, unique within the archive.
    pub name: String,
    /// Permission bits (`0o7777` mask).
    pub permissions: u32,
    pub size: u64,
}

/// What ended up in a finished archive, in write order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: Vec<ArchiveEntry>,
    /// Total bytes written, trailer included.
    pub bytes: u64,
}

impl ArchiveSummary {
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}
