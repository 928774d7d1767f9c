//! Bluebox - bootable initramfs images for disposable test VMs.
//!
//! A [`Bluebox`] collects statically linked executables and read-only files,
//! produces the two boot stages for the target architecture and writes
//! everything into a single CPIO (newc) archive the kernel can unpack as its
//! initial root filesystem.
//!
//! ```rust,ignore
//! use bluebox::Bluebox;
//!
//! let mut bluebox = Bluebox::new();
//! bluebox.execute("target/x86_64-unknown-linux-musl/release/selftest", vec!["-v".into()])?;
//! bluebox.embed("fixtures/data.bin")?;
//! bluebox.setarch("amd64")?;
//!
//! let output = std::fs::File::create("initramfs.cpio")?;
//! bluebox.generate(output)?;
//! ```

pub mod arch;
pub mod archive;
mod assembler;
pub mod producer;
pub mod render;

pub use arch::Arch;
pub use archive::{ArchiveEntry, ArchiveSummary, CpioWriter};
pub use assembler::Bluebox;
pub use bluebox_shared::{BlueboxError, BlueboxResult};
pub use producer::{BinaryProducer, CargoProducer, PrebuiltProducer, Stage};
