//! Target instruction set architectures.

use std::fmt;
use std::str::FromStr;

use bluebox_shared::errors::BlueboxError;
use tracing::warn;

/// Architecture the boot stages are produced for.
///
/// Accepts both Go-style (`amd64`, `arm64`, `386`) and Rust-style
/// (`x86_64`, `aarch64`, `x86`) spellings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
    X86,
    Arm,
    Riscv64,
    Powerpc64le,
    S390x,
}

impl Arch {
    /// Architecture of the machine running the builder.
    ///
    /// Falls back to x86_64, with a warning, when the builder runs on an
    /// architecture that has no static musl target here.
    pub fn host() -> Self {
        Self::host_or_fallback(std::env::consts::ARCH)
    }

    fn host_or_fallback(id: &str) -> Self {
        id.parse().unwrap_or_else(|_| {
            warn!(
                host = id,
                fallback = %Arch::X86_64,
                "host architecture is not supported, use setarch to pick the target"
            );
            Arch::X86_64
        })
    }

    /// Static musl target triple used to compile the boot stages.
    pub fn target_triple(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64-unknown-linux-musl",
            Arch::Aarch64 => "aarch64-unknown-linux-musl",
            Arch::X86 => "i686-unknown-linux-musl",
            Arch::Arm => "armv7-unknown-linux-musleabihf",
            Arch::Riscv64 => "riscv64gc-unknown-linux-musl",
            Arch::Powerpc64le => "powerpc64le-unknown-linux-musl",
            Arch::S390x => "s390x-unknown-linux-musl",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::X86 => "x86",
            Arch::Arm => "arm",
            Arch::Riscv64 => "riscv64",
            Arch::Powerpc64le => "powerpc64le",
            Arch::S390x => "s390x",
        }
    }
}

impl Default for Arch {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = BlueboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" => Ok(Arch::X86_64),
            "arm64" | "aarch64" => Ok(Arch::Aarch64),
            "386" | "x86" | "i386" | "i686" => Ok(Arch::X86),
            "arm" | "armv7" => Ok(Arch::Arm),
            "riscv64" | "riscv64gc" => Ok(Arch::Riscv64),
            "ppc64le" | "powerpc64le" => Ok(Arch::Powerpc64le),
            "s390x" => Ok(Arch::S390x),
            other => Err(BlueboxError::Unsupported(format!(
                "architecture '{}' is not supported",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_and_rust_spellings_agree() {
        assert_eq!("amd64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("arm64".parse::<Arch>().unwrap(), Arch::Aarch64);
        assert_eq!("AARCH64".parse::<Arch>().unwrap(), Arch::Aarch64);
        assert_eq!("386".parse::<Arch>().unwrap(), Arch::X86);
    }

    #[test]
    fn unknown_arch_is_unsupported() {
        let err = "sparc".parse::<Arch>().unwrap_err();
        assert!(matches!(err, BlueboxError::Unsupported(_)));
    }

    #[test]
    fn unknown_host_falls_back_to_x86_64() {
        assert_eq!(Arch::host_or_fallback("powerpc64"), Arch::X86_64);
        assert_eq!(Arch::host_or_fallback("aarch64"), Arch::Aarch64);
    }

    #[test]
    fn triples_are_static_musl() {
        assert_eq!(Arch::X86_64.target_triple(), "x86_64-unknown-linux-musl");
        assert!(Arch::Arm.target_triple().contains("musl"));
    }
}
