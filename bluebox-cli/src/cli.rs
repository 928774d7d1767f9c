use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// bluebox - build a bootable initramfs that runs the given static executables
///
/// The archive contains a two-stage init that prepares a minimal Linux
/// environment, runs every executable in order and powers the machine off.
#[derive(Parser, Debug)]
#[command(name = "bluebox", author, version)]
pub struct Cli {
    /// Output archive
    #[arg(short, long, env = "BLUEBOX_OUTPUT", default_value = "initramfs.cpio")]
    pub output: PathBuf,

    /// Target architecture (amd64, arm64, riscv64, ...); defaults to the host
    #[arg(short, long, env = "BLUEBOX_ARCH")]
    pub arch: Option<String>,

    /// Statically linked executable to run at boot, optionally with arguments
    ///
    /// Examples:
    ///   -e ./date:+%s
    ///   -e ./selftest:"-v -run TestBoot"
    #[arg(short = 'e', long = "exec", value_name = "PATH[:\"ARGS\"]")]
    pub executables: Vec<Runnable>,

    /// File to add to the archive without running it
    #[arg(short = 'r', long = "embed", value_name = "PATH")]
    pub embeddings: Vec<PathBuf>,

    /// Environment variable to record, KEY=VALUE or KEY (meaning KEY=TRUE)
    #[arg(long = "env", value_name = "KEY[=VALUE]")]
    pub env: Vec<EnvVar>,

    /// Directory with pre-built `init` and `bluebox-init` binaries; skips
    /// compiling the boot stages
    #[arg(long, env = "BLUEBOX_STAGE_DIR")]
    pub stage_dir: Option<PathBuf>,

    /// Cargo manifest of the guest crate used to compile the boot stages
    #[arg(long, env = "BLUEBOX_GUEST_MANIFEST", conflicts_with = "stage_dir")]
    pub guest_manifest: Option<PathBuf>,
}

/// An executable and its arguments as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Runnable {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl FromStr for Runnable {
    type Err = String;

    /// Parses `path`, `path:arg` and `path:"arg1 arg2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, options) = match s.split_once(':') {
            Some((path, options)) => (path, Some(options)),
            None => (s, None),
        };
        if path.is_empty() {
            return Err(format!("missing executable path in '{}'", s));
        }

        let args = options
            .map(|o| {
                let o = o.strip_prefix('"').unwrap_or(o);
                let o = o.strip_suffix('"').unwrap_or(o);
                o.split_whitespace().map(str::to_string).collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path: PathBuf::from(path),
            args,
        })
    }
}

/// A `KEY[=VALUE]` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl FromStr for EnvVar {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').unwrap_or((s, "TRUE"));
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
