//! Boot configuration model.
//!
//! The host renders these types into each stage binary; the guest reads them
//! back at boot. Only data lives here. Applying an action is the guest's job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Character device file type bits (`S_IFCHR`).
pub const S_IFCHR: u32 = 0o020000;

/// One boot-time kernel configuration step.
///
/// Actions run strictly in declaration order, later ones may depend on
/// filesystems mounted by earlier ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvironmentAction {
    Mount(Mount),
    DeviceNode(DeviceNode),
}

/// Arguments of a single mount(2) call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub fstype: String,
    /// Raw `MS_*` flags, passed through unmodified.
    #[serde(default)]
    pub flags: u64,
    /// Filesystem specific options string, passed through unmodified.
    #[serde(default)]
    pub data: String,
    /// Create `target` (with `target_mode`) before mounting.
    #[serde(default)]
    pub create_target: bool,
    #[serde(default)]
    pub target_mode: u32,
}

impl Mount {
    /// Mount onto an existing directory.
    pub fn new(source: &str, target: &str, fstype: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            fstype: fstype.to_string(),
            flags: 0,
            data: String::new(),
            create_target: false,
            target_mode: 0,
        }
    }

    /// Create the target directory with `mode` before mounting.
    pub fn creating_target(mut self, mode: u32) -> Self {
        self.create_target = true;
        self.target_mode = mode;
        self
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mount({:?}, {:?}, {:?}, {:#x}, {:?})",
            self.source, self.target, self.fstype, self.flags, self.data
        )
    }
}

/// A special file created with mknod(2). An existing path is replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    pub path: String,
    /// File type and permission bits, e.g. `S_IFCHR | 0o666`.
    pub mode: u32,
    pub device_id: u64,
}

impl DeviceNode {
    /// Character device `major:minor` with permission bits `perm`.
    pub fn char_device(path: &str, perm: u32, major: u32, minor: u32) -> Self {
        Self {
            path: path.to_string(),
            mode: S_IFCHR | (perm & 0o7777),
            device_id: makedev(major, minor),
        }
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mknod({:?}, {:#o}, {:#06x})",
            self.path, self.mode, self.device_id
        )
    }
}

impl fmt::Display for EnvironmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentAction::Mount(m) => m.fmt(f),
            EnvironmentAction::DeviceNode(n) => n.fmt(f),
        }
    }
}

/// Linux `dev_t` encoding of a device number.
pub fn makedev(major: u32, minor: u32) -> u64 {
    let major = major as u64;
    let minor = minor as u64;
    ((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)
}

/// The minimal environment a test harness VM needs.
///
/// Order matters: `/sys` must be mounted before the filesystems below it.
pub fn standard_environment() -> Vec<EnvironmentAction> {
    vec![
        EnvironmentAction::Mount(Mount::new("devtmpfs", "/dev", "devtmpfs").creating_target(0o755)),
        EnvironmentAction::Mount(Mount::new("tmpfs", "/tmp", "tmpfs").creating_target(0o755)),
        EnvironmentAction::Mount(Mount::new("proc", "/proc", "proc").creating_target(0o555)),
        EnvironmentAction::DeviceNode(DeviceNode::char_device("/dev/tty", 0o666, 5, 0)),
        EnvironmentAction::DeviceNode(DeviceNode::char_device("/dev/urandom", 0o444, 1, 9)),
        EnvironmentAction::Mount(Mount::new("sysfs", "/sys", "sysfs").creating_target(0o555)),
        EnvironmentAction::Mount(Mount::new(
            "securityfs",
            "/sys/kernel/security",
            "securityfs",
        )),
        EnvironmentAction::Mount(Mount::new("debugfs", "/sys/kernel/debug", "debugfs")),
        EnvironmentAction::Mount(Mount::new("bpffs", "/sys/fs/bpf", "bpf")),
    ]
}

/// An embedded executable and the arguments it is started with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Archive entry name, started as `./<name>`.
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Program {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The single argument the program receives.
    ///
    /// Programs are not started with a regular argv: all configured arguments
    /// are joined with `", "` into one argument. No argument is passed when
    /// none are configured.
    pub fn joined_argument(&self) -> Option<String> {
        if self.args.is_empty() {
            None
        } else {
            Some(self.args.join(", "))
        }
    }
}

/// Configuration rendered into stage 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    pub environment: Vec<EnvironmentAction>,
}

/// Configuration rendered into stage 2.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Programs in execution order.
    pub programs: Vec<Program>,
}
