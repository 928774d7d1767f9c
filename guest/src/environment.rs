//! Application of the boot environment actions.
//!
//! Actions are best effort: a failing action is logged and the next one is
//! still attempted.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::{DeviceNode, EnvironmentAction, Mount};
use nix::libc;
use nix::mount::{mount, MsFlags};
use nix::sys::stat::{mknod, Mode, SFlag};
use tracing::{error, info, warn};

const S_IFMT: u32 = 0o170000;

/// A single step of the boot environment.
pub trait BootAction {
    fn apply(&self) -> BlueboxResult<()>;
}

impl BootAction for Mount {
    fn apply(&self) -> BlueboxResult<()> {
        if self.create_target {
            if let Err(e) = DirBuilder::new()
                .recursive(true)
                .mode(self.target_mode)
                .create(&self.target)
            {
                warn!("Failed to create {}: {}", self.target, e);
            }
        }

        let data: Option<&str> = if self.data.is_empty() {
            None
        } else {
            Some(self.data.as_str())
        };

        mount(
            Some(self.source.as_str()),
            self.target.as_str(),
            Some(self.fstype.as_str()),
            MsFlags::from_bits_retain(self.flags as libc::c_ulong),
            data,
        )
        .map_err(|e| BlueboxError::BootAction(format!("{}: {}", self, e)))
    }
}

impl BootAction for DeviceNode {
    fn apply(&self) -> BlueboxResult<()> {
        // A stale node from the initramfs would make mknod fail with EEXIST.
        let _ = fs::remove_file(&self.path);

        mknod(
            self.path.as_str(),
            SFlag::from_bits_truncate((self.mode & S_IFMT) as libc::mode_t),
            Mode::from_bits_truncate((self.mode & !S_IFMT) as libc::mode_t),
            self.device_id as libc::dev_t,
        )
        .map_err(|e| BlueboxError::BootAction(format!("{}: {}", self, e)))
    }
}

impl BootAction for EnvironmentAction {
    fn apply(&self) -> BlueboxResult<()> {
        match self {
            EnvironmentAction::Mount(m) => m.apply(),
            EnvironmentAction::DeviceNode(d) => d.apply(),
        }
    }
}

/// Apply `actions` in order and return how many of them failed.
pub fn apply_all<A: BootAction + std::fmt::Display>(actions: &[A]) -> usize {
    let mut failed = 0;
    for action in actions {
        info!("{}", action);
        if let Err(e) = action.apply() {
            error!("{}", e);
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn failing_actions_do_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir");
        let created = dir.path().join("created/target");

        let actions = vec![
            EnvironmentAction::DeviceNode(DeviceNode::char_device(
                &missing.join("tty").to_string_lossy(),
                0o666,
                5,
                0,
            )),
            EnvironmentAction::Mount(
                Mount::new("none", &created.to_string_lossy(), "bluebox-no-such-fs")
                    .creating_target(0o755),
            ),
        ];

        assert_eq!(apply_all(&actions), 2);
        // The mount failed but its target was still created.
        assert!(created.is_dir());
    }

    #[test]
    fn mount_error_names_the_action() {
        let m = Mount::new("none", "/nonexistent/bluebox-target", "bluebox-no-such-fs");
        let err = m.apply().unwrap_err();
        assert!(matches!(err, BlueboxError::BootAction(_)));
        assert!(err.to_string().contains("/nonexistent/bluebox-target"));
        assert!(!Path::new("/nonexistent/bluebox-target").exists());
    }

    #[test]
    fn device_node_replaces_existing_file_and_reapplies() {
        use std::os::unix::fs::FileTypeExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        fs::write(&path, b"stale").unwrap();

        let node = DeviceNode {
            path: path.to_string_lossy().into_owned(),
            mode: 0o010000 | 0o644,
            device_id: 0,
        };
        node.apply().unwrap();
        node.apply().unwrap();

        let meta = fs::symlink_metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
    }
}
