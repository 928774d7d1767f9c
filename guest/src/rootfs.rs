//! Root switch from the initramfs to a fresh tmpfs.
//!
//! The kernel's initramfs root can't be pivoted away from, so its contents
//! are moved onto a new tmpfs which is then moved over `/`.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use bluebox_shared::constants::boot::DEV;
use bluebox_shared::constants::names;
use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use nix::mount::{mount, MsFlags};
use nix::unistd::{chdir, chroot, execve};
use tracing::{debug, info};
use walkdir::WalkDir;

/// What [`migrate`] moved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub directories: usize,
    pub files: usize,
    /// Symlinks, sockets and device nodes. These are not carried over.
    pub skipped: usize,
}

/// Create `new_root` with `mode` and mount a tmpfs on it.
pub fn mount_new_root(new_root: &Path, mode: u32) -> BlueboxResult<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(new_root)
        .map_err(|e| fatal(format!("mkdir {}", new_root.display()), e))?;

    mount(
        Some("tmpfs"),
        new_root,
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| fatal(format!("mount tmpfs on {}", new_root.display()), e))
}

/// Move every regular file below `root` into `new_root`.
///
/// Directories are recreated with their permission bits, regular files are
/// copied and then removed from `root`. `new_root` and `root/dev` are not
/// descended into, and neither is any other filesystem mounted below `root`;
/// such mount points are recreated as empty directories.
pub fn migrate(root: &Path, new_root: &Path) -> BlueboxResult<Migration> {
    let skip: [PathBuf; 2] = [
        root.join(DEV.trim_start_matches('/')),
        new_root.to_path_buf(),
    ];
    let mut migration = Migration::default();

    let walker = WalkDir::new(root)
        .same_file_system(true)
        .into_iter()
        .filter_entry(|entry| !skip.iter().any(|s| entry.path() == s.as_path()));

    for entry in walker {
        let entry = entry.map_err(|e| fatal(format!("walk {}", root.display()), e))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BlueboxError::BootFatal(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let dest = new_root.join(relative);
        let file_type = entry.file_type();
        let mode = entry
            .metadata()
            .map_err(|e| fatal(format!("stat {}", entry.path().display()), e))?
            .permissions()
            .mode()
            & 0o7777;

        if file_type.is_dir() {
            match fs::create_dir(&dest) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(fatal(format!("mkdir {}", dest.display()), e)),
            }
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode))
                .map_err(|e| fatal(format!("chmod {}", dest.display()), e))?;
            migration.directories += 1;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest).map_err(|e| {
                fatal(
                    format!("copy {} to {}", entry.path().display(), dest.display()),
                    e,
                )
            })?;
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode))
                .map_err(|e| fatal(format!("chmod {}", dest.display()), e))?;
            fs::remove_file(entry.path())
                .map_err(|e| fatal(format!("remove {}", entry.path().display()), e))?;
            migration.files += 1;
        } else {
            debug!("not migrating {}", entry.path().display());
            migration.skipped += 1;
        }
    }

    info!(
        directories = migration.directories,
        files = migration.files,
        skipped = migration.skipped,
        "migrated root"
    );
    Ok(migration)
}

/// Make `new_root` the root of the filesystem and the working directory.
pub fn switch_root(new_root: &Path) -> BlueboxResult<()> {
    chdir(new_root).map_err(|e| fatal(format!("chdir {}", new_root.display()), e))?;
    mount(
        Some("."),
        "/",
        None::<&str>,
        MsFlags::MS_MOVE,
        None::<&str>,
    )
    .map_err(|e| fatal(format!("move {} to /", new_root.display()), e))?;
    chroot(".").map_err(|e| fatal("chroot .".to_string(), e))?;
    chdir("/").map_err(|e| fatal("chdir /".to_string(), e))
}

/// Replace the current process with stage 2 from the working directory.
///
/// Only returns on failure.
pub fn exec_supervisor() -> BlueboxResult<Infallible> {
    let path = CString::new(format!("./{}", names::SUPERVISOR))
        .map_err(|e| BlueboxError::BootFatal(e.to_string()))?;
    let none: [&CString; 0] = [];
    info!("exec {}", path.to_string_lossy());
    execve(&path, &none, &none).map_err(|e| fatal(format!("exec {}", path.to_string_lossy()), e))
}

fn fatal(step: String, err: impl std::fmt::Display) -> BlueboxError {
    BlueboxError::BootFatal(format!("{}: {}", step, err))
}
