//! Error taxonomy shared by the image builder and the boot stages.
//!
//! Errors are grouped by who sees them:
//! - Configuration and generation errors are returned to the caller of the
//!   builder and stop generation.
//! - Boot errors are logged on the VM console. Only [`BlueboxError::BootFatal`]
//!   changes control flow (it leads to a controlled power-off).

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout bluebox.
pub type BlueboxResult<T> = Result<T, BlueboxError>;

#[derive(Debug, Error)]
pub enum BlueboxError {
    /// Invalid builder configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A name that collides with one of the boot stage binaries.
    #[error("embedded executable should not be named '{0}'")]
    ReservedName(String),

    /// A name registered twice (as executable, embedding or both).
    #[error("{0} is already embedded, can not add it multiple times")]
    AlreadyExists(String),

    /// A path that does not reference a regular file.
    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),

    /// Rendering or compiling a boot stage failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Requested feature or target is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An archive entry with this name was already written.
    #[error("archive already contains an entry named '{0}'")]
    DuplicateEntry(String),

    /// Archive stream is malformed or could not be written.
    #[error("archive error: {0}")]
    Archive(String),

    /// A single environment action failed at boot. Never fatal.
    #[error("boot action failed: {0}")]
    BootAction(String),

    /// Root migration or the root switch failed.
    #[error("boot failed: {0}")]
    BootFatal(String),

    /// An embedded executable could not be started.
    #[error("launch failed: {0}")]
    Launch(String),

    /// The power-off request was refused.
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlueboxError {
    /// Whether this error belongs to the configuration class, i.e. the caller
    /// handed in something that can never be generated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BlueboxError::Config(_)
                | BlueboxError::ReservedName(_)
                | BlueboxError::AlreadyExists(_)
                | BlueboxError::NotRegularFile(_)
        )
    }
}
