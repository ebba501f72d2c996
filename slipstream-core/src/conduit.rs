//! Named-pipe provisioning for the media source → publisher hand-off.
//!
//! The media source writes its FLV stream into a FIFO and the publisher
//! reads from it; the rendezvous only works if the path really is a FIFO.
//! A regular file left behind by an earlier run would silently absorb the
//! stream instead, so the provisioner replaces anything that is not a FIFO.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while provisioning the pipe conduit
#[derive(Debug, Error)]
pub enum ConduitError {
    #[error("No home directory available to expand {path}")]
    HomeDirUnavailable { path: PathBuf },

    #[error("Failed to create parent directory {path}: {source}")]
    ParentDirCreation { path: PathBuf, source: io::Error },

    #[error("Failed to inspect {path}: {source}")]
    Inspect { path: PathBuf, source: io::Error },

    #[error("Failed to replace non-FIFO entry at {path}: {source}")]
    StaleEntryRemoval { path: PathBuf, source: io::Error },

    #[error("Failed to create FIFO at {path}: {source}")]
    FifoCreation { path: PathBuf, source: nix::Error },
}

/// A provisioned named pipe on the filesystem.
///
/// Created by [`ensure_conduit`], removed by the shutdown coordinator. One
/// writer (the media source) and one reader (the publisher) are expected to
/// use it per run; nothing enforces that convention.
#[derive(Debug)]
pub struct PipeConduit {
    path: PathBuf,
    removed: bool,
}

impl PipeConduit {
    /// Absolute path of the FIFO.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`remove`](Self::remove) already deleted the FIFO.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Deletes the FIFO from the filesystem.
    ///
    /// Safe to call more than once; repeated calls (and a path that has
    /// already disappeared) are no-ops.
    ///
    /// # Errors
    /// - `io::Error` - The entry exists but could not be removed
    pub fn remove(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed pipe conduit at {}", self.path.display());
                self.removed = true;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.removed = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Ensures a FIFO exists at `path`, creating or replacing entries as needed.
///
/// A leading `~` is expanded to the user's home directory and missing parent
/// directories are created. An existing FIFO is reused; any other entry at
/// the path is deleted and replaced by a fresh FIFO, so no stale data can
/// leak into the new run. Idempotent across repeated invocations.
///
/// # Errors
/// - `ConduitError::HomeDirUnavailable` - `~`-prefixed path with no resolvable home
/// - `ConduitError::ParentDirCreation` - parent directory could not be created
/// - `ConduitError::StaleEntryRemoval` - a non-FIFO entry could not be deleted
///   (e.g. the path is a non-empty directory)
/// - `ConduitError::FifoCreation` - `mkfifo` failed (permissions, unsupported
///   filesystem)
pub fn ensure_conduit(path: &Path) -> Result<PipeConduit, ConduitError> {
    let path = expand_home(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| ConduitError::ParentDirCreation {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    match fs::symlink_metadata(&path) {
        Ok(metadata) if is_fifo_type(&metadata) => {
            debug!("Reusing existing FIFO at {}", path.display());
        }
        Ok(_) => {
            info!(
                "Replacing non-FIFO entry at {} with a fresh FIFO",
                path.display()
            );
            fs::remove_file(&path).map_err(|source| ConduitError::StaleEntryRemoval {
                path: path.clone(),
                source,
            })?;
            create_fifo(&path)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            create_fifo(&path)?;
        }
        Err(source) => {
            return Err(ConduitError::Inspect { path, source });
        }
    }

    Ok(PipeConduit {
        path,
        removed: false,
    })
}

fn create_fifo(path: &Path) -> Result<(), ConduitError> {
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o644)).map_err(|source| {
        ConduitError::FifoCreation {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!("Created FIFO at {}", path.display());
    Ok(())
}

/// Expands a leading `~` component to the user's home directory.
///
/// Paths without a `~` prefix are returned unchanged.
pub fn expand_home(path: &Path) -> Result<PathBuf, ConduitError> {
    let Ok(stripped) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };

    let home = dirs::home_dir().ok_or_else(|| ConduitError::HomeDirUnavailable {
        path: path.to_path_buf(),
    })?;
    Ok(home.join(stripped))
}

#[cfg(unix)]
fn is_fifo_type(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;

    metadata.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo_type(_metadata: &fs::Metadata) -> bool {
    false
}
