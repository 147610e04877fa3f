//! Direct bind mounts of host directories and socket directories.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use super::state_before_mount;
use crate::error::CsiError;
use crate::mount::Mounter;
use crate::provision::{PathKind, Provisioner};

/// Binds a host path straight onto the target path.
pub struct BindStrategy {
    provisioner: Provisioner,
    mounter: Arc<dyn Mounter>,
}

impl BindStrategy {
    pub fn new(provisioner: Provisioner, mounter: Arc<dyn Mounter>) -> Self {
        Self {
            provisioner,
            mounter,
        }
    }

    /// Make `host_path` visible at `target`.
    ///
    /// With `is_socket`, `host_path` must name a socket and its parent
    /// directory is bound instead, so the socket's owner can recreate the
    /// socket without the container losing sight of it.  A target that is
    /// already a mount point is left as is.
    #[instrument(skip_all, fields(target_path = %target.display(), host = %host_path.display(), is_socket = is_socket))]
    pub fn mount(
        &self,
        target: &Path,
        host_path: &Path,
        is_socket: bool,
        read_only: bool,
    ) -> Result<(), CsiError> {
        let source = if is_socket {
            socket_dir(host_path)?
        } else {
            host_path.to_path_buf()
        };

        self.provisioner.ensure(target, PathKind::Dir)?;
        self.provisioner.ensure(&source, PathKind::Dir)?;

        if state_before_mount(self.mounter.as_ref(), target)?.is_mounted() {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(());
        }

        self.mounter
            .bind_mount(&source, target, read_only)
            .map_err(|e| {
                error!(source = %source.display(), error = %e, "bind mount failed");
                CsiError::mount(target, e)
            })?;

        info!(source = %source.display(), read_only, "volume published (bind-mount)");
        Ok(())
    }
}

/// Directory holding the socket at `path`.
///
/// Failing to stat the socket is an error in its own right, never a silent
/// "not a socket".
fn socket_dir(path: &Path) -> Result<PathBuf, CsiError> {
    let meta = fs::metadata(path)
        .map_err(|e| CsiError::internal(format!("stat socket {}: {e}", path.display())))?;
    if !meta.file_type().is_socket() {
        return Err(CsiError::invalid(format!(
            "{} is not a socket file",
            path.display()
        )));
    }
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.to_path_buf()),
        _ => Err(CsiError::invalid(format!(
            "socket {} has no parent directory",
            path.display()
        ))),
    }
}
