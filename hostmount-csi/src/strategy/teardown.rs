use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::CsiError;
use crate::mount::{MountState, Mounter};

/// Unmount `target` if something is mounted there, then remove it.
///
/// A target that no longer exists is already torn down and succeeds
/// without touching the mount table.
#[instrument(skip_all, fields(target_path = %target.display()))]
pub fn unmount_and_remove(mounter: &dyn Mounter, target: &Path) -> Result<(), CsiError> {
    let state = mounter
        .mount_state(target)
        .map_err(|e| CsiError::unmount(target, format!("checking mount point: {e}")))?;

    match state {
        MountState::Absent => {
            debug!("target path does not exist, nothing to unpublish");
            return Ok(());
        }
        MountState::NotMounted => {
            info!("target path is not a mount point, skipping unmount");
        }
        MountState::Mounted => {
            mounter
                .unmount(target)
                .map_err(|e| CsiError::unmount(target, e))?;
        }
    }

    remove_target(target)
        .map_err(|e| CsiError::unmount(target, format!("remove target path: {e}")))?;

    info!("volume unpublished");
    Ok(())
}

/// Remove `target` whether it is a directory tree or a single entry.
fn remove_target(target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
