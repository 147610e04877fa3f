//! Copy-on-write overlay volumes.
//!
//! Every volume gets its own writable `upper`/`work` pair over one shared,
//! read-only base directory; the merged view is then bind-mounted onto the
//! target path.
//!
//! ```text
//! <overlay_root>/<volume-id>/upper/    # writable layer of this volume
//! <overlay_root>/<volume-id>/work/     # overlayfs scratch space
//! <overlay_root>/<volume-id>/mapped/   # merged view, bound onto the target
//! <base_dir>/                          # shared lower layer
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::state_before_mount;
use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::mount::Mounter;
use crate::provision::{PathKind, Provisioner};
use crate::types::VolumeId;

/// Host directories backing one overlay volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
    /// Shared lower layer.
    pub base_dir: PathBuf,
    pub upper_dir: PathBuf,
    pub work_dir: PathBuf,
    /// Where the overlay itself is mounted.
    pub merged_dir: PathBuf,
    pub target_path: PathBuf,
}

impl OverlayLayout {
    /// Derive the layout of `volume_id`.
    ///
    /// The id becomes a directory name, so it must be a single plain path
    /// component.
    pub fn new(
        config: &DriverConfig,
        volume_id: &VolumeId,
        target_path: &Path,
    ) -> Result<Self, CsiError> {
        let id = volume_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\0']) {
            return Err(CsiError::invalid(format!(
                "volume id {id:?} cannot be used as a directory name"
            )));
        }

        let root = config.volume_root(volume_id);
        Ok(Self {
            base_dir: config.base_dir.clone(),
            upper_dir: root.join("upper"),
            work_dir: root.join("work"),
            merged_dir: root.join("mapped"),
            target_path: target_path.to_path_buf(),
        })
    }

    /// Every directory that must exist before the overlay is mounted.
    fn required_dirs(&self) -> [&Path; 5] {
        [
            &self.base_dir,
            &self.upper_dir,
            &self.work_dir,
            &self.target_path,
            &self.merged_dir,
        ]
    }
}

/// Composes per-volume overlays and binds them onto target paths.
pub struct OverlayStrategy {
    config: DriverConfig,
    provisioner: Provisioner,
    mounter: Arc<dyn Mounter>,
}

impl OverlayStrategy {
    pub fn new(config: DriverConfig, provisioner: Provisioner, mounter: Arc<dyn Mounter>) -> Self {
        Self {
            config,
            provisioner,
            mounter,
        }
    }

    /// Publish the overlay of `volume_id` at `target`.
    ///
    /// A target that is already a mount point is left as is.  The target is
    /// only bound once the overlay at the merged directory is in place, and
    /// an overlay mounted by this call is unmounted again if that bind fails.
    #[instrument(skip_all, fields(volume_id = %volume_id, target_path = %target.display()))]
    pub fn mount(
        &self,
        volume_id: &VolumeId,
        target: &Path,
        read_only: bool,
    ) -> Result<(), CsiError> {
        let layout = OverlayLayout::new(&self.config, volume_id, target)?;

        for dir in layout.required_dirs() {
            self.provisioner.ensure(dir, PathKind::Dir)?;
        }

        if state_before_mount(self.mounter.as_ref(), target)?.is_mounted() {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(());
        }

        let fresh_overlay =
            if state_before_mount(self.mounter.as_ref(), &layout.merged_dir)?.is_mounted() {
                debug!(merged = %layout.merged_dir.display(), "reusing existing overlay");
                false
            } else {
                self.mounter
                    .mount_overlay(
                        &layout.base_dir,
                        &layout.upper_dir,
                        &layout.work_dir,
                        &layout.merged_dir,
                    )
                    .map_err(|e| {
                        error!(merged = %layout.merged_dir.display(), error = %e, "overlay mount failed");
                        CsiError::mount(&layout.merged_dir, e)
                    })?;
                true
            };

        if let Err(e) = self
            .mounter
            .bind_mount(&layout.merged_dir, target, read_only)
        {
            error!(merged = %layout.merged_dir.display(), error = %e, "bind mount of overlay failed");
            if fresh_overlay && let Err(undo) = self.mounter.unmount(&layout.merged_dir) {
                warn!(merged = %layout.merged_dir.display(), error = %undo, "failed to roll back overlay");
            }
            return Err(CsiError::mount(target, e));
        }

        // Consumers write through their upper layer with arbitrary uids.
        self.provisioner.normalize_tree(&layout.base_dir)?;

        info!(merged = %layout.merged_dir.display(), read_only, "volume published (overlay)");
        Ok(())
    }
}
