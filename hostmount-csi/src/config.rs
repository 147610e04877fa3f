//! Host-side layout configuration for the mount strategies.
//!
//! Every path the driver touches outside of a request's target path comes
//! from [`DriverConfig`], so tests can point the driver at a sandbox.

use std::path::{Path, PathBuf};

use crate::types::VolumeId;

/// Default shared lower layer of every overlay volume.
pub const DEFAULT_BASE_DIR: &str = "/var/lib/csi/base";
/// Default root under which per-volume overlay directories are created.
pub const DEFAULT_OVERLAY_ROOT: &str = "/var/lib/csi/overlay";
/// Default path that must never be created by the provisioner.
pub const DEFAULT_PROTECTED_PATH: &str = "/var/log/pods";
/// Default permission bits for provisioned paths (world-writable).
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Paths and modes used by the provisioner and the overlay strategy.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Shared, read-only lower layer of every overlay volume.
    pub base_dir: PathBuf,
    /// Parent of the per-volume `upper`/`work`/`mapped` directories.
    pub overlay_root: PathBuf,
    /// Host log directory the provisioner refuses to create.
    pub protected_path: PathBuf,
    /// Mode applied to every path the provisioner creates.
    pub dir_mode: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            overlay_root: PathBuf::from(DEFAULT_OVERLAY_ROOT),
            protected_path: PathBuf::from(DEFAULT_PROTECTED_PATH),
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}

impl DriverConfig {
    /// Root of the per-volume overlay directories for `volume_id`.
    ///
    /// The id must already have been validated as a single path component.
    pub fn volume_root(&self, volume_id: &VolumeId) -> PathBuf {
        self.overlay_root.join(volume_id.as_str())
    }

    /// Build a config rooted entirely under `root`, used by tests.
    pub fn sandboxed(root: &Path) -> Self {
        Self {
            base_dir: root.join("base"),
            overlay_root: root.join("overlay"),
            protected_path: root.join("log").join("pods"),
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}
